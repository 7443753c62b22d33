//! Module configuration schema
//!
//! A module section deserializes into [`ModuleConfig`]. Every event block and
//! every sequence inside it defaults to empty, so the rest of the engine never
//! has to distinguish "absent" from "empty".

use std::fmt;
use std::str::FromStr;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::event_listener::EventListenerConfig;

/// Prefix of trigger references to an `on_modified` block
pub const MODIFIED_TRIGGER_PREFIX: &str = "on_modified.";

/// A single string or a list of strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany {
    One(String),
    Many(Vec<String>),
}

impl OneOrMany {
    pub fn iter(&self) -> impl Iterator<Item = &str> {
        let items: &[String] = match self {
            Self::One(item) => std::slice::from_ref(item),
            Self::Many(items) => items,
        };
        items.iter().map(String::as_str)
    }
}

/// Context import specification inside an event block
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextImportSpec {
    /// Config file to import from; placeholders allowed
    pub from_path: String,

    /// Section to import; all sections when absent
    #[serde(default)]
    pub from_section: Option<String>,

    /// Context section to merge into; defaults to `from_section`
    #[serde(default)]
    pub to_section: Option<String>,
}

/// Actions attached to a trigger
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EventBlock {
    pub import_context: Vec<ContextImportSpec>,
    pub compile: Vec<String>,
    pub run: Vec<String>,
    pub trigger: Option<OneOrMany>,
}

impl EventBlock {
    fn append(&mut self, other: &EventBlock) {
        self.import_context.extend(other.import_context.iter().cloned());
        self.compile.extend(other.compile.iter().cloned());
        self.run.extend(other.run.iter().cloned());
    }

    pub fn is_empty(&self) -> bool {
        self.import_context.is_empty() && self.compile.is_empty() && self.run.is_empty()
    }
}

/// A declared template
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSpec {
    pub source: String,

    #[serde(default)]
    pub target: Option<String>,
}

/// Options deciding whether a module section is built at all
///
/// Read on its own before the rest of the options, so a disabled module may
/// carry options that would not parse.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleGate {
    pub enabled: bool,
    /// Shell commands that must all succeed
    pub requires: Option<OneOrMany>,
}

impl Default for ModuleGate {
    fn default() -> Self {
        Self {
            enabled: true,
            requires: None,
        }
    }
}

impl ModuleGate {
    pub fn requirements(&self) -> impl Iterator<Item = &str> {
        self.requires.iter().flat_map(OneOrMany::iter)
    }
}

/// Options of one `module/<name>` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ModuleConfig {
    #[serde(flatten)]
    pub gate: ModuleGate,
    pub event_listener: EventListenerConfig,
    pub templates: IndexMap<String, TemplateSpec>,
    pub on_startup: EventBlock,
    pub on_event: EventBlock,
    pub on_exit: EventBlock,
    pub on_modified: IndexMap<String, EventBlock>,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self {
            gate: ModuleGate::default(),
            event_listener: EventListenerConfig::default(),
            templates: IndexMap::new(),
            on_startup: EventBlock::default(),
            on_event: EventBlock::default(),
            on_exit: EventBlock::default(),
            on_modified: IndexMap::new(),
        }
    }
}

/// One of the three top-level triggers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Trigger {
    Startup,
    Event,
    Exit,
}

impl Trigger {
    pub const ALL: [Trigger; 3] = [Trigger::Startup, Trigger::Event, Trigger::Exit];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Startup => "on_startup",
            Self::Event => "on_event",
            Self::Exit => "on_exit",
        }
    }
}

impl fmt::Display for Trigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Trigger {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|trigger| trigger.as_str() == s)
            .ok_or_else(|| s.to_string())
    }
}

/// Reference to an event block in a `trigger` option
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BlockRef {
    Trigger(Trigger),
    Modified(String),
}

impl FromStr for BlockRef {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if let Some(template) = s.strip_prefix(MODIFIED_TRIGGER_PREFIX) {
            return Ok(Self::Modified(template.to_string()));
        }
        s.parse().map(Self::Trigger)
    }
}

impl ModuleConfig {
    pub fn block(&self, trigger: Trigger) -> &EventBlock {
        match trigger {
            Trigger::Startup => &self.on_startup,
            Trigger::Event => &self.on_event,
            Trigger::Exit => &self.on_exit,
        }
    }

    fn block_mut(&mut self, trigger: Trigger) -> &mut EventBlock {
        match trigger {
            Trigger::Startup => &mut self.on_startup,
            Trigger::Event => &mut self.on_event,
            Trigger::Exit => &mut self.on_exit,
        }
    }

    /// Every event block, top-level triggers first
    pub fn blocks(&self) -> impl Iterator<Item = &EventBlock> {
        Trigger::ALL
            .into_iter()
            .map(|trigger| self.block(trigger))
            .chain(self.on_modified.values())
    }

    /// Append the actions of every block named in a `trigger` option
    ///
    /// Referenced blocks are read as configured, before any import, and each
    /// reference appends once, so naming a block twice appends it twice. A
    /// reference to an unknown `on_modified.<template>` block imports nothing.
    /// Returns the first reference that names no block at all.
    pub fn resolve_trigger_imports(&mut self) -> Result<(), String> {
        let configured = self.clone();
        let lookup = |reference: &BlockRef| -> Option<EventBlock> {
            match reference {
                BlockRef::Trigger(trigger) => Some(configured.block(*trigger).clone()),
                BlockRef::Modified(template) => configured.on_modified.get(template).cloned(),
            }
        };

        for trigger in Trigger::ALL {
            let Some(references) = configured.block(trigger).trigger.as_ref() else {
                continue;
            };
            for reference in references.iter() {
                let parsed: BlockRef = reference.parse()?;
                debug!(%trigger, %reference, "resolve_trigger_imports: importing block");
                if let Some(imported) = lookup(&parsed) {
                    self.block_mut(trigger).append(&imported);
                }
            }
        }

        for (template, block) in &configured.on_modified {
            let Some(references) = block.trigger.as_ref() else {
                continue;
            };
            for reference in references.iter() {
                let parsed: BlockRef = reference.parse()?;
                debug!(%template, %reference, "resolve_trigger_imports: importing block");
                if let Some(imported) = lookup(&parsed)
                    && let Some(target) = self.on_modified.get_mut(template)
                {
                    target.append(&imported);
                }
            }
        }

        Ok(())
    }
}
