//! Template context store
//!
//! The context is an ordered mapping from section name to an ordered key/value
//! mapping. Templates see it as `{{section.key}}`. Sections are only ever merged
//! key by key: importing into an existing section overwrites colliding keys and
//! keeps every other key and every sibling section.

use std::fs;
use std::path::{Path, PathBuf};

use indexmap::IndexMap;
use serde::Serialize;
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, warn};

use crate::config::ApplicationConfig;

/// Errors raised while importing context from a config file
#[derive(Debug, Error)]
pub enum ContextError {
    #[error("Failed to read context file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse context file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Context file {path} must contain a mapping of sections")]
    NotAMapping { path: PathBuf },

    #[error("Section '{section}' not found in {path}")]
    MissingSection { section: String, path: PathBuf },

    #[error("Section '{section}' in {path} is not a mapping")]
    SectionNotAMapping { section: String, path: PathBuf },
}

/// Shared key/value store used to render templates
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Context {
    sections: IndexMap<String, Mapping>,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a context from the `context/*` sections of the application config
    pub fn from_config(config: &ApplicationConfig) -> Self {
        let mut context = Self::new();
        for (name, values) in config.context_sections() {
            debug!(section = %name, keys = values.len(), "Context::from_config: seeding section");
            context.merge_section(name, values);
        }
        context
    }

    pub fn section(&self, name: &str) -> Option<&Mapping> {
        self.sections.get(name)
    }

    pub fn get(&self, section: &str, key: &str) -> Option<&Value> {
        self.sections.get(section)?.get(key)
    }

    pub fn section_names(&self) -> impl Iterator<Item = &str> {
        self.sections.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.sections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sections.is_empty()
    }

    /// Merge `values` into section `name`, creating it if needed
    ///
    /// Later writes win per key; keys not present in `values` are kept.
    pub fn merge_section(&mut self, name: &str, values: &Mapping) {
        let section = self.sections.entry(name.to_string()).or_default();
        for (key, value) in values {
            section.insert(key.clone(), value.clone());
        }
    }

    /// Import section(s) of a YAML file into this context
    ///
    /// With `from_section = None` every mapping section of the file is merged
    /// under its own name. Otherwise `from_section` is merged into
    /// `into_section`, which defaults to `from_section`. The file is fully
    /// parsed before anything is merged, so a failed import leaves the context
    /// untouched.
    pub fn insert_from_file(
        &mut self,
        into_section: Option<&str>,
        from_section: Option<&str>,
        from_config_file: &Path,
    ) -> Result<(), ContextError> {
        debug!(
            ?into_section,
            ?from_section,
            ?from_config_file,
            "Context::insert_from_file: called"
        );
        let sections = read_sections(from_config_file)?;

        let Some(from_section) = from_section else {
            for (key, value) in &sections {
                let (Some(name), Some(values)) = (key.as_str(), value.as_mapping()) else {
                    warn!(path = %from_config_file.display(), key = ?key, "Skipping non-mapping context section");
                    continue;
                };
                self.merge_section(name, values);
            }
            return Ok(());
        };

        let values = match sections.get(from_section) {
            Some(Value::Mapping(values)) => values,
            Some(_) => {
                return Err(ContextError::SectionNotAMapping {
                    section: from_section.to_string(),
                    path: from_config_file.to_path_buf(),
                });
            }
            None => {
                return Err(ContextError::MissingSection {
                    section: from_section.to_string(),
                    path: from_config_file.to_path_buf(),
                });
            }
        };

        self.merge_section(into_section.unwrap_or(from_section), values);
        Ok(())
    }
}

fn read_sections(path: &Path) -> Result<Mapping, ContextError> {
    let content = fs::read_to_string(path).map_err(|source| ContextError::Read {
        path: path.to_path_buf(),
        source,
    })?;

    match serde_yaml::from_str(&content) {
        Ok(Value::Mapping(sections)) => Ok(sections),
        Ok(Value::Null) => Ok(Mapping::new()),
        Ok(_) => Err(ContextError::NotAMapping {
            path: path.to_path_buf(),
        }),
        Err(source) => Err(ContextError::Parse {
            path: path.to_path_buf(),
            source,
        }),
    }
}
