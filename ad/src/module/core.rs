//! A single configured module

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde_yaml::{Mapping, Value};
use tempfile::NamedTempFile;
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::{ContextImportSpec, EventBlock, ModuleConfig, ModuleGate, Trigger};
use super::placeholder::{self, PlaceholderError, Placeholders};
use crate::config::RuntimePaths;
use crate::event_listener::{EventListener, EventListenerError, event_listener_factory};
use crate::shell::run_shell;

/// Prefix of module section names
pub const MODULE_PREFIX: &str = "module/";

/// Placeholder replaced by the module's current event
pub const EVENT_PLACEHOLDER: &str = "event";

/// Errors raised while building or querying a module
#[derive(Debug, Error)]
pub enum ModuleError {
    #[error("A module section must have exactly one key, found {count}")]
    SectionCount { count: usize },

    #[error("Invalid module section name {0:?}, expected 'module/<name>'")]
    InvalidName(String),

    #[error("[module/{module}] Invalid options: {source}")]
    Options {
        module: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("[module/{module}] Unknown trigger '{reference}'")]
    UnknownTrigger { module: String, reference: String },

    #[error("[module/{module}] {source}")]
    Placeholder {
        module: String,
        #[source]
        source: PlaceholderError,
    },

    #[error("[module/{module}] Invalid event listener: {source}")]
    EventListener {
        module: String,
        #[source]
        source: EventListenerError,
    },

    #[error("[module/{module}] Failed to create temp file for template '{template}'")]
    TempFile {
        module: String,
        template: String,
        #[source]
        source: std::io::Error,
    },
}

/// A template with resolved paths
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateEntry {
    pub source: PathBuf,
    pub target: PathBuf,
}

/// A resolved context import
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextSectionImport {
    /// Context section to merge into; `None` imports every section
    pub into_section: Option<String>,
    /// Section of the file to import; `None` imports every section
    pub from_section: Option<String>,
    pub from_config_file: PathBuf,
}

/// One module: its options, event listener and resolved templates
#[derive(Debug)]
pub struct Module {
    name: String,
    config: ModuleConfig,
    paths: RuntimePaths,
    event_listener: Box<dyn EventListener>,
    templates: IndexMap<String, TemplateEntry>,
    temp_files: Vec<NamedTempFile>,
}

impl Module {
    /// Build a module from a single `module/<name>: options` mapping
    pub fn from_section(section: &Mapping, paths: &RuntimePaths) -> Result<Self, ModuleError> {
        let (key, options) = single_entry(section)?;
        let Some(key) = key.as_str() else {
            return Err(ModuleError::InvalidName(format!("{:?}", key)));
        };
        let name = key
            .strip_prefix(MODULE_PREFIX)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| ModuleError::InvalidName(key.to_string()))?;
        debug!(%name, "Module::from_section: called");

        let config = match options {
            Value::Null => ModuleConfig::default(),
            options => serde_yaml::from_value(options.clone()).map_err(|source| ModuleError::Options {
                module: name.to_string(),
                source,
            })?,
        };

        Self::new(name, config, paths)
    }

    /// Build a module from parsed options
    pub fn new(name: impl Into<String>, mut config: ModuleConfig, paths: &RuntimePaths) -> Result<Self, ModuleError> {
        let name = name.into();
        debug!(%name, "Module::new: called");

        config
            .resolve_trigger_imports()
            .map_err(|reference| ModuleError::UnknownTrigger {
                module: name.clone(),
                reference,
            })?;

        let event_listener =
            event_listener_factory(&config.event_listener, paths).map_err(|source| ModuleError::EventListener {
                module: name.clone(),
                source,
            })?;

        validate_placeholders(&config).map_err(|source| ModuleError::Placeholder {
            module: name.clone(),
            source,
        })?;

        let mut module = Self {
            name,
            config,
            paths: paths.clone(),
            event_listener,
            templates: IndexMap::new(),
            temp_files: Vec::new(),
        };
        module.prepare_templates()?;

        info!(
            module = %module.name,
            listener = module.event_listener.kind(),
            templates = module.templates.len(),
            "Module ready"
        );
        Ok(module)
    }

    fn prepare_templates(&mut self) -> Result<(), ModuleError> {
        let declared = self.config.templates.clone();
        for (template, spec) in declared {
            let source = self.paths.expand_path(&spec.source);
            if !source.is_file() {
                warn!(
                    module = %self.name,
                    %template,
                    source = %source.display(),
                    "Template source does not exist, skipping template"
                );
                continue;
            }

            let target = match spec.target.as_deref() {
                Some(target) if !target.is_empty() => self.paths.expand_path(target),
                _ => self.create_temp_file(&template)?,
            };
            debug!(module = %self.name, %template, ?source, ?target, "Module::prepare_templates: resolved");
            self.templates.insert(template, TemplateEntry { source, target });
        }
        Ok(())
    }

    fn create_temp_file(&mut self, template: &str) -> Result<PathBuf, ModuleError> {
        let temp_error = |source| ModuleError::TempFile {
            module: self.name.clone(),
            template: template.to_string(),
            source,
        };
        fs::create_dir_all(&self.paths.temp_directory).map_err(temp_error)?;
        let file = tempfile::Builder::new()
            .prefix(&format!("{}-", self.name))
            .tempfile_in(&self.paths.temp_directory)
            .map_err(temp_error)?;

        let path = file.path().to_path_buf();
        self.temp_files.push(file);
        Ok(path)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn config(&self) -> &ModuleConfig {
        &self.config
    }

    /// Active templates; templates with a missing source are not included
    pub fn templates(&self) -> &IndexMap<String, TemplateEntry> {
        &self.templates
    }

    pub fn template(&self, name: &str) -> Option<&TemplateEntry> {
        self.templates.get(name)
    }

    pub fn event(&self) -> String {
        self.event_listener.event()
    }

    pub fn time_until_next_event(&self) -> Duration {
        self.event_listener.time_until_next_event()
    }

    pub fn event_listener_kind(&self) -> &'static str {
        self.event_listener.kind()
    }

    fn placeholders(&self) -> Placeholders {
        let mut placeholders = Placeholders::new();
        placeholders.insert(EVENT_PLACEHOLDER, self.event());
        for (name, template) in &self.templates {
            placeholders.insert(name.as_str(), template.target.display().to_string());
        }
        placeholders
    }

    /// Replace `{event}` and `{<template>}` placeholders in `command`
    ///
    /// Fails when a placeholder names a template that was skipped because its
    /// source does not exist.
    pub fn interpolate(&self, command: &str) -> Result<String, ModuleError> {
        self.placeholders()
            .interpolate(command)
            .map_err(|source| self.placeholder_error(source))
    }

    fn interpolate_all(&self, commands: &[String]) -> Result<Vec<String>, ModuleError> {
        let placeholders = self.placeholders();
        commands
            .iter()
            .map(|command| placeholders.interpolate(command))
            .collect::<Result<_, _>>()
            .map_err(|source| self.placeholder_error(source))
    }

    fn placeholder_error(&self, source: PlaceholderError) -> ModuleError {
        ModuleError::Placeholder {
            module: self.name.clone(),
            source,
        }
    }

    /// Configured `run` commands of a top-level trigger, before interpolation
    pub fn run_requests(&self, trigger: Trigger) -> &[String] {
        &self.config.block(trigger).run
    }

    /// Configured `run` commands of `on_modified.<template>`, before interpolation
    pub fn modified_run_requests(&self, template: &str) -> &[String] {
        self.config
            .on_modified
            .get(template)
            .map(|block| block.run.as_slice())
            .unwrap_or_default()
    }

    /// Interpolated `run` commands of a top-level trigger
    ///
    /// Fails as a whole if any command fails to interpolate; use
    /// [`Module::run_requests`] with [`Module::interpolate`] to handle
    /// commands one by one.
    pub fn commands(&self, trigger: Trigger) -> Result<Vec<String>, ModuleError> {
        self.interpolate_all(self.run_requests(trigger))
    }

    pub fn startup_commands(&self) -> Result<Vec<String>, ModuleError> {
        self.commands(Trigger::Startup)
    }

    pub fn on_event_commands(&self) -> Result<Vec<String>, ModuleError> {
        self.commands(Trigger::Event)
    }

    pub fn exit_commands(&self) -> Result<Vec<String>, ModuleError> {
        self.commands(Trigger::Exit)
    }

    /// Interpolated `run` commands of `on_modified.<template>`
    pub fn modified_commands(&self, template: &str) -> Result<Vec<String>, ModuleError> {
        self.interpolate_all(self.modified_run_requests(template))
    }

    /// Template references to compile for a top-level trigger
    pub fn compile_requests(&self, trigger: Trigger) -> &[String] {
        &self.config.block(trigger).compile
    }

    /// Template references to compile when `template` is modified
    pub fn modified_compile_requests(&self, template: &str) -> &[String] {
        self.config
            .on_modified
            .get(template)
            .map(|block| block.compile.as_slice())
            .unwrap_or_default()
    }

    /// Resolved `import_context` entries of a top-level trigger
    ///
    /// Each entry resolves on its own; one that fails to interpolate does not
    /// affect the others.
    pub fn context_section_imports(&self, trigger: Trigger) -> Vec<Result<ContextSectionImport, ModuleError>> {
        self.resolve_imports(self.config.block(trigger))
    }

    /// Resolved `import_context` entries of `on_modified.<template>`
    pub fn modified_context_section_imports(&self, template: &str) -> Vec<Result<ContextSectionImport, ModuleError>> {
        match self.config.on_modified.get(template) {
            Some(block) => self.resolve_imports(block),
            None => Vec::new(),
        }
    }

    fn resolve_imports(&self, block: &EventBlock) -> Vec<Result<ContextSectionImport, ModuleError>> {
        let placeholders = self.placeholders();
        block
            .import_context
            .iter()
            .map(|spec| self.resolve_import(spec, &placeholders))
            .collect()
    }

    fn resolve_import(
        &self,
        spec: &ContextImportSpec,
        placeholders: &Placeholders,
    ) -> Result<ContextSectionImport, ModuleError> {
        let interpolate = |value: &str| {
            placeholders
                .interpolate(value)
                .map_err(|source| self.placeholder_error(source))
        };

        let from_path = interpolate(&spec.from_path)?;
        let (into_section, from_section) = match spec.from_section.as_deref() {
            Some(from_section) => {
                let from_section = interpolate(from_section)?;
                let into_section = match spec.to_section.as_deref() {
                    Some(to_section) => interpolate(to_section)?,
                    None => from_section.clone(),
                };
                (Some(into_section), Some(from_section))
            }
            None => (None, None),
        };

        Ok(ContextSectionImport {
            into_section,
            from_section,
            from_config_file: self.paths.expand_path(from_path),
        })
    }

    /// Delete every engine-owned temp file
    ///
    /// Targets of templates without a configured `target` stop existing
    /// afterwards. Calling this more than once is a no-op.
    pub fn release_temp_files(&mut self) {
        for file in self.temp_files.drain(..) {
            let path = file.path().to_path_buf();
            if let Err(e) = file.close() {
                warn!(module = %self.name, path = %path.display(), error = %e, "Failed to remove temp file");
            } else {
                debug!(module = %self.name, ?path, "Module::release_temp_files: removed");
            }
        }
    }

    pub fn owns_temp_files(&self) -> bool {
        !self.temp_files.is_empty()
    }
}

fn single_entry(section: &Mapping) -> Result<(&Value, &Value), ModuleError> {
    let mut entries = section.iter();
    match (entries.next(), entries.next()) {
        (Some(entry), None) => Ok(entry),
        _ => Err(ModuleError::SectionCount { count: section.len() }),
    }
}

/// Every placeholder in a module must name the event or a declared template
fn validate_placeholders(config: &ModuleConfig) -> Result<(), PlaceholderError> {
    let known = |name: &str| name == EVENT_PLACEHOLDER || config.templates.contains_key(name);
    for block in config.blocks() {
        validate_block(block, known)?;
    }
    Ok(())
}

fn validate_block(block: &EventBlock, known: impl Fn(&str) -> bool) -> Result<(), PlaceholderError> {
    for command in &block.run {
        placeholder::validate(command, &known)?;
    }
    for spec in &block.import_context {
        placeholder::validate(&spec.from_path, &known)?;
        for section in [&spec.from_section, &spec.to_section].into_iter().flatten() {
            placeholder::validate(section, &known)?;
        }
    }
    Ok(())
}

/// Check whether `section` is an enabled module whose requirements hold
///
/// Sections outside the `module/` namespace and disabled modules are not
/// valid. Each `requires` command runs in `working_directory`; a failing or
/// timed out requirement disables the module with a warning.
pub async fn valid_section(
    section: &Mapping,
    requires_timeout: Duration,
    working_directory: &Path,
) -> Result<bool, ModuleError> {
    let (key, options) = single_entry(section)?;
    let Some(name) = key.as_str().and_then(|key| key.strip_prefix(MODULE_PREFIX)) else {
        return Ok(false);
    };
    debug!(%name, "valid_section: called");

    let gate: ModuleGate = match options {
        Value::Null => ModuleGate::default(),
        options => serde_yaml::from_value(options.clone()).map_err(|source| ModuleError::Options {
            module: name.to_string(),
            source,
        })?,
    };
    if !gate.enabled {
        info!(module = %name, "Module disabled");
        return Ok(false);
    }

    for requirement in gate.requirements() {
        let outcome = run_shell(requirement, requires_timeout, working_directory).await;
        if !outcome.succeeded() {
            warn!(module = %name, %requirement, %outcome, "Module does not satisfy requirement");
            return Ok(false);
        }
    }

    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    struct Fixture {
        _temp: TempDir,
        paths: RuntimePaths,
    }

    fn fixture() -> Fixture {
        let temp = TempDir::new().unwrap();
        let config_dir = temp.path().join("config");
        fs::create_dir_all(&config_dir).unwrap();
        let paths = RuntimePaths::new(config_dir, temp.path().join("tmp"));
        Fixture { _temp: temp, paths }
    }

    fn section(yaml: &str) -> Mapping {
        serde_yaml::from_str(yaml).unwrap()
    }

    fn module(fixture: &Fixture, yaml: &str) -> Module {
        Module::from_section(&section(yaml), &fixture.paths).unwrap()
    }

    #[test]
    fn test_startup_commands_interpolate_event() {
        let fixture = fixture();
        let module = module(
            &fixture,
            r#"
module/greeter:
  enabled: true
  event_listener:
    type: static
  on_startup:
    run: ["echo {event}"]
"#,
        );

        assert_eq!(module.name(), "greeter");
        assert_eq!(module.startup_commands().unwrap(), vec!["echo static"]);
    }

    #[test]
    fn test_empty_blocks_give_empty_commands() {
        let fixture = fixture();
        let module = module(&fixture, "module/empty: {}\n");

        assert!(module.startup_commands().unwrap().is_empty());
        assert!(module.on_event_commands().unwrap().is_empty());
        assert!(module.exit_commands().unwrap().is_empty());
        assert!(module.modified_commands("anything").unwrap().is_empty());
        assert!(module.compile_requests(Trigger::Startup).is_empty());
        assert!(module.context_section_imports(Trigger::Event).is_empty());
        assert!(module.modified_run_requests("anything").is_empty());
    }

    #[test]
    fn test_null_options_are_defaults() {
        let fixture = fixture();
        let module = module(&fixture, "module/bare:\n");
        assert_eq!(module.event(), "static");
    }

    #[test]
    fn test_section_count_is_checked() {
        let fixture = fixture();
        let result = Module::from_section(&section("module/a: {}\nmodule/b: {}\n"), &fixture.paths);
        assert!(matches!(result, Err(ModuleError::SectionCount { count: 2 })));

        let result = Module::from_section(&Mapping::new(), &fixture.paths);
        assert!(matches!(result, Err(ModuleError::SectionCount { count: 0 })));
    }

    #[test]
    fn test_invalid_section_name() {
        let fixture = fixture();
        let result = Module::from_section(&section("context/a: {}\n"), &fixture.paths);
        assert!(matches!(result, Err(ModuleError::InvalidName(_))));
    }

    #[test]
    fn test_unknown_placeholder_is_fatal() {
        let fixture = fixture();
        let result = Module::from_section(
            &section("module/bad:\n  on_exit:\n    run: [\"echo {nope}\"]\n"),
            &fixture.paths,
        );
        assert!(matches!(result, Err(ModuleError::Placeholder { .. })));
    }

    #[test]
    fn test_unknown_trigger_is_fatal() {
        let fixture = fixture();
        let result = Module::from_section(
            &section("module/bad:\n  on_startup:\n    trigger: on_sunset\n"),
            &fixture.paths,
        );
        assert!(matches!(result, Err(ModuleError::UnknownTrigger { .. })));
    }

    #[test]
    fn test_template_without_target_gets_temp_file() {
        let fixture = fixture();
        fs::write(fixture.paths.config_directory.join("t.conf"), "hello").unwrap();
        let mut module = module(
            &fixture,
            r#"
module/bar:
  templates:
    main:
      source: t.conf
  on_startup:
    run: ["cat {main}"]
"#,
        );

        let entry = module.template("main").unwrap().clone();
        assert_eq!(entry.source, fixture.paths.config_directory.join("t.conf"));
        assert!(entry.target.starts_with(&fixture.paths.temp_directory));
        assert!(entry.target.exists());
        assert!(
            entry
                .target
                .file_name()
                .unwrap()
                .to_string_lossy()
                .starts_with("bar-")
        );
        assert_eq!(
            module.startup_commands().unwrap(),
            vec![format!("cat {}", entry.target.display())]
        );

        module.release_temp_files();
        assert!(!entry.target.exists());
        assert!(!module.owns_temp_files());
        module.release_temp_files();
    }

    #[test]
    fn test_temp_targets_are_unique() {
        let fixture = fixture();
        fs::write(fixture.paths.config_directory.join("t.conf"), "hello").unwrap();
        let yaml = "module/bar:\n  templates:\n    main:\n      source: t.conf\n";

        let first = module(&fixture, yaml);
        let second = module(&fixture, yaml);
        assert_ne!(
            first.template("main").unwrap().target,
            second.template("main").unwrap().target
        );
    }

    #[test]
    fn test_explicit_target_is_expanded() {
        let fixture = fixture();
        fs::write(fixture.paths.config_directory.join("t.conf"), "hello").unwrap();
        let module = module(
            &fixture,
            "module/bar:\n  templates:\n    main:\n      source: t.conf\n      target: out/bar.conf\n",
        );

        let entry = module.template("main").unwrap();
        assert_eq!(entry.target, fixture.paths.config_directory.join("out/bar.conf"));
        assert!(!module.owns_temp_files());
    }

    #[test]
    fn test_missing_template_source_is_skipped() {
        let fixture = fixture();
        let module = module(
            &fixture,
            r#"
module/bar:
  templates:
    main:
      source: missing.conf
  on_startup:
    run: ["echo {event}"]
"#,
        );

        assert!(module.templates().is_empty());
        assert_eq!(module.startup_commands().unwrap(), vec!["echo static"]);
    }

    #[test]
    fn test_context_section_imports() {
        let fixture = fixture();
        let module = module(
            &fixture,
            r#"
module/colors:
  on_event:
    import_context:
      - from_path: "themes/{event}.yml"
        from_section: colors
      - from_path: fonts.yml
        from_section: "{event}"
        to_section: fonts
      - from_path: /abs/all.yml
"#,
        );

        let imports: Vec<_> = module
            .context_section_imports(Trigger::Event)
            .into_iter()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(
            imports,
            vec![
                ContextSectionImport {
                    into_section: Some("colors".to_string()),
                    from_section: Some("colors".to_string()),
                    from_config_file: fixture.paths.config_directory.join("themes/static.yml"),
                },
                ContextSectionImport {
                    into_section: Some("fonts".to_string()),
                    from_section: Some("static".to_string()),
                    from_config_file: fixture.paths.config_directory.join("fonts.yml"),
                },
                ContextSectionImport {
                    into_section: None,
                    from_section: None,
                    from_config_file: PathBuf::from("/abs/all.yml"),
                },
            ]
        );
    }

    #[test]
    fn test_modified_queries() {
        let fixture = fixture();
        fs::write(fixture.paths.config_directory.join("t.conf"), "hello").unwrap();
        let module = module(
            &fixture,
            r#"
module/bar:
  templates:
    main:
      source: t.conf
  on_modified:
    main:
      compile: [main, other.theme]
      run: ["reload {main}"]
"#,
        );

        assert_eq!(module.modified_compile_requests("main"), ["main", "other.theme"]);
        assert!(module.modified_compile_requests("unknown").is_empty());
        let target = module.template("main").unwrap().target.display().to_string();
        assert_eq!(module.modified_commands("main").unwrap(), vec![format!("reload {}", target)]);
    }

    #[tokio::test]
    async fn test_valid_section() {
        let fixture = fixture();
        let dir = &fixture.paths.config_directory;
        let timeout = Duration::from_secs(5);

        assert!(valid_section(&section("module/a: {}\n"), timeout, dir).await.unwrap());
        assert!(valid_section(&section("module/a:\n"), timeout, dir).await.unwrap());
        assert!(
            !valid_section(&section("module/a:\n  enabled: false\n"), timeout, dir)
                .await
                .unwrap()
        );
        assert!(!valid_section(&section("context/a: {}\n"), timeout, dir).await.unwrap());
        assert!(!valid_section(&section("settings/autodot: {}\n"), timeout, dir).await.unwrap());
    }

    #[tokio::test]
    async fn test_valid_section_requirements() {
        let fixture = fixture();
        let dir = &fixture.paths.config_directory;
        let timeout = Duration::from_secs(5);

        assert!(
            valid_section(&section("module/a:\n  requires: \"true\"\n"), timeout, dir)
                .await
                .unwrap()
        );
        assert!(
            !valid_section(&section("module/a:\n  requires: [\"true\", \"false\"]\n"), timeout, dir)
                .await
                .unwrap()
        );
        assert!(
            !valid_section(&section("module/a:\n  requires: \"sleep 5\"\n"), Duration::from_millis(100), dir)
                .await
                .unwrap()
        );
    }

    #[tokio::test]
    async fn test_zero_requires_timeout_waits_for_requirement() {
        let fixture = fixture();
        let settings = crate::config::Settings {
            requires_timeout: 0.0,
            ..Default::default()
        };

        assert!(
            valid_section(
                &section("module/a:\n  requires: \"sleep 0.1\"\n"),
                settings.requires_timeout(),
                &fixture.paths.config_directory,
            )
            .await
            .unwrap()
        );
    }

    #[test]
    fn test_interpolate_one_command_at_a_time() {
        let fixture = fixture();
        let module = module(
            &fixture,
            r#"
module/a:
  templates:
    main:
      source: missing.conf
  on_startup:
    run: ["echo a", "cat {main}", "echo {event}"]
"#,
        );

        let results: Vec<_> = module
            .run_requests(Trigger::Startup)
            .iter()
            .map(|command| module.interpolate(command))
            .collect();

        assert_eq!(results[0].as_deref().unwrap(), "echo a");
        assert!(matches!(results[1], Err(ModuleError::Placeholder { .. })));
        assert_eq!(results[2].as_deref().unwrap(), "echo static");
        assert!(module.startup_commands().is_err());
    }

    #[tokio::test]
    async fn test_valid_section_rejects_multiple_keys() {
        let fixture = fixture();
        let result = valid_section(
            &section("module/a: {}\nmodule/b: {}\n"),
            Duration::from_secs(1),
            &fixture.paths.config_directory,
        )
        .await;
        assert!(matches!(result, Err(ModuleError::SectionCount { count: 2 })));
    }
}
