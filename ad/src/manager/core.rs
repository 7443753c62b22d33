//! ModuleManager implementation

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use indexmap::IndexMap;
use serde_yaml::Mapping;
use tokio::sync::mpsc;
use tracing::{debug, error, info};

use super::error::ManagerError;
use crate::compiler::TemplateCompiler;
use crate::config::ApplicationConfig;
use crate::context::Context;
use crate::event_listener::STATIC_INTERVAL;
use crate::module::{ContextSectionImport, Module, ModuleError, TemplateEntry, Trigger, valid_section};
use crate::shell::{ShellOutcome, run_shell};
use crate::watcher::{DirectoryWatcher, WatcherConfig};

/// Result of routing a modified path through [`ModuleManager::modified`]
#[derive(Debug)]
pub enum ModifiedOutcome {
    /// The path is not managed, or hot reload is disabled
    Ignored,
    /// `on_modified` actions of a managed template ran
    Handled,
    /// The config was reloaded; the owner must use this manager from now on
    Reloaded(Box<ModuleManager>),
    /// The new config is invalid; the current manager stays active
    ReloadFailed(ManagerError),
}

/// Owns every module, the shared context and the scheduling state
#[derive(Debug)]
pub struct ModuleManager {
    config: ApplicationConfig,
    context: Context,
    modules: IndexMap<String, Module>,
    managed_templates: HashMap<PathBuf, (String, String)>,
    startup_done: bool,
    exited: bool,
    last_module_events: HashMap<String, String>,
    compiler: TemplateCompiler,
    directory_watcher: DirectoryWatcher,
    watch_tx: mpsc::Sender<PathBuf>,
}

impl ModuleManager {
    /// Build every enabled module of `config`, in section order
    ///
    /// Modified paths under the config directory are sent to `watch_tx` once
    /// startup has run. Sections that fail the `requires` check are skipped;
    /// any other module error rejects the whole manager.
    pub async fn new(config: ApplicationConfig, watch_tx: mpsc::Sender<PathBuf>) -> Result<Self, ManagerError> {
        debug!(config_directory = %config.runtime.config_directory.display(), "ModuleManager::new: called");
        let context = Context::from_config(&config);
        let requires_timeout = config.settings.requires_timeout();
        let mut modules: IndexMap<String, Module> = IndexMap::new();

        for (key, options) in config.sections() {
            let mut section = Mapping::new();
            section.insert(key.clone(), options.clone());

            if !valid_section(&section, requires_timeout, &config.runtime.config_directory).await? {
                continue;
            }

            let module = Module::from_section(&section, &config.runtime)?;
            modules.insert(module.name().to_string(), module);
        }

        let mut managed_templates = HashMap::new();
        for (module_name, module) in &modules {
            for (template, entry) in module.templates() {
                managed_templates.insert(entry.source.clone(), (module_name.clone(), template.clone()));
            }
        }

        let directory_watcher = DirectoryWatcher::new(
            config.runtime.config_directory.clone(),
            WatcherConfig::from_interval(config.settings.watch_interval()),
            watch_tx.clone(),
        );

        info!(
            modules = modules.len(),
            templates = managed_templates.len(),
            context_sections = context.len(),
            "ModuleManager ready"
        );

        Ok(Self {
            config,
            context,
            modules,
            managed_templates,
            startup_done: false,
            exited: false,
            last_module_events: HashMap::new(),
            compiler: TemplateCompiler::new(),
            directory_watcher,
            watch_tx,
        })
    }

    pub fn len(&self) -> usize {
        self.modules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modules.is_empty()
    }

    pub fn module_names(&self) -> impl Iterator<Item = &str> {
        self.modules.keys().map(String::as_str)
    }

    pub fn module(&self, name: &str) -> Option<&Module> {
        self.modules.get(name)
    }

    pub fn modules(&self) -> impl Iterator<Item = &Module> {
        self.modules.values()
    }

    pub fn context(&self) -> &Context {
        &self.context
    }

    pub fn config(&self) -> &ApplicationConfig {
        &self.config
    }

    /// `(module, template)` owning the template source at `path`
    pub fn managed_template(&self, path: &Path) -> Option<(&str, &str)> {
        self.managed_templates
            .get(path)
            .map(|(module, template)| (module.as_str(), template.as_str()))
    }

    pub fn startup_done(&self) -> bool {
        self.startup_done
    }

    pub fn is_watching(&self) -> bool {
        self.directory_watcher.is_running()
    }

    /// Current event of every module
    pub fn module_events(&self) -> HashMap<String, String> {
        self.modules
            .iter()
            .map(|(name, module)| (name.clone(), module.event()))
            .collect()
    }

    /// True if startup has not run or any module event changed since the last batch
    pub fn has_unfinished_tasks(&self) -> bool {
        !self.startup_done || self.module_events() != self.last_module_events
    }

    /// Time until the first module event may change
    pub fn time_until_next_event(&self) -> Duration {
        self.modules
            .values()
            .map(Module::time_until_next_event)
            .min()
            .unwrap_or(STATIC_INTERVAL)
    }

    /// Run every due batch
    ///
    /// The first call runs `on_startup` for every module and starts the
    /// directory watcher. Later calls run `on_event` for every module, but only
    /// when the combined module events differ from the last batch.
    pub async fn finish_tasks(&mut self) {
        debug!(startup_done = self.startup_done, "ModuleManager::finish_tasks: called");
        if !self.startup_done {
            self.last_module_events = self.module_events();
            self.import_context_sections(Trigger::Startup);
            self.compile_templates(Trigger::Startup);
            self.startup().await;
            return;
        }

        let events = self.module_events();
        if events == self.last_module_events {
            debug!("ModuleManager::finish_tasks: events unchanged");
            return;
        }

        info!(?events, "Module events changed");
        self.import_context_sections(Trigger::Event);
        self.compile_templates(Trigger::Event);
        self.on_event().await;
    }

    /// Merge every module's `import_context` entries for `trigger` into the context
    ///
    /// Modules are visited in declaration order, and imports in the order
    /// written, so later imports win on colliding keys.
    pub fn import_context_sections(&mut self, trigger: Trigger) {
        debug!(%trigger, "ModuleManager::import_context_sections: called");
        for module in self.modules.values() {
            import_into(&mut self.context, module.name(), module.context_section_imports(trigger));
        }
    }

    /// Compile every template requested by `trigger`'s `compile` entries
    pub fn compile_templates(&self, trigger: Trigger) {
        debug!(%trigger, "ModuleManager::compile_templates: called");
        for module in self.modules.values() {
            for reference in module.compile_requests(trigger) {
                if let Err(e) = self.compile_template(module.name(), reference) {
                    error!(module = %module.name(), %trigger, %reference, error = %e, "Failed to compile template");
                }
            }
        }
    }

    /// Compile one template reference on behalf of `requesting_module`
    ///
    /// `template` resolves against the requesting module; `module.template`
    /// resolves against the named module.
    pub fn compile_template(&self, requesting_module: &str, reference: &str) -> Result<(), ManagerError> {
        let (module, template) = reference.split_once('.').unwrap_or((requesting_module, reference));
        let entry = self.template_entry(module, template, reference)?;
        self.compiler
            .compile_template(&entry.source, &entry.target, &self.context)?;
        Ok(())
    }

    /// Render a `module.template` reference with the current context
    pub fn render_template(&self, reference: &str) -> Result<String, ManagerError> {
        let (module, template) = reference
            .split_once('.')
            .ok_or_else(|| ManagerError::UnqualifiedReference(reference.to_string()))?;
        let entry = self.template_entry(module, template, reference)?;
        Ok(self.compiler.render(&entry.source, &self.context)?)
    }

    fn template_entry(
        &self,
        module: &str,
        template: &str,
        reference: &str,
    ) -> Result<&TemplateEntry, ManagerError> {
        let owner = self.modules.get(module).ok_or_else(|| ManagerError::UnknownModule {
            module: module.to_string(),
            reference: reference.to_string(),
        })?;
        owner.template(template).ok_or_else(|| ManagerError::UnknownTemplate {
            module: module.to_string(),
            template: template.to_string(),
        })
    }

    /// Run every module's `on_startup` commands, then start watching
    pub async fn startup(&mut self) {
        debug!("ModuleManager::startup: called");
        self.run_trigger_commands(Trigger::Startup).await;
        self.startup_done = true;
        if let Err(e) = self.directory_watcher.start() {
            error!(
                directory = %self.directory_watcher.directory().display(),
                error = %e,
                "Failed to watch config directory"
            );
        }
    }

    /// Run every module's `on_event` commands and record the current events
    pub async fn on_event(&mut self) {
        debug!("ModuleManager::on_event: called");
        self.run_trigger_commands(Trigger::Event).await;
        self.last_module_events = self.module_events();
    }

    /// Run `on_exit` actions, release temp files and stop watching
    ///
    /// Only the first call has any effect.
    pub async fn exit(&mut self) {
        if self.exited {
            debug!("ModuleManager::exit: already exited");
            return;
        }
        debug!("ModuleManager::exit: called");
        self.exited = true;

        self.import_context_sections(Trigger::Exit);
        self.compile_templates(Trigger::Exit);
        self.run_trigger_commands(Trigger::Exit).await;

        for module in self.modules.values_mut() {
            module.release_temp_files();
        }
        self.directory_watcher.stop();
        info!(modules = self.modules.len(), "ModuleManager exited");
    }

    async fn run_trigger_commands(&self, trigger: Trigger) {
        for module in self.modules.values() {
            self.run_commands(module, trigger.as_str(), module.run_requests(trigger))
                .await;
        }
    }

    /// Run `commands` in order; one that fails to interpolate is skipped
    async fn run_commands(&self, module: &Module, trigger: &str, commands: &[String]) {
        for command in commands {
            match module.interpolate(command) {
                Ok(command) => self.run_command(module.name(), trigger, &command).await,
                Err(e) => error!(module = %module.name(), %trigger, %command, error = %e, "Skipping command"),
            }
        }
    }

    async fn run_command(&self, module: &str, trigger: &str, command: &str) {
        info!(%module, %trigger, %command, "Running command");
        let outcome = run_shell(
            command,
            self.config.settings.run_timeout(),
            &self.config.runtime.config_directory,
        )
        .await;

        match &outcome {
            ShellOutcome::Success { output } => {
                debug!(%module, %command, %output, "ModuleManager::run_command: succeeded");
            }
            ShellOutcome::Launched => {
                debug!(%module, %command, "ModuleManager::run_command: launched");
            }
            ShellOutcome::Failed { output, .. } => {
                error!(%module, %command, %outcome, %output, "Command failed");
            }
            _ => error!(%module, %command, %outcome, "Command failed"),
        }
    }

    /// Handle a modified file below the config directory
    ///
    /// A modified `autodot.yml` reloads the config when hot reload is enabled.
    /// A modified template source runs the `on_modified.<template>` block of
    /// its module. Every other path is ignored.
    pub async fn modified(&mut self, path: &Path) -> ModifiedOutcome {
        debug!(path = %path.display(), "ModuleManager::modified: called");

        if path == self.config.runtime.config_file() {
            if !self.config.settings.hot_reload {
                debug!("ModuleManager::modified: hot reload disabled");
                return ModifiedOutcome::Ignored;
            }
            info!(path = %path.display(), "Config file modified, reloading");
            return match self.reload().await {
                Ok(manager) => ModifiedOutcome::Reloaded(Box::new(manager)),
                Err(e) => {
                    error!(error = %e, "New configuration is invalid, keeping the current modules");
                    ModifiedOutcome::ReloadFailed(e)
                }
            };
        }

        let Some((module_name, template)) = self.managed_templates.get(path).cloned() else {
            return ModifiedOutcome::Ignored;
        };
        let Some(module) = self.modules.get(&module_name) else {
            return ModifiedOutcome::Ignored;
        };
        info!(module = %module_name, %template, "Template source modified");

        import_into(
            &mut self.context,
            &module_name,
            module.modified_context_section_imports(&template),
        );

        for reference in module.modified_compile_requests(&template) {
            if let Err(e) = self.compile_template(&module_name, reference) {
                error!(module = %module_name, %reference, error = %e, "Failed to compile template");
            }
        }

        let trigger = format!("on_modified.{}", template);
        self.run_commands(module, &trigger, module.modified_run_requests(&template))
            .await;

        ModifiedOutcome::Handled
    }

    /// Build a manager from the config file on disk and hand over to it
    ///
    /// The new manager is fully built before anything else happens; if that
    /// fails, this manager is untouched. Otherwise this manager runs its exit
    /// actions and the new one runs its startup actions. The caller must
    /// replace this manager with the returned one.
    pub async fn reload(&mut self) -> Result<ModuleManager, ManagerError> {
        debug!("ModuleManager::reload: called");
        let config = ApplicationConfig::load(self.config.runtime.clone())?;
        let mut manager = ModuleManager::new(config, self.watch_tx.clone()).await?;

        self.exit().await;
        manager.finish_tasks().await;

        info!(modules = manager.len(), "Configuration reloaded");
        Ok(manager)
    }
}

fn import_into(
    context: &mut Context,
    module: &str,
    imports: Vec<Result<ContextSectionImport, ModuleError>>,
) {
    for import in imports {
        let import = match import {
            Ok(import) => import,
            Err(e) => {
                error!(%module, error = %e, "Skipping context import");
                continue;
            }
        };
        if let Err(e) = context.insert_from_file(
            import.into_section.as_deref(),
            import.from_section.as_deref(),
            &import.from_config_file,
        ) {
            error!(%module, error = %e, "Failed to import context");
        }
    }
}
