//! Modules
//!
//! A module binds an event listener to actions. Each `module/<name>` section
//! of the application config becomes one [`Module`] with four kinds of event
//! blocks (`on_startup`, `on_event`, `on_exit` and `on_modified.<template>`),
//! each holding `import_context`, `compile` and `run` actions.

pub mod config;
mod core;
pub mod placeholder;

pub use config::{ContextImportSpec, EventBlock, ModuleConfig, ModuleGate, OneOrMany, TemplateSpec, Trigger};
pub use self::core::{
    ContextSectionImport, EVENT_PLACEHOLDER, MODULE_PREFIX, Module, ModuleError, TemplateEntry, valid_section,
};
pub use placeholder::{PlaceholderError, Placeholders};
