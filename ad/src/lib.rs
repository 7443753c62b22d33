//! autodot - Event-driven dotfile automation
//!
//! autodot reads `autodot.yml` from a config directory and turns every
//! `module/<name>` section into a module: an event listener bound to actions
//! that import template context, compile templates and run shell commands.
//!
//! # Core Concepts
//!
//! - **Triggers**: actions run on startup, when module events change, on exit,
//!   and when a template source is modified
//! - **Shared Context**: imported sections merge key by key, in module order
//! - **Hot Reload**: a modified `autodot.yml` replaces every module at once, or
//!   nothing at all when the new config is invalid
//!
//! # Modules
//!
//! - [`config`] - Application config and settings
//! - [`context`] - Template context store
//! - [`compiler`] - Handlebars template compiler
//! - [`event_listener`] - Event listener trait and implementations
//! - [`module`] - Module config schema and action resolution
//! - [`manager`] - Module manager: scheduling, dispatch and hot reload
//! - [`watcher`] - Config directory watcher
//! - [`shell`] - Shell command execution
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod compiler;
pub mod config;
pub mod context;
pub mod event_listener;
pub mod manager;
pub mod module;
pub mod shell;
pub mod watcher;

pub use compiler::{CompileError, TemplateCompiler};
pub use config::{ApplicationConfig, ConfigError, RuntimePaths, Settings};
pub use context::{Context, ContextError};
pub use event_listener::{EventListener, EventListenerConfig};
pub use manager::{ManagerError, ModifiedOutcome, ModuleManager};
pub use module::{Module, ModuleConfig, ModuleError, Trigger};
pub use watcher::{DirectoryWatcher, WatcherConfig};
