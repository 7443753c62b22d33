//! Module manager error types

use thiserror::Error;

use crate::compiler::CompileError;
use crate::config::ConfigError;
use crate::module::ModuleError;

/// Errors raised while building or driving the module manager
#[derive(Debug, Error)]
pub enum ManagerError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Module(#[from] ModuleError),

    #[error("Template reference '{reference}' names unknown module '{module}'")]
    UnknownModule { module: String, reference: String },

    #[error("Module '{module}' has no active template '{template}'")]
    UnknownTemplate { module: String, template: String },

    #[error("Template reference '{0}' must be qualified as <module>.<template>")]
    UnqualifiedReference(String),

    #[error(transparent)]
    Compile(#[from] CompileError),
}
