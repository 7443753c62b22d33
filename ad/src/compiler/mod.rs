//! Template compilation
//!
//! Renders a template source file with the current [`Context`] and writes the
//! result to its target. Templates use Handlebars syntax (`{{colors.primary}}`);
//! output is not HTML-escaped, since targets are arbitrary config files.

use std::fs;
use std::path::{Path, PathBuf};

use handlebars::Handlebars;
use thiserror::Error;
use tracing::{debug, info};

use crate::context::Context;

/// Errors raised while compiling a template
#[derive(Debug, Error)]
pub enum CompileError {
    #[error("Failed to read template {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Context cannot be exposed to templates: {0}")]
    Context(#[source] serde_json::Error),

    #[error("Failed to render template {path}: {source}")]
    Render {
        path: PathBuf,
        #[source]
        source: Box<handlebars::RenderError>,
    },

    #[error("Failed to write compiled template to {path}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Handlebars-backed template compiler
pub struct TemplateCompiler {
    hbs: Handlebars<'static>,
}

impl Default for TemplateCompiler {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for TemplateCompiler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TemplateCompiler").finish_non_exhaustive()
    }
}

impl TemplateCompiler {
    pub fn new() -> Self {
        let mut hbs = Handlebars::new();
        hbs.register_escape_fn(handlebars::no_escape);
        Self { hbs }
    }

    /// Render the template at `source` and return the output
    pub fn render(&self, source: &Path, context: &Context) -> Result<String, CompileError> {
        debug!(?source, sections = context.len(), "TemplateCompiler::render: called");
        let template = fs::read_to_string(source).map_err(|e| CompileError::Read {
            path: source.to_path_buf(),
            source: e,
        })?;

        let data = serde_json::to_value(context).map_err(CompileError::Context)?;

        self.hbs
            .render_template(&template, &data)
            .map_err(|e| CompileError::Render {
                path: source.to_path_buf(),
                source: Box::new(e),
            })
    }

    /// Render `source` and write the output to `target`
    ///
    /// The target is overwritten in place, so engine-owned temp files keep
    /// their path. Missing parent directories of the target are created.
    pub fn compile_template(&self, source: &Path, target: &Path, context: &Context) -> Result<(), CompileError> {
        debug!(?source, ?target, "TemplateCompiler::compile_template: called");
        let output = self.render(source, context)?;

        if let Some(parent) = target.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| CompileError::Write {
                path: target.to_path_buf(),
                source: e,
            })?;
        }

        fs::write(target, output).map_err(|e| CompileError::Write {
            path: target.to_path_buf(),
            source: e,
        })?;

        info!(source = %source.display(), target = %target.display(), "Compiled template");
        Ok(())
    }
}
