//! CLI command definitions and subcommands

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// autodot - event-driven dotfile automation
#[derive(Debug, Parser)]
#[command(
    name = "ad",
    about = "Import context, compile templates and run shell hooks on events",
    version
)]
pub struct Cli {
    /// Config directory holding autodot.yml (default: $AUTODOT_CONFIG_HOME, then ~/.config/autodot)
    #[arg(short, long = "config-dir", global = true)]
    pub config_dir: Option<PathBuf>,

    /// Directory for engine-owned compilation targets
    #[arg(long = "temp-dir", global = true)]
    pub temp_dir: Option<PathBuf>,

    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    #[arg(
        short = 'l',
        long = "log-level",
        global = true,
        help = "Log level (TRACE, DEBUG, INFO, WARN, ERROR)"
    )]
    pub log_level: Option<String>,

    /// Write logs to this file instead of stderr
    #[arg(long = "log-file", global = true)]
    pub log_file: Option<PathBuf>,

    /// Subcommand to execute (default: run)
    #[command(subcommand)]
    pub command: Option<Command>,
}

/// CLI subcommands
#[derive(Debug, Clone, PartialEq, Eq, Subcommand)]
pub enum Command {
    /// Run startup actions, then react to events until interrupted
    Run,

    /// Validate the configuration and list enabled modules
    Check,

    /// Show every enabled module with its event and templates
    Modules,

    /// Render a template with the startup context and print it
    Render {
        /// Template reference as <module>.<template>
        #[arg(value_name = "MODULE.TEMPLATE")]
        reference: String,
    },
}
