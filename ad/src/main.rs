//! autodot - Event-driven dotfile automation
//!
//! CLI entry point for running and inspecting module configurations.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use eyre::{Context, Result};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use autodot::cli::{Cli, Command};
use autodot::config::{ApplicationConfig, RuntimePaths, default_temp_directory, infer_config_directory};
use autodot::manager::{ModifiedOutcome, ModuleManager};
use autodot::module::Trigger;

/// Capacity of the modified-path channel between watcher and daemon loop
const WATCH_CHANNEL_CAPACITY: usize = 64;

/// Bounds of the sleep between event checks
const MIN_TICK: Duration = Duration::from_millis(10);
const MAX_TICK: Duration = Duration::from_secs(60);

fn parse_level(level: &str) -> tracing::Level {
    match level.to_uppercase().as_str() {
        "TRACE" => tracing::Level::TRACE,
        "DEBUG" => tracing::Level::DEBUG,
        "INFO" => tracing::Level::INFO,
        "WARN" | "WARNING" => tracing::Level::WARN,
        "ERROR" => tracing::Level::ERROR,
        _ => {
            eprintln!("Warning: Unknown log-level '{}', defaulting to INFO", level);
            tracing::Level::INFO
        }
    }
}

fn setup_logging(cli_log_level: Option<&str>, config_log_level: Option<&str>, log_file: Option<&Path>) -> Result<()> {
    // Priority: CLI --log-level > settings/autodot log_level > INFO
    let level = cli_log_level
        .or(config_log_level)
        .map(parse_level)
        .unwrap_or(tracing::Level::INFO);
    let filter = tracing_subscriber::EnvFilter::from_default_env().add_directive(level.into());

    match log_file {
        Some(path) => {
            if let Some(parent) = path.parent()
                && !parent.as_os_str().is_empty()
            {
                fs::create_dir_all(parent).context("Failed to create log directory")?;
            }
            let file = fs::File::create(path).context("Failed to create log file")?;
            tracing_subscriber::fmt()
                .with_writer(file)
                .with_ansi(false)
                .with_env_filter(filter)
                .init();
        }
        None => {
            tracing_subscriber::fmt()
                .with_writer(std::io::stderr)
                .with_env_filter(filter)
                .init();
        }
    }

    info!("Logging initialized (level: {:?})", level);
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let runtime = RuntimePaths::new(
        infer_config_directory(cli.config_dir.as_deref()),
        cli.temp_dir.clone().unwrap_or_else(default_temp_directory),
    );
    let config = ApplicationConfig::load(runtime).context("Failed to load configuration")?;

    setup_logging(
        cli.log_level.as_deref(),
        config.settings.log_level.as_deref(),
        cli.log_file.as_deref(),
    )
    .context("Failed to setup logging")?;

    info!(
        config_directory = %config.runtime.config_directory.display(),
        hot_reload = config.settings.hot_reload,
        "autodot loaded config"
    );

    debug!(command = ?cli.command, "main: dispatching command");
    match cli.command.unwrap_or(Command::Run) {
        Command::Run => cmd_run(config).await,
        Command::Check => cmd_check(config).await,
        Command::Modules => cmd_modules(config).await,
        Command::Render { reference } => cmd_render(config, &reference).await,
    }
}

async fn build_manager(config: ApplicationConfig) -> Result<(ModuleManager, mpsc::Receiver<PathBuf>)> {
    let (watch_tx, watch_rx) = mpsc::channel(WATCH_CHANNEL_CAPACITY);
    let manager = ModuleManager::new(config, watch_tx)
        .await
        .context("Invalid module configuration")?;
    Ok((manager, watch_rx))
}

/// Run the daemon loop until SIGINT/SIGTERM
async fn cmd_run(config: ApplicationConfig) -> Result<()> {
    debug!("cmd_run: called");
    let (mut manager, mut watch_rx) = build_manager(config).await?;
    info!(modules = manager.len(), "autodot starting");
    manager.finish_tasks().await;

    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sighup = signal(SignalKind::hangup())?;
        let mut sigint = signal(SignalKind::interrupt())?;
        let mut sigterm = signal(SignalKind::terminate())?;

        loop {
            let tick = manager.time_until_next_event().clamp(MIN_TICK, MAX_TICK);
            tokio::select! {
                _ = tokio::time::sleep(tick) => {
                    if manager.has_unfinished_tasks() {
                        manager.finish_tasks().await;
                    }
                }
                Some(path) = watch_rx.recv() => {
                    manager = handle_modified(manager, &path).await;
                }
                _ = sighup.recv() => {
                    info!("SIGHUP received - reloading configuration");
                    match manager.reload().await {
                        Ok(new_manager) => manager = new_manager,
                        Err(e) => error!(error = %e, "Failed to reload configuration"),
                    }
                }
                _ = sigint.recv() => {
                    warn!("SIGINT received");
                    break;
                }
                _ = sigterm.recv() => {
                    warn!("SIGTERM received");
                    break;
                }
            }
        }
    }

    #[cfg(not(unix))]
    {
        loop {
            let tick = manager.time_until_next_event().clamp(MIN_TICK, MAX_TICK);
            tokio::select! {
                _ = tokio::time::sleep(tick) => {
                    if manager.has_unfinished_tasks() {
                        manager.finish_tasks().await;
                    }
                }
                Some(path) = watch_rx.recv() => {
                    manager = handle_modified(manager, &path).await;
                }
                _ = tokio::signal::ctrl_c() => {
                    warn!("Ctrl-C received");
                    break;
                }
            }
        }
    }

    info!("autodot shutting down");
    manager.exit().await;
    Ok(())
}

async fn handle_modified(mut manager: ModuleManager, path: &Path) -> ModuleManager {
    match manager.modified(path).await {
        ModifiedOutcome::Reloaded(new_manager) => *new_manager,
        ModifiedOutcome::ReloadFailed(_) | ModifiedOutcome::Handled | ModifiedOutcome::Ignored => manager,
    }
}

/// Validate the configuration and list enabled modules
async fn cmd_check(config: ApplicationConfig) -> Result<()> {
    debug!("cmd_check: called");
    let config_file = config.runtime.config_file();
    let (manager, _watch_rx) = build_manager(config).await?;

    println!("{} {}", "✓".green(), config_file.display());
    for module in manager.modules() {
        println!(
            "  {} module/{} ({}, {} templates)",
            "✓".green(),
            module.name().bold(),
            module.event_listener_kind(),
            module.templates().len()
        );
    }
    println!(
        "{} modules, {} context sections",
        manager.len(),
        manager.context().len()
    );
    Ok(())
}

/// Show every enabled module with its event and templates
async fn cmd_modules(config: ApplicationConfig) -> Result<()> {
    debug!("cmd_modules: called");
    let (manager, _watch_rx) = build_manager(config).await?;

    if manager.is_empty() {
        println!("{}", "No enabled modules".yellow());
        return Ok(());
    }

    for module in manager.modules() {
        println!(
            "{} [{}] event={}",
            module.name().bold(),
            module.event_listener_kind().cyan(),
            module.event()
        );
        for (name, template) in module.templates() {
            println!(
                "  {} {} -> {}",
                name.green(),
                template.source.display(),
                template.target.display()
            );
        }
    }
    Ok(())
}

/// Render one template with the startup context
async fn cmd_render(config: ApplicationConfig, reference: &str) -> Result<()> {
    debug!(%reference, "cmd_render: called");
    let (mut manager, _watch_rx) = build_manager(config).await?;
    manager.import_context_sections(Trigger::Startup);

    let output = manager
        .render_template(reference)
        .with_context(|| format!("Failed to render {}", reference))?;
    print!("{}", output);
    Ok(())
}
