//! Watcher module for config directory monitoring
//!
//! The DirectoryWatcher registers a `notify` watch on the config directory and
//! sends the path of every created or modified file to the owner of the
//! module manager, which routes it through `ModuleManager::modified`.

mod config;
mod directory_watcher;

pub use config::WatcherConfig;
pub use directory_watcher::{DirectoryWatcher, changed_paths};
