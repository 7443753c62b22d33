//! File state listener

use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::{EventListener, EventListenerError};
use crate::config::RuntimePaths;

/// Event reported when the watched file cannot be read
pub const MISSING_EVENT: &str = "missing";

fn default_poll_ms() -> u64 {
    1000
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileListenerConfig {
    /// File whose content is the event; relative to the config directory
    pub path: String,

    /// How often to re-read the file
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

/// Event is the trimmed content of a file
#[derive(Debug, Clone)]
pub struct FileListener {
    path: PathBuf,
    poll_interval: Duration,
}

impl FileListener {
    pub fn new(config: &FileListenerConfig, paths: &RuntimePaths) -> Result<Self, EventListenerError> {
        if config.path.trim().is_empty() {
            return Err(EventListenerError::EmptyPath);
        }
        Ok(Self {
            path: paths.expand_path(&config.path),
            poll_interval: Duration::from_millis(config.poll_ms.max(10)),
        })
    }
}

impl EventListener for FileListener {
    fn kind(&self) -> &'static str {
        "file"
    }

    fn event(&self) -> String {
        match fs::read_to_string(&self.path) {
            Ok(content) => content.trim().to_string(),
            Err(_) => MISSING_EVENT.to_string(),
        }
    }

    fn time_until_next_event(&self) -> Duration {
        self.poll_interval
    }
}
