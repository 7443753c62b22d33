//! Watcher configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Configuration for the DirectoryWatcher
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WatcherConfig {
    /// Polling interval in milliseconds, used where no native file
    /// notification backend is available
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

fn default_poll_interval_ms() -> u64 {
    500
}

impl Default for WatcherConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: default_poll_interval_ms(),
        }
    }
}

impl WatcherConfig {
    pub fn from_interval(interval: Duration) -> Self {
        Self {
            poll_interval_ms: u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        }
    }

    /// Get poll interval as Duration
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms.max(10))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_interval() {
        assert_eq!(WatcherConfig::default().poll_interval(), Duration::from_millis(500));
    }

    #[test]
    fn test_interval_has_floor() {
        let config = WatcherConfig { poll_interval_ms: 0 };
        assert_eq!(config.poll_interval(), Duration::from_millis(10));
    }

    #[test]
    fn test_from_interval() {
        let config = WatcherConfig::from_interval(Duration::from_millis(250));
        assert_eq!(config.poll_interval_ms, 250);
    }
}
