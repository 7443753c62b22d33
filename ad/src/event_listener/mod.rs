//! Event listeners
//!
//! Every module has exactly one event listener. A listener reports the current
//! discrete event (an opaque string) and how long until it may change. The
//! module manager re-runs `on_event` actions whenever the combined events of
//! all modules differ from the last observed snapshot.
//!
//! Listener types:
//! - `static`: never changes, event `static`
//! - `weekday`: lowercase weekday name, changes at local midnight
//! - `periodic`: number of whole periods elapsed since construction
//! - `file`: trimmed content of a file, or `missing`

mod file;
mod periodic;
mod weekday;

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::config::RuntimePaths;

pub use file::{FileListener, FileListenerConfig};
pub use periodic::{PeriodicConfig, PeriodicListener};
pub use weekday::WeekdayListener;

/// Time until a static listener changes (it never does)
pub const STATIC_INTERVAL: Duration = Duration::from_secs(u32::MAX as u64);

/// Source of a module's current event
pub trait EventListener: Send + Sync + std::fmt::Debug {
    /// Listener type name as written in config
    fn kind(&self) -> &'static str;

    /// The current event
    fn event(&self) -> String;

    /// Time until the event may next change
    fn time_until_next_event(&self) -> Duration;
}

/// `event_listener` option of a module
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum EventListenerConfig {
    #[default]
    Static,
    Weekday,
    Periodic(PeriodicConfig),
    File(FileListenerConfig),
}

/// Errors raised while building an event listener
#[derive(Debug, Error, PartialEq, Eq)]
pub enum EventListenerError {
    #[error("periodic listener needs a non-zero period")]
    ZeroPeriod,

    #[error("file listener needs a non-empty path")]
    EmptyPath,
}

/// Never-changing listener
#[derive(Debug, Clone, Default)]
pub struct StaticListener;

impl EventListener for StaticListener {
    fn kind(&self) -> &'static str {
        "static"
    }

    fn event(&self) -> String {
        "static".to_string()
    }

    fn time_until_next_event(&self) -> Duration {
        STATIC_INTERVAL
    }
}

/// Build the listener described by `config`
pub fn event_listener_factory(
    config: &EventListenerConfig,
    paths: &RuntimePaths,
) -> Result<Box<dyn EventListener>, EventListenerError> {
    debug!(?config, "event_listener_factory: called");
    let listener: Box<dyn EventListener> = match config {
        EventListenerConfig::Static => Box::new(StaticListener),
        EventListenerConfig::Weekday => Box::new(WeekdayListener),
        EventListenerConfig::Periodic(periodic) => Box::new(PeriodicListener::new(periodic)?),
        EventListenerConfig::File(file) => Box::new(FileListener::new(file, paths)?),
    };
    Ok(listener)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn paths() -> RuntimePaths {
        RuntimePaths::new("/cfg", "/tmp")
    }

    #[test]
    fn test_static_listener() {
        let listener = StaticListener;
        assert_eq!(listener.event(), "static");
        assert_eq!(listener.time_until_next_event(), STATIC_INTERVAL);
    }

    #[test]
    fn test_default_config_is_static() {
        let listener = event_listener_factory(&EventListenerConfig::default(), &paths()).unwrap();
        assert_eq!(listener.kind(), "static");
        assert_eq!(listener.event(), "static");
    }

    #[test]
    fn test_deserialize_tagged_configs() {
        let weekday: EventListenerConfig = serde_yaml::from_str("type: weekday").unwrap();
        assert_eq!(weekday, EventListenerConfig::Weekday);

        let periodic: EventListenerConfig = serde_yaml::from_str("type: periodic\nminutes: 5").unwrap();
        assert_eq!(
            periodic,
            EventListenerConfig::Periodic(PeriodicConfig {
                minutes: 5,
                ..Default::default()
            })
        );

        let file: EventListenerConfig = serde_yaml::from_str("type: file\npath: theme").unwrap();
        assert!(matches!(file, EventListenerConfig::File(_)));
    }

    #[test]
    fn test_unknown_type_is_rejected() {
        let result: Result<EventListenerConfig, _> = serde_yaml::from_str("type: solar");
        assert!(result.is_err());
    }

    #[test]
    fn test_factory_rejects_zero_period() {
        let config = EventListenerConfig::Periodic(PeriodicConfig::default());
        let result = event_listener_factory(&config, &paths());
        assert_eq!(result.unwrap_err(), EventListenerError::ZeroPeriod);
    }
}
