//! Application configuration types and loading
//!
//! The application config is a single YAML file, `autodot.yml`, inside the
//! config directory. Its top level is an ordered mapping of sections:
//!
//! ```yaml
//! settings/autodot:
//!   hot_reload: true
//!   run_timeout: 2
//!
//! context/fonts:
//!   primary: FiraCode
//!
//! module/bar:
//!   on_startup:
//!     run: ["polybar main"]
//! ```
//!
//! Section order is preserved; modules are constructed and merged in file order.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_yaml::{Mapping, Value};
use thiserror::Error;
use tracing::{debug, info};

/// File name of the application config inside the config directory
pub const CONFIG_FILE_NAME: &str = "autodot.yml";

/// Section holding engine settings
pub const SETTINGS_SECTION: &str = "settings/autodot";

/// Prefix of sections seeding the template context
pub const CONTEXT_PREFIX: &str = "context/";

/// Environment variable overriding the config directory
pub const CONFIG_HOME_ENV: &str = "AUTODOT_CONFIG_HOME";

/// Errors raised while loading the application config
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config file {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Config file {path} must contain a mapping of sections")]
    NotAMapping { path: PathBuf },

    #[error("Invalid [settings/autodot] section: {0}")]
    Settings(#[source] serde_yaml::Error),

    #[error("Invalid [settings/autodot] {field}: {value} is not a usable number of seconds")]
    Timeout { field: &'static str, value: f64 },

    #[error("Failed to create temp directory {path}")]
    TempDirectory {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Engine settings from the `settings/autodot` section
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Rebuild all modules when `autodot.yml` is modified
    pub hot_reload: bool,

    /// Seconds each `requires` command may run before the module is disabled;
    /// 0 waits without limit
    pub requires_timeout: f64,

    /// Seconds to wait for each action command; 0 launches without waiting
    pub run_timeout: f64,

    /// Polling interval of the config directory watcher on platforms
    /// without native file notifications
    pub watch_interval_ms: u64,

    /// Log level used when none is given on the command line
    pub log_level: Option<String>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            hot_reload: false,
            requires_timeout: 1.0,
            run_timeout: 0.0,
            watch_interval_ms: 500,
            log_level: None,
        }
    }
}

impl Settings {
    /// Reject timeouts that are negative, not finite or too large for a `Duration`
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [("requires_timeout", self.requires_timeout), ("run_timeout", self.run_timeout)] {
            if value < 0.0 || Duration::try_from_secs_f64(value).is_err() {
                return Err(ConfigError::Timeout { field, value });
            }
        }
        Ok(())
    }

    /// Zero means the requirement is awaited without limit
    pub fn requires_timeout(&self) -> Duration {
        match seconds(self.requires_timeout) {
            Duration::ZERO => Duration::MAX,
            timeout => timeout,
        }
    }

    pub fn run_timeout(&self) -> Duration {
        seconds(self.run_timeout)
    }

    pub fn watch_interval(&self) -> Duration {
        Duration::from_millis(self.watch_interval_ms.max(10))
    }
}

/// Out of range values saturate; `Settings::validate` rejects them at load time
fn seconds(value: f64) -> Duration {
    if value.is_nan() || value <= 0.0 {
        return Duration::ZERO;
    }
    Duration::try_from_secs_f64(value).unwrap_or(Duration::MAX)
}

/// Directories the engine works in
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RuntimePaths {
    /// Directory holding `autodot.yml`; relative paths resolve against it
    pub config_directory: PathBuf,

    /// Directory for engine-owned compilation targets
    pub temp_directory: PathBuf,
}

impl RuntimePaths {
    pub fn new(config_directory: impl Into<PathBuf>, temp_directory: impl Into<PathBuf>) -> Self {
        Self {
            config_directory: config_directory.into(),
            temp_directory: temp_directory.into(),
        }
    }

    /// Path of the application config file
    pub fn config_file(&self) -> PathBuf {
        self.config_directory.join(CONFIG_FILE_NAME)
    }

    /// Resolve a configured path: `~` expands to the home directory, and
    /// relative paths are relative to the config directory.
    pub fn expand_path(&self, path: impl AsRef<Path>) -> PathBuf {
        let path = path.as_ref();
        let path = expand_home(path);
        if path.is_absolute() {
            path
        } else {
            self.config_directory.join(path)
        }
    }
}

fn expand_home(path: &Path) -> PathBuf {
    let Ok(rest) = path.strip_prefix("~") else {
        return path.to_path_buf();
    };
    match dirs::home_dir() {
        Some(home) => home.join(rest),
        None => path.to_path_buf(),
    }
}

/// Locate the config directory
///
/// Priority: explicit path > `$AUTODOT_CONFIG_HOME` > `<xdg config dir>/autodot`.
pub fn infer_config_directory(explicit: Option<&Path>) -> PathBuf {
    if let Some(path) = explicit {
        debug!(?path, "infer_config_directory: explicit directory");
        return path.to_path_buf();
    }

    if let Ok(path) = std::env::var(CONFIG_HOME_ENV)
        && !path.is_empty()
    {
        debug!(%path, "infer_config_directory: from environment");
        return expand_home(Path::new(&path));
    }

    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("autodot")
}

/// Default location of engine-owned temp files
pub fn default_temp_directory() -> PathBuf {
    std::env::temp_dir().join("autodot")
}

/// The parsed application config
#[derive(Debug, Clone)]
pub struct ApplicationConfig {
    pub settings: Settings,
    pub runtime: RuntimePaths,
    sections: Mapping,
}

impl ApplicationConfig {
    /// Load `autodot.yml` from the runtime config directory
    ///
    /// A missing config file yields an empty config with default settings.
    pub fn load(runtime: RuntimePaths) -> Result<Self, ConfigError> {
        let path = runtime.config_file();
        debug!(?path, "ApplicationConfig::load: called");

        fs::create_dir_all(&runtime.temp_directory).map_err(|source| ConfigError::TempDirectory {
            path: runtime.temp_directory.clone(),
            source,
        })?;

        if !path.exists() {
            info!(?path, "No config file found, using defaults");
            return Ok(Self::empty(runtime));
        }

        let content = fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config = Self::from_yaml_str(&content, &path, runtime)?;

        info!(path = %path.display(), sections = config.sections.len(), "Loaded config");
        Ok(config)
    }

    /// Parse config content; `origin` is only used in error messages
    pub fn from_yaml_str(content: &str, origin: &Path, runtime: RuntimePaths) -> Result<Self, ConfigError> {
        debug!(?origin, content_len = content.len(), "ApplicationConfig::from_yaml_str: called");
        let value: Value = serde_yaml::from_str(content).map_err(|source| ConfigError::Parse {
            path: origin.to_path_buf(),
            source,
        })?;

        let sections = match value {
            Value::Null => Mapping::new(),
            Value::Mapping(mapping) => mapping,
            _ => {
                return Err(ConfigError::NotAMapping {
                    path: origin.to_path_buf(),
                });
            }
        };

        let settings = match sections.get(SETTINGS_SECTION) {
            Some(Value::Null) | None => Settings::default(),
            Some(value) => serde_yaml::from_value(value.clone()).map_err(ConfigError::Settings)?,
        };
        settings.validate()?;

        Ok(Self {
            settings,
            runtime,
            sections,
        })
    }

    /// A config without sections
    pub fn empty(runtime: RuntimePaths) -> Self {
        Self {
            settings: Settings::default(),
            runtime,
            sections: Mapping::new(),
        }
    }

    /// All sections in file order
    pub fn sections(&self) -> impl Iterator<Item = (&Value, &Value)> {
        self.sections.iter()
    }

    /// `context/<name>` sections in file order, with the prefix stripped
    pub fn context_sections(&self) -> impl Iterator<Item = (&str, &Mapping)> {
        self.sections.iter().filter_map(|(key, value)| {
            let name = key.as_str()?.strip_prefix(CONTEXT_PREFIX)?;
            Some((name, value.as_mapping()?))
        })
    }

    pub fn section(&self, name: &str) -> Option<&Value> {
        self.sections.get(name)
    }
}
