//! Configuration loading for the engine, the checker, and the `sam` binary.
//!
//! The file lives at `~/.sam/config.toml` unless `SAM_CONFIG` points elsewhere.
//! Every section is optional; a missing file is not an error.
//!
//! ```toml
//! [engine]
//! instance_name = "dieharder"
//! asynchronous_actions = false
//! synchronize = { poll_interval_ms = 5 }
//!
//! [engine.time_travel]
//! max_snapshots = 64
//!
//! [checker]
//! depth_max = 6
//! no_duplicate_action = true
//! do_not_start_with = ["empty", "transfer"]
//!
//! [log]
//! filter = "sam_engine=debug"
//! ```

use std::path::{Path, PathBuf};
use std::time::Duration;
use std::{env, fs, io};

use serde::Deserialize;
use thiserror::Error;

const CONFIG_ENV_VAR: &str = "SAM_CONFIG";
const DEFAULT_INSTANCE_NAME: &str = "global";
const DEFAULT_POLL_INTERVAL_MS: u64 = 5;
const DEFAULT_DEPTH_MAX: usize = 5;

// Default value functions for serde (bool::default() is false, so only true needs a fn)
const fn default_true() -> bool {
    true
}

fn default_instance_name() -> String {
    DEFAULT_INSTANCE_NAME.to_string()
}

const fn default_poll_interval_ms() -> u64 {
    DEFAULT_POLL_INTERVAL_MS
}

const fn default_depth_max() -> usize {
    DEFAULT_DEPTH_MAX
}

#[derive(Debug, Default, Deserialize)]
pub struct SamConfig {
    pub engine: Option<EngineConfig>,
    pub checker: Option<CheckerConfig>,
    pub log: Option<LogConfig>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config at {}: {source}", path.display())]
    Read { path: PathBuf, source: io::Error },
    #[error("failed to parse config at {}: {source}", path.display())]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl ConfigError {
    #[must_use]
    pub fn path(&self) -> &Path {
        match self {
            ConfigError::Read { path, .. } | ConfigError::Parse { path, .. } => path,
        }
    }
}

/// Settings supplied once when an engine is constructed.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct EngineConfig {
    /// Allow intents to wrap asynchronous actions. Default: true.
    #[serde(default = "default_true")]
    pub asynchronous_actions: bool,
    /// Name attached to every log line emitted by the instance.
    #[serde(default = "default_instance_name")]
    pub instance_name: String,
    /// Serialize admission of proposals through a single worker.
    #[serde(default)]
    pub synchronize: Synchronize,
    /// Keep a snapshot history. Absent means no history until one is installed.
    pub time_travel: Option<TimeTravelConfig>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            asynchronous_actions: true,
            instance_name: default_instance_name(),
            synchronize: Synchronize::Off,
            time_travel: None,
        }
    }
}

impl EngineConfig {
    #[must_use]
    pub fn named(instance_name: impl Into<String>) -> Self {
        Self {
            instance_name: instance_name.into(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn synchronous(mut self) -> Self {
        self.asynchronous_actions = false;
        self
    }

    #[must_use]
    pub fn synchronized(mut self, poll_interval: Duration) -> Self {
        self.synchronize = Synchronize::On { poll_interval };
        self
    }

    #[must_use]
    pub fn with_max_snapshots(mut self, max_snapshots: usize) -> Self {
        self.time_travel = Some(TimeTravelConfig {
            max_snapshots: Some(max_snapshots),
        });
        self
    }

    #[must_use]
    pub fn max_snapshots(&self) -> Option<usize> {
        self.time_travel.as_ref().and_then(|t| t.max_snapshots)
    }
}

/// Serialized admission setting.
///
/// Accepts `synchronize = true`, `synchronize = false`, or
/// `synchronize = { poll_interval_ms = 10 }`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(from = "SynchronizeRepr")]
pub enum Synchronize {
    #[default]
    Off,
    On {
        poll_interval: Duration,
    },
}

impl Synchronize {
    #[must_use]
    pub const fn is_on(self) -> bool {
        matches!(self, Self::On { .. })
    }

    #[must_use]
    pub const fn poll_interval(self) -> Option<Duration> {
        match self {
            Self::Off => None,
            Self::On { poll_interval } => Some(poll_interval),
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SynchronizeRepr {
    Flag(bool),
    Options {
        #[serde(default = "default_poll_interval_ms")]
        poll_interval_ms: u64,
    },
}

impl From<SynchronizeRepr> for Synchronize {
    fn from(repr: SynchronizeRepr) -> Self {
        match repr {
            SynchronizeRepr::Flag(false) => Self::Off,
            SynchronizeRepr::Flag(true) => Self::On {
                poll_interval: Duration::from_millis(DEFAULT_POLL_INTERVAL_MS),
            },
            SynchronizeRepr::Options { poll_interval_ms } => Self::On {
                poll_interval: Duration::from_millis(poll_interval_ms),
            },
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
pub struct TimeTravelConfig {
    /// Oldest snapshots are evicted beyond this count.
    pub max_snapshots: Option<usize>,
}

/// Search bounds for the trace checker.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CheckerConfig {
    #[serde(default = "default_depth_max")]
    pub depth_max: usize,
    #[serde(default)]
    pub no_duplicate_action: bool,
    #[serde(default)]
    pub do_not_start_with: Vec<String>,
}

impl Default for CheckerConfig {
    fn default() -> Self {
        Self {
            depth_max: DEFAULT_DEPTH_MAX,
            no_duplicate_action: false,
            do_not_start_with: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct LogConfig {
    /// `tracing_subscriber::EnvFilter` directive, used when `RUST_LOG` is unset.
    pub filter: Option<String>,
}

impl SamConfig {
    /// Load from the default location. `Ok(None)` when there is no file.
    pub fn load() -> Result<Option<Self>, ConfigError> {
        match config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(None),
        }
    }

    pub fn load_from(path: &Path) -> Result<Option<Self>, ConfigError> {
        let content = match fs::read_to_string(path) {
            Ok(content) => content,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(err) => {
                tracing::warn!("Failed to read config at {:?}: {}", path, err);
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source: err,
                });
            }
        };

        match toml::from_str(&content) {
            Ok(config) => Ok(Some(config)),
            Err(err) => {
                tracing::warn!("Failed to parse config at {:?}: {}", path, err);
                Err(ConfigError::Parse {
                    path: path.to_path_buf(),
                    source: err,
                })
            }
        }
    }

    #[must_use]
    pub fn path() -> Option<PathBuf> {
        config_path()
    }

    #[must_use]
    pub fn engine(&self) -> EngineConfig {
        self.engine.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn checker(&self) -> CheckerConfig {
        self.checker.clone().unwrap_or_default()
    }

    #[must_use]
    pub fn log_filter(&self) -> Option<&str> {
        self.log.as_ref().and_then(|log| log.filter.as_deref())
    }
}

#[must_use]
pub fn config_path() -> Option<PathBuf> {
    if let Some(path) = env::var_os(CONFIG_ENV_VAR)
        && !path.is_empty()
    {
        return Some(PathBuf::from(path));
    }
    dirs::home_dir().map(|home| home.join(".sam").join("config.toml"))
}
