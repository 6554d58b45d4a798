//! Server configuration.
//!
//! Loaded from `server.toml` in the thermo config directory. A missing file
//! is not an error: defaults are written back to disk and used.

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use thermo_protocol::DEFAULT_NAMESPACE_URI;

/// Default listen address for agent sessions.
pub const DEFAULT_LISTEN_ADDR: &str = "0.0.0.0:4840";

const DEFAULT_POLL_INTERVAL_S: f64 = 3.0;

/// Longest accepted change-monitor poll interval (one day).
pub const MAX_POLL_INTERVAL_S: f64 = 86_400.0;

/// File name of the server config inside the config directory.
pub const CONFIG_FILE_NAME: &str = "server.toml";

/// Errors that can occur while loading or saving configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to write {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Inclusive range of one coordinate axis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoordinateRange {
    pub first: u32,
    pub last: u32,
}

impl CoordinateRange {
    pub const fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    pub fn iter(&self) -> std::ops::RangeInclusive<u32> {
        self.first..=self.last
    }

    pub fn len(&self) -> usize {
        self.iter().count()
    }

    pub fn is_empty(&self) -> bool {
        self.first > self.last
    }
}

impl fmt::Display for CoordinateRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.first, self.last)
    }
}

/// Startup sweep settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PrepopulateConfig {
    pub enabled: bool,
    pub buildings: CoordinateRange,
    pub rooms: CoordinateRange,
    pub pcs: CoordinateRange,
}

impl Default for PrepopulateConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            buildings: CoordinateRange::new(1, 4),
            rooms: CoordinateRange::new(100, 109),
            pcs: CoordinateRange::new(1, 5),
        }
    }
}

/// Registry server settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub namespace_uri: String,
    /// Change monitor poll period
    pub poll_interval_s: f64,
    /// Minimum absolute change reported by the monitor
    pub change_epsilon: f64,
    /// Period of the per-PC status summary; 0 disables it
    pub status_interval_s: u64,
    pub prepopulate: PrepopulateConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: DEFAULT_LISTEN_ADDR.to_string(),
            namespace_uri: DEFAULT_NAMESPACE_URI.to_string(),
            poll_interval_s: DEFAULT_POLL_INTERVAL_S,
            change_epsilon: 0.1,
            status_interval_s: 60,
            prepopulate: PrepopulateConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Loads the config at `path`, writing defaults there if it is missing.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            info!(path = %path.display(), "Wrote default server config");
            return Ok(config);
        }

        let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Self = toml::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Writes the config as TOML, creating parent directories.
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let write_err = |source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(write_err)?;
        }
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).map_err(write_err)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if !(self.poll_interval_s > 0.0 && self.poll_interval_s <= MAX_POLL_INTERVAL_S) {
            return Err(ConfigError::Invalid(format!(
                "poll_interval_s must be in (0, {MAX_POLL_INTERVAL_S}], got {}",
                self.poll_interval_s
            )));
        }
        if !(self.change_epsilon.is_finite() && self.change_epsilon >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "change_epsilon must be non-negative, got {}",
                self.change_epsilon
            )));
        }
        let p = &self.prepopulate;
        for (name, range) in [("buildings", p.buildings), ("rooms", p.rooms), ("pcs", p.pcs)] {
            if range.is_empty() {
                return Err(ConfigError::Invalid(format!(
                    "prepopulate.{name} is empty: {range}"
                )));
            }
        }
        Ok(())
    }

    /// Falls back to the default for values `validate` would reject.
    pub fn poll_interval(&self) -> Duration {
        Duration::try_from_secs_f64(self.poll_interval_s)
            .ok()
            .filter(|d| !d.is_zero() && d.as_secs_f64() <= MAX_POLL_INTERVAL_S)
            .unwrap_or_else(|| Duration::from_secs_f64(DEFAULT_POLL_INTERVAL_S))
    }

    pub fn status_interval(&self) -> Option<Duration> {
        (self.status_interval_s > 0).then(|| Duration::from_secs(self.status_interval_s))
    }
}

/// Default location of the server config.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("thermo")
        .join(CONFIG_FILE_NAME)
}
