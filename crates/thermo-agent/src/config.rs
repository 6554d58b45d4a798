//! Agent configuration.
//!
//! Loaded from `agent.toml` in the thermo config directory. A missing file
//! is not an error: defaults are written back to disk and used, so a fresh
//! machine only needs its `location` edited.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use thermo_core::Location;
use thermo_protocol::DEFAULT_NAMESPACE_URI;

use crate::session::SessionConfig;

/// Default registry endpoint.
pub const DEFAULT_SERVER_URL: &str = "opc.tcp://localhost:4840/freeopcua/server/";

/// File name of the agent config inside the config directory.
pub const CONFIG_FILE_NAME: &str = "agent.toml";

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

/// Agent settings.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AgentConfig {
    pub server_url: String,
    pub namespace_uri: String,
    /// Bound on a single connect attempt
    pub connection_timeout_s: u64,
    /// Wait between failed connect attempts
    pub reconnect_interval_s: u64,
    pub max_reconnect_attempts: u32,
    /// Period of the submission loop
    pub update_interval_s: u64,
    /// Readings closer than this to the last sent value are skipped; 0 disables
    pub min_temperature_change: f64,
    pub location: Location,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            server_url: DEFAULT_SERVER_URL.to_string(),
            namespace_uri: DEFAULT_NAMESPACE_URI.to_string(),
            connection_timeout_s: 10,
            reconnect_interval_s: 5,
            max_reconnect_attempts: 5,
            update_interval_s: 10,
            min_temperature_change: 0.5,
            location: Location::new(1, 101, 1),
        }
    }
}

impl AgentConfig {
    /// Loads the config at `path`, writing defaults there if it is missing.
    pub fn load_or_init(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            let config = Self::default();
            config.save(path)?;
            info!(path = %path.display(), "Wrote default agent config");
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
        if self.max_reconnect_attempts == 0 {
            return Err(ConfigError::Invalid(
                "max_reconnect_attempts must be at least 1".to_string(),
            ));
        }
        if self.connection_timeout_s == 0 || self.update_interval_s == 0 {
            return Err(ConfigError::Invalid(
                "connection_timeout_s and update_interval_s must be positive".to_string(),
            ));
        }
        if !(self.min_temperature_change.is_finite() && self.min_temperature_change >= 0.0) {
            return Err(ConfigError::Invalid(format!(
                "min_temperature_change must be non-negative, got {}",
                self.min_temperature_change
            )));
        }
        Ok(())
    }

    pub fn update_interval(&self) -> Duration {
        Duration::from_secs(self.update_interval_s)
    }

    /// Session manager settings derived from this config.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            server_url: self.server_url.clone(),
            namespace_uri: self.namespace_uri.clone(),
            client_id: Some(self.location.label()),
            connection_timeout: Duration::from_secs(self.connection_timeout_s),
            reconnect_interval: Duration::from_secs(self.reconnect_interval_s),
            max_reconnect_attempts: self.max_reconnect_attempts,
        }
    }
}

/// Default location of the agent config.
pub fn default_config_path() -> PathBuf {
    dirs::config_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("thermo")
        .join(CONFIG_FILE_NAME)
}
