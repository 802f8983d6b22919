use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

/// Default node API address.
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:5001";
/// Default deadline for `version` and `block/rm` calls.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);
/// Default cap on unpin-and-retry rounds for a single block.
pub const DEFAULT_MAX_UNPIN_ROUNDS: u32 = 1000;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {msg}")]
    Parse { path: String, msg: String },
    #[error("unsupported config file extension: {0}")]
    UnsupportedExtension(String),
    #[error("invalid endpoint {0:?}: expected an http:// or https:// URL")]
    InvalidEndpoint(String),
}

/// Settings for one sweep. Built once at startup and shared by reference.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CleanupConfig {
    pub endpoint: String,
    /// Zero disables the deadline.
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub verbose: bool,
    /// Zero means retry until the node stops reporting a pin.
    pub max_unpin_rounds: u32,
}

impl Default for CleanupConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout: DEFAULT_TIMEOUT,
            verbose: false,
            max_unpin_rounds: DEFAULT_MAX_UNPIN_ROUNDS,
        }
    }
}

impl CleanupConfig {
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let display = path.display().to_string();
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: display.clone(),
            source,
        })?;
        let ext = path
            .extension()
            .and_then(|e| e.to_str())
            .unwrap_or_default();

        match ext.to_lowercase().as_str() {
            "toml" => toml::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: display,
                msg: e.to_string(),
            }),
            "json" => serde_json::from_str(&contents).map_err(|e| ConfigError::Parse {
                path: display,
                msg: e.to_string(),
            }),
            _ => Err(ConfigError::UnsupportedExtension(ext.to_string())),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let endpoint = self.endpoint.trim();
        let rest = endpoint
            .strip_prefix("http://")
            .or_else(|| endpoint.strip_prefix("https://"));
        match rest {
            Some(host) if !host.is_empty() => Ok(()),
            _ => Err(ConfigError::InvalidEndpoint(self.endpoint.clone())),
        }
    }

    /// Deadline for calls that honor the configured timeout.
    pub fn call_timeout(&self) -> Option<Duration> {
        if self.timeout.is_zero() {
            None
        } else {
            Some(self.timeout)
        }
    }

    pub fn unpin_limit(&self) -> Option<u32> {
        match self.max_unpin_rounds {
            0 => None,
            n => Some(n),
        }
    }
}
