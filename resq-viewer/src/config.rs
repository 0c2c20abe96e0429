//! Viewer configuration.

use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;

use resq_core::StreamConfig;
use resq_core::stream::{DEFAULT_ENDPOINT, DEFAULT_RECONNECT_DELAY};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A config file that exists but cannot be used.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config {path}: {source}")]
    Read { path: PathBuf, source: io::Error },

    #[error("invalid config {path}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("cannot write config {path}: {source}")]
    Write { path: PathBuf, source: io::Error },
}

/// Top-level configuration for the viewer.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ViewerConfig {
    /// Stream connection settings.
    pub stream: StreamSection,
    /// Status feed settings.
    pub monitor: MonitorConfig,
    /// Logging.
    pub logging: LoggingConfig,
}

/// Stream connection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StreamSection {
    /// Websocket address of the perception process. A bare
    /// `host:port` is accepted.
    pub endpoint: String,
    /// Delay before each reconnect attempt, in milliseconds.
    pub reconnect_delay_ms: u64,
}

/// Status feed settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    /// Seconds between summary lines. 0 disables them.
    pub summary_interval_secs: u64,
}

/// Logging.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level, used when `RUST_LOG` is unset.
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for StreamSection {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.into(),
            reconnect_delay_ms: DEFAULT_RECONNECT_DELAY.as_millis() as u64,
        }
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            summary_interval_secs: 5,
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl ViewerConfig {
    /// Load from a TOML file.
    ///
    /// Returns `Ok(None)` when there is no file at `path`. A file that
    /// exists but does not parse is an error, never silently replaced by
    /// defaults.
    pub fn load(path: &Path) -> Result<Option<Self>, ConfigError> {
        let contents = match std::fs::read_to_string(path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(source) => {
                return Err(ConfigError::Read {
                    path: path.to_path_buf(),
                    source,
                });
            }
        };
        toml::from_str(&contents)
            .map(Some)
            .map_err(|source| ConfigError::Parse {
                path: path.to_path_buf(),
                source,
            })
    }

    /// Write default config to a file.
    pub fn write_default(path: &Path) -> Result<(), ConfigError> {
        let text = toml::to_string_pretty(&Self::default()).map_err(|e| ConfigError::Write {
            path: path.to_path_buf(),
            source: io::Error::other(e),
        })?;
        std::fs::write(path, text).map_err(|source| ConfigError::Write {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Client settings for `resq_core::StreamClient`.
    pub fn stream_config(&self) -> StreamConfig {
        StreamConfig::new(&self.stream.endpoint)
            .with_reconnect_delay_ms(self.stream.reconnect_delay_ms)
    }

    /// Interval between summary lines, if enabled.
    pub fn summary_interval(&self) -> Option<Duration> {
        match self.monitor.summary_interval_secs {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
