use crate::clock;
use crate::processor::FilterSettings;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "pingwatch.toml";

/// Top-level configuration loaded from pingwatch.toml.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct PingwatchConfig {
    pub filter: FilterConfig,
    pub heartbeat: HeartbeatConfig,
    pub watchdog: WatchdogConfig,
    pub raw_log: RawLogConfig,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct FilterConfig {
    pub max_time_ms: f64,
    pub timestamp_format: String,
    pub allowed_seq_diff: u32,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct HeartbeatConfig {
    pub interval_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct WatchdogConfig {
    pub timeout_secs: f64,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
#[derive(Default)]
pub struct RawLogConfig {
    pub path: Option<PathBuf>,
}

// --- Default implementations ---

impl Default for FilterConfig {
    fn default() -> Self {
        Self {
            max_time_ms: 500.0,
            timestamp_format: "%Y-%m-%d %H:%M:%S".to_string(),
            allowed_seq_diff: 1,
        }
    }
}

impl Default for WatchdogConfig {
    fn default() -> Self {
        Self { timeout_secs: 60.0 }
    }
}

/// Errors loading or validating configuration.
#[derive(Debug)]
pub enum ConfigError {
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },
    Invalid {
        field: &'static str,
        reason: String,
    },
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ConfigError::Read { path, source } => {
                write!(f, "failed to read config {}: {}", path.display(), source)
            }
            ConfigError::Parse { path, source } => {
                write!(f, "failed to parse config {}: {}", path.display(), source)
            }
            ConfigError::Invalid { field, reason } => {
                write!(f, "invalid setting {field}: {reason}")
            }
        }
    }
}

impl std::error::Error for ConfigError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            ConfigError::Read { source, .. } => Some(source),
            ConfigError::Parse { source, .. } => Some(source),
            ConfigError::Invalid { .. } => None,
        }
    }
}

impl PingwatchConfig {
    /// Load configuration.
    ///
    /// An explicit path must exist. Without one, `pingwatch.toml` in the
    /// working directory is used if present, otherwise defaults apply.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::from_file(path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Parse a TOML config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            source: e,
        })?;
        let config = toml::from_str(&contents).map_err(|e| ConfigError::Parse {
            path: path.to_path_buf(),
            source: e,
        })?;
        tracing::debug!(path = %path.display(), "loaded config file");
        Ok(config)
    }

    /// Reject settings the processor or watchdog cannot work with.
    pub fn validate(&self) -> Result<(), ConfigError> {
        non_negative("filter.max_time_ms", self.filter.max_time_ms)?;
        non_negative("heartbeat.interval_secs", self.heartbeat.interval_secs)?;
        non_negative("watchdog.timeout_secs", self.watchdog.timeout_secs)?;

        if self.watchdog.timeout_secs == 0.0 {
            return Err(invalid("watchdog.timeout_secs", "must be greater than 0"));
        }
        if Duration::try_from_secs_f64(self.watchdog.timeout_secs).is_err() {
            return Err(invalid("watchdog.timeout_secs", "out of range"));
        }
        if self.filter.allowed_seq_diff == 0 {
            return Err(invalid(
                "filter.allowed_seq_diff",
                "must be at least 1 (1 reports every missed packet)",
            ));
        }
        if !clock::is_valid_format(&self.filter.timestamp_format) {
            return Err(invalid(
                "filter.timestamp_format",
                &format!(
                    "'{}' is not a valid strftime format",
                    self.filter.timestamp_format
                ),
            ));
        }
        Ok(())
    }

    /// Processor thresholds derived from this config.
    pub fn filter_settings(&self) -> FilterSettings {
        FilterSettings {
            max_round_trip_ms: self.filter.max_time_ms,
            timestamp_format: self.filter.timestamp_format.clone(),
            heartbeat_interval: self.heartbeat.interval_secs,
            allowed_sequence_gap: self.filter.allowed_seq_diff,
        }
    }

    /// Watchdog timeout; call after `validate()`.
    pub fn watchdog_timeout(&self) -> Duration {
        Duration::try_from_secs_f64(self.watchdog.timeout_secs)
            .unwrap_or(Duration::from_secs(60))
    }
}

fn non_negative(field: &'static str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(invalid(field, "must be a finite number >= 0"))
    }
}

fn invalid(field: &'static str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field,
        reason: reason.to_string(),
    }
}
