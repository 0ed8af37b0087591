//! YAML configuration for the daemon: store location, notifier backends
//! and targets.

use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

const DEFAULT_INTERVAL: Duration = Duration::from_secs(60);
const DEFAULT_DELIVERY_TIMEOUT: Duration = Duration::from_secs(30);
const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_secs(5);

/// Configuration problems are fatal at startup; the daemon never runs with
/// a document that fails these checks.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read configuration: {0}")]
    Io(#[from] std::io::Error),
    #[error("cannot parse configuration: {0}")]
    Parse(#[from] serde_yaml::Error),
    #[error("found unnamed backend at config index {index}")]
    UnnamedBackend { index: usize },
    #[error("found duplicate backend name '{name}'")]
    DuplicateBackend { name: String },
    #[error("no valid backend config found for backend '{name}'")]
    MissingBackendVariant { name: String },
    #[error("backend '{name}' has ambiguous backend config")]
    AmbiguousBackendVariant { name: String },
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub notifier: NotifierConfig,
}

impl Config {
    /// Load and validate a configuration document.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&raw)?;
        config.notifier.validate()?;
        Ok(config)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    /// Snapshot file for alert data; omit to keep alerts in memory only.
    #[serde(default)]
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NotifierConfig {
    /// Evaluation interval in seconds; unset or zero means one minute.
    #[serde(default)]
    pub interval: Option<u64>,
    /// How often failed backends are re-initialized, in seconds. Never
    /// faster than the evaluation interval; defaults to five times it.
    #[serde(default)]
    pub reinit_interval: Option<u64>,
    /// Deadline for a single delivery attempt, in seconds.
    #[serde(default)]
    pub delivery_timeout: Option<u64>,
    #[serde(default)]
    pub backends: Vec<BackendConfig>,
    #[serde(default)]
    pub targets: Vec<Target>,
}

impl NotifierConfig {
    pub fn interval(&self) -> Duration {
        match self.interval {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_INTERVAL,
        }
    }

    pub fn reinit_interval(&self) -> Duration {
        let interval = self.interval();
        match self.reinit_interval {
            Some(secs) if secs > 0 => Duration::from_secs(secs).max(interval),
            _ => interval * 5,
        }
    }

    pub fn delivery_timeout(&self) -> Duration {
        let timeout = match self.delivery_timeout {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_DELIVERY_TIMEOUT,
        };
        timeout.min(self.interval())
    }

    /// Structural checks shared by `Config::load` and registry construction:
    /// backends need unique non-empty names and exactly one variant.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let mut seen = HashSet::new();
        for (index, backend) in self.backends.iter().enumerate() {
            if backend.name.is_empty() {
                return Err(ConfigError::UnnamedBackend { index });
            }
            if !seen.insert(backend.name.as_str()) {
                return Err(ConfigError::DuplicateBackend {
                    name: backend.name.clone(),
                });
            }
            match (&backend.email, &backend.sms_modem) {
                (Some(_), None) | (None, Some(_)) => {}
                (None, None) => {
                    return Err(ConfigError::MissingBackendVariant {
                        name: backend.name.clone(),
                    })
                }
                (Some(_), Some(_)) => {
                    return Err(ConfigError::AmbiguousBackendVariant {
                        name: backend.name.clone(),
                    })
                }
            }
        }
        Ok(())
    }
}

/// One named delivery backend; exactly one variant must be set.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct BackendConfig {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<EmailConfig>,
    #[serde(default)]
    pub sms_modem: Option<SmsModemConfig>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EmailConfig {
    /// Sender address.
    pub from: String,
    /// SMTP relay, `host` or `host:port`.
    pub smarthost: String,
    // TODO: add auth and TLS support
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SmsModemConfig {
    /// Serial device path, e.g. `/dev/ttyUSB0`.
    pub device: String,
    pub baudrate: u32,
    /// Per-command timeout in seconds; unset or zero means five seconds.
    #[serde(default)]
    pub timeout: Option<u64>,
    /// SIM PIN, submitted once while bringing the modem up.
    #[serde(default)]
    pub pin: Option<u32>,
}

impl SmsModemConfig {
    pub fn command_timeout(&self) -> Duration {
        match self.timeout {
            Some(secs) if secs > 0 => Duration::from_secs(secs),
            _ => DEFAULT_COMMAND_TIMEOUT,
        }
    }
}

/// A notification recipient. A target without any channel is never matched
/// by a backend.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Target {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub sms: Option<String>,
}
