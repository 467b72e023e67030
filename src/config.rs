use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::acquisition::DEFAULT_POLL_INTERVAL;
use crate::log_writer::DEFAULT_LOG_DIR;
use crate::sample_buffer::DEFAULT_CAPACITY;
use crate::serial_connector::SerialSettings;
use crate::transport::MediumUnit;

pub const DEFAULT_RECONNECT_INTERVAL: Duration = Duration::from_millis(5000);
pub const DEFAULT_AVERAGING_WINDOW: usize = 10;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Config I/O error ({}): {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Config parse error ({}): {source}", .path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("Invalid config: {0}")]
    Invalid(String),
}

/// Everything the monitor needs to know at startup. Every field may be omitted.
///
/// ```toml
/// poll_interval_ms = 100
/// reconnect_interval_ms = 5000
/// buffer_capacity = 600
/// averaging_window = 10
/// log_dir = "log"
///
/// [serial]
/// port = "/dev/ttyUSB0"
/// baud_rate = 115200
///
/// [unit]
/// prefix = "milli"
/// unit = "standard_liter"
/// time_base = "minute"
/// ```
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub serial: SerialSettings,
    pub poll_interval_ms: u64,
    pub reconnect_interval_ms: u64,
    pub buffer_capacity: usize,
    pub averaging_window: usize,
    pub log_dir: PathBuf,
    pub unit: MediumUnit,
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            serial: SerialSettings::default(),
            poll_interval_ms: DEFAULT_POLL_INTERVAL.as_millis() as u64,
            reconnect_interval_ms: DEFAULT_RECONNECT_INTERVAL.as_millis() as u64,
            buffer_capacity: DEFAULT_CAPACITY,
            averaging_window: DEFAULT_AVERAGING_WINDOW,
            log_dir: PathBuf::from(DEFAULT_LOG_DIR),
            unit: MediumUnit::default(),
        }
    }
}

impl MonitorConfig {
    pub fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;

        let config: Self = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;

        log::info!("Loaded config from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "poll_interval_ms must be positive".to_string(),
            ));
        }
        if self.reconnect_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "reconnect_interval_ms must be positive".to_string(),
            ));
        }
        if self.buffer_capacity == 0 {
            return Err(ConfigError::Invalid(
                "buffer_capacity must be positive".to_string(),
            ));
        }
        if self.averaging_window == 0 || self.averaging_window > self.buffer_capacity {
            return Err(ConfigError::Invalid(format!(
                "averaging_window must be between 1 and buffer_capacity ({}), got {}",
                self.buffer_capacity, self.averaging_window
            )));
        }
        if self.serial.baud_rate == 0 {
            return Err(ConfigError::Invalid("baud_rate must be positive".to_string()));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    pub fn reconnect_interval(&self) -> Duration {
        Duration::from_millis(self.reconnect_interval_ms)
    }
}
