//! Configuration management for Helios
//!
//! This module handles loading, validation, and persistence of the application
//! configuration from YAML files. Every section carries defaults so partial
//! files load; validation runs before any value can drive a switch decision.

use crate::error::{HeliosError, Result};
#[cfg(feature = "openapi")]
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

mod defaults;
pub mod merge;
pub mod store;

pub use store::ConfigStore;

/// Default search locations, in order
pub const DEFAULT_CONFIG_PATHS: [&str; 3] = [
    "helios_config.yaml",
    "/data/helios_config.yaml",
    "/etc/helios/config.yaml",
];

/// Environment variable naming an explicit config file
pub const CONFIG_PATH_ENV: &str = "HELIOS_CONFIG";

/// Upper bound for `logging.csv_retention_days` (one century)
pub const MAX_RETENTION_DAYS: u32 = 36_500;

/// Upper bound for `window_s / sample_interval_s`
pub const MAX_WINDOW_SAMPLES: u64 = 86_400;

/// Main configuration structure
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct Config {
    /// Electrical parameters the switching thresholds derive from
    pub electrical: ElectricalConfig,

    /// Sampling cadence, smoothing window and dwell timers
    pub sampling: SamplingConfig,

    /// Night window during which automatic switching is suppressed
    pub night_mode: NightConfig,

    /// Automatic/manual mode selection
    pub control: ControlConfig,

    /// SolarEdge monitoring API (power source)
    pub solaredge: SolarEdgeConfig,

    /// Hue bridge smart plug (load actuator)
    pub hue: HueConfig,

    /// Logging and CSV recording
    pub logging: LoggingConfig,

    /// Web server binding configuration
    pub web: WebConfig,

    /// IANA timezone used to evaluate the night window
    pub timezone: String,
}

/// Electrical parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct ElectricalConfig {
    /// Nominal grid voltage in volts
    pub grid_voltage_v: f64,

    /// Maximum current drawn by the load in amperes
    pub max_current_a: f64,

    /// Fraction of nominal power required to switch on, in (0, 1]
    pub safety_margin: f64,

    /// Fractional gap between the ON and OFF thresholds, in [0, 1)
    pub hysteresis: f64,
}

/// Sampling and dwell configuration (all values in seconds)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct SamplingConfig {
    /// Length of the smoothing window
    pub window_s: u64,

    /// Control cycle cadence
    pub sample_interval_s: u64,

    /// Time the average must stay at or above the ON threshold
    pub require_stable_on_s: u64,

    /// Time the average must stay at or below the OFF threshold
    pub require_stable_off_s: u64,

    /// Minimum time the load stays on before it may be switched off
    pub min_on_time_s: u64,
}

/// Night window configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct NightConfig {
    /// Whether the night window is active
    pub enabled: bool,

    /// Window start in HH:MM (inclusive)
    pub start: String,

    /// Window end in HH:MM (exclusive); before `start` means it crosses midnight
    pub end: String,
}

/// Mode selection
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct ControlConfig {
    /// Automatic threshold-based switching
    pub auto_mode: bool,

    /// Target socket state while automatic mode is off
    pub manual_socket_state: Option<bool>,
}

/// SolarEdge monitoring API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct SolarEdgeConfig {
    /// Site overview endpoint
    pub url: String,

    /// Monitoring API key
    pub api_key: String,

    /// Request timeout in seconds
    pub timeout_s: f64,
}

/// Hue bridge smart plug
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct HueConfig {
    /// CLIP v2 resource URL of the plug
    pub url: String,

    /// Bridge application key
    pub app_key: String,

    /// Request timeout in seconds
    pub timeout_s: f64,

    /// Verify the bridge TLS certificate (bridges ship self-signed certs)
    pub verify_tls: bool,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Path to the application log file; empty disables file logging
    pub file: String,

    /// Number of rotated log files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,

    /// CSV file receiving one row per control cycle
    pub csv_log_file: String,

    /// Rows older than this many days are removed by cleanup; 0 keeps everything
    pub csv_retention_days: u32,
}

/// Web server configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(JsonSchema))]
#[serde(default)]
pub struct WebConfig {
    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

impl SamplingConfig {
    /// Number of samples the rolling window holds, never less than one
    pub fn buffer_capacity(&self) -> usize {
        if self.sample_interval_s == 0 {
            return 1;
        }
        usize::try_from(self.window_s / self.sample_interval_s)
            .unwrap_or(usize::MAX)
            .max(1)
    }
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Resolve which file backs the configuration.
    ///
    /// An explicit path wins, then `HELIOS_CONFIG`, then the first existing
    /// default location. `None` means no file exists yet.
    pub fn locate(explicit: Option<&Path>) -> Option<PathBuf> {
        if let Some(p) = explicit {
            return Some(p.to_path_buf());
        }
        if let Some(p) = std::env::var_os(CONFIG_PATH_ENV) {
            return Some(PathBuf::from(p));
        }
        DEFAULT_CONFIG_PATHS
            .iter()
            .map(PathBuf::from)
            .find(|p| p.exists())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        crate::thresholds::compute(&self.electrical)?;

        if self.sampling.sample_interval_s == 0 {
            return Err(HeliosError::validation(
                "sampling.sample_interval_s",
                "Must be greater than 0",
            ));
        }
        if self.sampling.window_s == 0 {
            return Err(HeliosError::validation(
                "sampling.window_s",
                "Must be greater than 0",
            ));
        }
        if self.sampling.window_s < self.sampling.sample_interval_s {
            return Err(HeliosError::validation(
                "sampling.window_s",
                "Must be at least sampling.sample_interval_s",
            ));
        }
        if self.sampling.window_s / self.sampling.sample_interval_s > MAX_WINDOW_SAMPLES {
            return Err(HeliosError::validation(
                "sampling.window_s".to_string(),
                format!(
                    "Window may hold at most {} samples at the configured interval",
                    MAX_WINDOW_SAMPLES
                ),
            ));
        }

        crate::night::NightWindow::parse(&self.night_mode.start, &self.night_mode.end)?;
        crate::night::parse_timezone(&self.timezone)?;
        crate::logging::parse_log_level(&self.logging.level)?;
        if self.logging.csv_retention_days > MAX_RETENTION_DAYS {
            return Err(HeliosError::validation(
                "logging.csv_retention_days".to_string(),
                format!("Must be at most {} days", MAX_RETENTION_DAYS),
            ));
        }

        if self.web.host.trim().is_empty() {
            return Err(HeliosError::validation(
                "web.host",
                "Bind address cannot be empty",
            ));
        }
        if self.web.port == 0 {
            return Err(HeliosError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }
        let valid_timeout = |t: f64| t.is_finite() && t > 0.0;
        if !valid_timeout(self.solaredge.timeout_s) || !valid_timeout(self.hue.timeout_s) {
            return Err(HeliosError::validation(
                "timeout_s",
                "Request timeouts must be positive",
            ));
        }

        Ok(())
    }

    /// Copy suitable for API responses, with credentials blanked
    pub fn redacted(&self) -> Self {
        let mut copy = self.clone();
        if !copy.solaredge.api_key.is_empty() {
            copy.solaredge.api_key = "***".to_string();
        }
        if !copy.hue.app_key.is_empty() {
            copy.hue.app_key = "***".to_string();
        }
        copy
    }
}
