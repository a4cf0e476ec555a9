//! Configuration management for Automedon
//!
//! This module handles loading, validation, and management of the application
//! configuration from YAML files.

use crate::error::{AutomedonError, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

mod defaults;

pub use defaults::{
    DEFAULT_POLL_INTERVAL_MINUTES, DEFAULT_SESSION_TIMEOUT_SECS, DEFAULT_SETTLE_DELAY_SECS,
    DEFAULT_WATCHDOG_BUDGET,
};

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Logging configuration
    pub logging: LoggingConfig,

    /// Control API binding configuration
    pub web: WebConfig,

    /// Vehicle API gateway endpoint
    pub gateway: GatewayConfig,

    /// Live telemetry service endpoint
    pub telemetry: TelemetryConfig,

    /// Capability view persistence
    pub persistence: PersistenceConfig,

    /// One entry per paired vehicle; each runs its own poll schedule
    pub vehicles: Vec<VehicleConfig>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (TRACE, DEBUG, INFO, WARN, ERROR)
    pub level: String,

    /// Optional console-specific level
    pub console_level: Option<String>,

    /// Optional file-specific level
    pub file_level: Option<String>,

    /// Path to log file (its directory receives the rolling files)
    pub file: String,

    /// Number of rotated files to keep
    pub backup_count: u32,

    /// Whether to log to console
    pub console_output: bool,

    /// Whether to use JSON format
    pub json_format: bool,
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WebConfig {
    /// Whether the control API is served at all
    pub enabled: bool,

    /// Bind address
    pub host: String,

    /// TCP port
    pub port: u16,
}

/// HTTP gateway that speaks the vendor protocol on our behalf
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GatewayConfig {
    /// Base URL, e.g. `http://127.0.0.1:8099`
    pub base_url: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Live tracking service receiving compact position records
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    /// Ingest URL; records are only forwarded for vehicles with a token
    pub url: String,

    /// Per-request timeout in seconds
    pub request_timeout_secs: u64,
}

/// Persistence configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistenceConfig {
    /// JSON file holding the last published capability values
    pub state_file: String,
}

/// Per-vehicle configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct VehicleConfig {
    /// Stable device identifier used in the API and persistence
    pub id: String,

    /// Display name
    pub name: String,

    /// Account credentials
    pub credentials: CredentialsConfig,

    /// Scheduling and watchdog settings
    pub polling: PollingConfig,

    /// Alarm thresholds and geolocation reference
    pub thresholds: ThresholdsConfig,

    /// Auth token for live telemetry forwarding; forwarding is off when unset
    pub live_telemetry_token: Option<String>,
}

/// Account credentials for the vehicle API session
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct CredentialsConfig {
    pub username: String,
    pub password: String,
    pub pin: String,
    pub region: String,
    pub brand: String,
    /// VIN to select when the account holds several vehicles
    pub vin: Option<String>,
}

/// Poll scheduling configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollingConfig {
    /// Interval between scheduled polls in minutes
    pub interval_minutes: u64,

    /// Force a full refresh when this many minutes passed since the last one
    pub forced_interval_minutes: Option<u64>,

    /// Failure/skip budget before a full session restart
    pub watchdog_budget: u32,

    /// Delay after a remote command before the resynchronising poll
    pub settle_delay_secs: u64,

    /// Deadline for session login
    pub session_timeout_secs: u64,
}

/// Alarm thresholds and reference point
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdsConfig {
    /// 12V battery alarm level in percent
    pub battery_alarm_level: f64,

    /// Traction battery alarm level in percent
    pub ev_battery_alarm_level: f64,

    /// Reference latitude for the distance capability
    pub reference_latitude: Option<f64>,

    /// Reference longitude for the distance capability
    pub reference_longitude: Option<f64>,
}

impl Config {
    /// Load configuration from a YAML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        Ok(config)
    }

    /// Load configuration from the first default location that exists
    pub fn load() -> Result<Self> {
        if let Ok(path) = std::env::var("AUTOMEDON_CONFIG") {
            return Self::from_file(path);
        }

        let default_paths = [
            "automedon.yaml",
            "/data/automedon.yaml",
            "/etc/automedon/config.yaml",
        ];

        for path in &default_paths {
            if Path::new(path).exists() {
                return Self::from_file(path);
            }
        }

        // Fall back to default configuration
        Ok(Config::default())
    }

    /// Save configuration to a YAML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let yaml = serde_yaml::to_string(self)?;
        std::fs::write(path, yaml)?;
        Ok(())
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<()> {
        if self.web.enabled && self.web.port == 0 {
            return Err(AutomedonError::validation(
                "web.port",
                "Port must be greater than 0",
            ));
        }

        if self.gateway.base_url.trim().is_empty() {
            return Err(AutomedonError::validation(
                "gateway.base_url",
                "Gateway URL cannot be empty",
            ));
        }

        let mut seen = std::collections::HashSet::new();
        for (idx, vehicle) in self.vehicles.iter().enumerate() {
            if vehicle.id.trim().is_empty() {
                return Err(AutomedonError::validation(
                    format!("vehicles[{}].id", idx),
                    "Vehicle id cannot be empty".to_string(),
                ));
            }
            if !seen.insert(vehicle.id.as_str()) {
                return Err(AutomedonError::validation(
                    format!("vehicles[{}].id", idx),
                    format!("Duplicate vehicle id '{}'", vehicle.id),
                ));
            }
            vehicle.validate(idx)?;
        }

        Ok(())
    }
}

impl VehicleConfig {
    fn validate(&self, idx: usize) -> Result<()> {
        let field = |name: &str| format!("vehicles[{}].{}", idx, name);

        if self.credentials.username.trim().is_empty() {
            return Err(AutomedonError::validation(
                field("credentials.username"),
                "Username cannot be empty".to_string(),
            ));
        }

        if self.polling.interval_minutes == 0 {
            return Err(AutomedonError::validation(
                field("polling.interval_minutes"),
                "Must be greater than 0".to_string(),
            ));
        }

        if self.polling.forced_interval_minutes == Some(0) {
            return Err(AutomedonError::validation(
                field("polling.forced_interval_minutes"),
                "Must be greater than 0 when set".to_string(),
            ));
        }

        if self.polling.watchdog_budget == 0 {
            return Err(AutomedonError::validation(
                field("polling.watchdog_budget"),
                "Must be greater than 0".to_string(),
            ));
        }

        for (name, level) in [
            ("thresholds.battery_alarm_level", self.thresholds.battery_alarm_level),
            (
                "thresholds.ev_battery_alarm_level",
                self.thresholds.ev_battery_alarm_level,
            ),
        ] {
            if !(0.0..=100.0).contains(&level) {
                return Err(AutomedonError::validation(
                    field(name),
                    "Must be within 0..=100".to_string(),
                ));
            }
        }

        match (
            self.thresholds.reference_latitude,
            self.thresholds.reference_longitude,
        ) {
            (Some(lat), Some(lon)) => {
                if !(-90.0..=90.0).contains(&lat) || !(-180.0..=180.0).contains(&lon) {
                    return Err(AutomedonError::validation(
                        field("thresholds.reference_latitude"),
                        "Reference point out of range".to_string(),
                    ));
                }
            }
            (None, None) => {}
            _ => {
                return Err(AutomedonError::validation(
                    field("thresholds.reference_latitude"),
                    "Latitude and longitude must be set together".to_string(),
                ));
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vehicle() -> VehicleConfig {
        VehicleConfig {
            id: "ev6".to_string(),
            credentials: CredentialsConfig {
                username: "driver@example.com".to_string(),
                password: "secret".to_string(),
                pin: "1234".to_string(),
                ..Default::default()
            },
            ..Default::default()
        }
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.web.port, 8089);
        assert!(config.vehicles.is_empty());
        let v = VehicleConfig::default();
        assert_eq!(v.polling.interval_minutes, DEFAULT_POLL_INTERVAL_MINUTES);
        assert_eq!(v.polling.watchdog_budget, DEFAULT_WATCHDOG_BUDGET);
        assert_eq!(v.polling.settle_delay_secs, 5);
    }

    #[test]
    fn test_config_validation() {
        let mut config = Config::default();
        config.vehicles.push(vehicle());
        assert!(config.validate().is_ok());

        config.vehicles[0].polling.interval_minutes = 0;
        assert!(config.validate().is_err());

        config.vehicles[0] = vehicle();
        config.vehicles[0].thresholds.reference_latitude = Some(52.0);
        assert!(config.validate().is_err());

        config.vehicles[0] = vehicle();
        config.vehicles.push(vehicle());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_serialization() {
        let mut config = Config::default();
        config.vehicles.push(vehicle());
        let yaml = serde_yaml::to_string(&config).unwrap();
        let deserialized: Config = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(config.web.port, deserialized.web.port);
        assert_eq!(deserialized.vehicles[0].id, "ev6");
    }

    #[test]
    fn partial_yaml_uses_defaults() {
        let yaml = r#"
vehicles:
  - id: niro
    credentials:
      username: someone
    polling:
      forced_interval_minutes: 120
"#;
        let config: Config = serde_yaml::from_str(yaml).unwrap();
        let v = &config.vehicles[0];
        assert_eq!(v.polling.forced_interval_minutes, Some(120));
        assert_eq!(v.polling.interval_minutes, DEFAULT_POLL_INTERVAL_MINUTES);
        assert!((v.thresholds.ev_battery_alarm_level - 20.0).abs() < f64::EPSILON);
        assert!(config.validate().is_ok());
    }
}
