use super::*;

pub const DEFAULT_POLL_INTERVAL_MINUTES: u64 = 10;
pub const DEFAULT_WATCHDOG_BUDGET: u32 = 6;
pub const DEFAULT_SETTLE_DELAY_SECS: u64 = 5;
pub const DEFAULT_SESSION_TIMEOUT_SECS: u64 = 30;

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "INFO".to_string(),
            console_level: None,
            file_level: None,
            file: "/tmp/automedon.log".to_string(),
            backup_count: 5,
            console_output: true,
            json_format: false,
        }
    }
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            host: "127.0.0.1".to_string(),
            port: 8089,
        }
    }
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: "http://127.0.0.1:8099".to_string(),
            request_timeout_secs: 60,
        }
    }
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            url: "https://live.example.org/api/v1/telemetry".to_string(),
            request_timeout_secs: 10,
        }
    }
}

impl Default for PersistenceConfig {
    fn default() -> Self {
        Self {
            state_file: "/data/automedon_state.json".to_string(),
        }
    }
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval_minutes: DEFAULT_POLL_INTERVAL_MINUTES,
            forced_interval_minutes: None,
            watchdog_budget: DEFAULT_WATCHDOG_BUDGET,
            settle_delay_secs: DEFAULT_SETTLE_DELAY_SECS,
            session_timeout_secs: DEFAULT_SESSION_TIMEOUT_SECS,
        }
    }
}

impl Default for ThresholdsConfig {
    fn default() -> Self {
        Self {
            battery_alarm_level: 60.0,
            ev_battery_alarm_level: 20.0,
            reference_latitude: None,
            reference_longitude: None,
        }
    }
}

impl Default for VehicleConfig {
    fn default() -> Self {
        Self {
            id: String::new(),
            name: "Vehicle".to_string(),
            credentials: CredentialsConfig::default(),
            polling: PollingConfig::default(),
            thresholds: ThresholdsConfig::default(),
            live_telemetry_token: None,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            logging: LoggingConfig::default(),
            web: WebConfig::default(),
            gateway: GatewayConfig::default(),
            telemetry: TelemetryConfig::default(),
            persistence: PersistenceConfig::default(),
            vehicles: Vec::new(),
        }
    }
}
