use crate::config::VehicleConfig;
use crate::units::GeoPoint;
use crate::vehicle::{Location, Odometer, VehicleStatus};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Main driver state
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum DriverState {
    /// Driver is initializing
    Initializing,
    /// Driver is polling on schedule
    Running,
    /// Watchdog exhausted, session is being rebuilt
    Restarting,
    /// Driver is shutting down
    ShuttingDown,
}

impl DriverState {
    pub fn as_str(&self) -> &'static str {
        match self {
            DriverState::Initializing => "Initializing",
            DriverState::Running => "Running",
            DriverState::Restarting => "Restarting",
            DriverState::ShuttingDown => "ShuttingDown",
        }
    }
}

/// A value together with the time it was retrieved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Stamped<T> {
    pub value: T,
    pub retrieved_at: DateTime<Utc>,
}

impl<T> Stamped<T> {
    pub fn new(value: T, retrieved_at: DateTime<Utc>) -> Self {
        Self {
            value,
            retrieved_at,
        }
    }
}

/// Last complete status, location and odometer of a vehicle.
///
/// Only constructible from all three parts, so a cycle that fails halfway
/// can never leave a mixed snapshot behind.
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleSnapshot {
    status: Stamped<VehicleStatus>,
    location: Stamped<Location>,
    odometer: Stamped<Odometer>,
}

impl VehicleSnapshot {
    pub fn new(
        status: Stamped<VehicleStatus>,
        location: Stamped<Location>,
        odometer: Stamped<Odometer>,
    ) -> Self {
        Self {
            status,
            location,
            odometer,
        }
    }

    pub fn status(&self) -> &Stamped<VehicleStatus> {
        &self.status
    }

    pub fn location(&self) -> &Stamped<Location> {
        &self.location
    }

    pub fn odometer(&self) -> &Stamped<Odometer> {
        &self.odometer
    }
}

/// Per-device polling state, passed explicitly to each cycle
#[derive(Debug, Clone, PartialEq)]
pub struct PollState {
    /// A cycle is in flight
    pub busy: bool,
    /// Failures and skips left before the session is rebuilt
    pub watchdog_counter: u32,
    pub(crate) watchdog_budget: u32,
    /// Time of the last cycle that fetched a fresh status
    pub last_refresh: Option<DateTime<Utc>>,
    /// Last time the vehicle was seen active
    pub last_active: Option<DateTime<Utc>>,
    /// Whether the last cycle woke the car
    pub live_data_mode: bool,
    pub snapshot: Option<VehicleSnapshot>,
    /// Last status record seen, cheap or full; used for the sleep-mode check
    pub cached_status: Option<Stamped<VehicleStatus>>,
}

/// Alarm levels, forced refresh interval and reference point of one vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    /// 12V battery alarm level in percent
    pub battery_alarm_level: f64,
    /// Traction battery alarm level in percent
    pub ev_battery_alarm_level: f64,
    /// Force a full refresh when the last one is older than this
    pub forced_interval: Option<chrono::Duration>,
    pub reference: Option<GeoPoint>,
}

impl From<&VehicleConfig> for Thresholds {
    fn from(config: &VehicleConfig) -> Self {
        let reference = match (
            config.thresholds.reference_latitude,
            config.thresholds.reference_longitude,
        ) {
            (Some(lat), Some(lon)) => Some(GeoPoint::new(lat, lon)),
            _ => None,
        };
        Self {
            battery_alarm_level: config.thresholds.battery_alarm_level,
            ev_battery_alarm_level: config.thresholds.ev_battery_alarm_level,
            forced_interval: config
                .polling
                .forced_interval_minutes
                .filter(|m| *m > 0)
                .map(|m| chrono::Duration::minutes(m as i64)),
            reference,
        }
    }
}

/// Commands accepted by the driver from external components (web, etc.)
#[derive(Debug, Clone, PartialEq)]
pub enum DriverCommand {
    /// Poll now with a full refresh
    ForcePoll,
    SetLocked(bool),
    SetClimate {
        on: bool,
        /// °C; the published target temperature is used when absent
        temperature: Option<f64>,
    },
    SetDefrost(bool),
    /// Re-arm the scheduler with a new interval in minutes
    Schedule(u64),
    StopPolling,
    Shutdown,
}

/// Status published by the driver for the control API
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DriverStatus {
    pub timestamp: String,
    pub device_id: String,
    pub name: String,
    /// Driver state (Initializing, Running, Restarting, ShuttingDown)
    pub driver_state: String,
    pub busy: bool,
    pub watchdog_counter: u32,
    pub watchdog_budget: u32,
    pub polling_armed: bool,
    pub poll_interval_minutes: Option<u64>,
    pub last_refresh: Option<String>,
    pub last_active: Option<String>,
    pub live_data_mode: bool,
    pub has_snapshot: bool,
    pub total_cycles: u64,
    pub failed_cycles: u64,
    pub skipped_ticks: u64,
    pub restarts: u64,
    pub last_cycle_ms: Option<u64>,
    pub last_error: Option<String>,
}
