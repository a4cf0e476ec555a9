use serde::{Deserialize, Serialize};

/// A vehicle registered on the account
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleInfo {
    pub id: String,
    pub vin: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub model: Option<String>,
}

/// Open/closed flags for every closure of the body
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct DoorState {
    pub front_left: bool,
    pub front_right: bool,
    pub back_left: bool,
    pub back_right: bool,
    pub trunk: bool,
    pub hood: bool,
}

impl DoorState {
    pub fn any_open(&self) -> bool {
        self.front_left
            || self.front_right
            || self.back_left
            || self.back_right
            || self.trunk
            || self.hood
    }
}

/// Tire pressure warning lamps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TirePressure {
    pub all: bool,
    pub front_left: bool,
    pub front_right: bool,
    pub rear_left: bool,
    pub rear_right: bool,
}

impl TirePressure {
    pub fn any_lamp_lit(&self) -> bool {
        self.all || self.front_left || self.front_right || self.rear_left || self.rear_right
    }
}

/// Traction battery and charging state
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct EvStatus {
    /// State of charge in percent
    pub soc: f64,
    pub charging: bool,
    pub plugged_in: bool,
    /// Electric range in km
    pub range_km: Option<f64>,
}

/// Parsed vehicle status record
///
/// Only the fields the reconciliation needs are typed; everything else the
/// backend returns is kept verbatim in `extra`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct VehicleStatus {
    /// Ignition on
    pub engine: bool,
    pub locked: bool,
    pub doors: DoorState,
    /// Climate control running
    pub air_ctrl_on: bool,
    pub defrost: bool,
    /// Vendor-encoded target temperature, e.g. `"0EH"`
    pub air_temp: Option<String>,
    /// 12V battery state of charge in percent
    pub battery_12v: Option<f64>,
    pub ev: Option<EvStatus>,
    /// Combustion or combined range in km when no EV range is reported
    pub range_km: Option<f64>,
    pub tire_pressure: TirePressure,
    /// Backend timestamp of the cached record; changes when the backend
    /// refreshed on its own
    pub last_status_date: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl VehicleStatus {
    /// Ignition, climate or defrost on
    pub fn shows_activity(&self) -> bool {
        self.engine || self.air_ctrl_on || self.defrost
    }

    pub fn charging(&self) -> bool {
        self.ev.as_ref().map(|ev| ev.charging).unwrap_or(false)
    }

    pub fn soc(&self) -> Option<f64> {
        self.ev.as_ref().map(|ev| ev.soc)
    }

    /// EV range when present, otherwise the general range
    pub fn range(&self) -> Option<f64> {
        self.ev
            .as_ref()
            .and_then(|ev| ev.range_km)
            .or(self.range_km)
    }
}

/// GPS fix reported by the vehicle
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
    pub altitude: Option<f64>,
    /// Speed in km/h
    pub speed: f64,
    pub heading: Option<f64>,
}

impl Location {
    pub fn point(&self) -> crate::units::GeoPoint {
        crate::units::GeoPoint::new(self.latitude, self.longitude)
    }
}

/// Odometer reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Odometer {
    pub value: f64,
    pub unit: String,
}

impl Default for Odometer {
    fn default() -> Self {
        Self {
            value: 0.0,
            unit: "km".to_string(),
        }
    }
}

/// Options for starting climate control
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClimateOptions {
    pub defrost: bool,
    pub windscreen_heating: bool,
    /// Target temperature in °C
    pub temperature: f64,
    /// Duration in minutes
    pub duration: u32,
}

impl ClimateOptions {
    pub fn climate(temperature: f64) -> Self {
        Self {
            defrost: false,
            windscreen_heating: false,
            temperature,
            duration: 10,
        }
    }

    pub fn defrost(temperature: f64) -> Self {
        Self {
            defrost: true,
            windscreen_heating: true,
            ..Self::climate(temperature)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn status_parses_partial_record_and_keeps_extras() {
        let status: VehicleStatus = serde_json::from_value(json!({
            "engine": false,
            "locked": true,
            "doors": {"trunk": true},
            "airTemp": "0EH",
            "battery12v": 81.0,
            "ev": {"soc": 64.5, "charging": true, "rangeKm": 310.0},
            "lastStatusDate": "20240512093000",
            "reservChargeInfos": {"offpeak": 1}
        }))
        .unwrap();

        assert!(status.locked);
        assert!(status.doors.any_open());
        assert!(status.charging());
        assert_eq!(status.soc(), Some(64.5));
        assert_eq!(status.range(), Some(310.0));
        assert_eq!(status.battery_12v, Some(81.0));
        assert!(status.extra.contains_key("reservChargeInfos"));
        assert!(!status.shows_activity());
    }

    #[test]
    fn range_falls_back_to_general_range() {
        let status = VehicleStatus {
            range_km: Some(540.0),
            ..Default::default()
        };
        assert_eq!(status.range(), Some(540.0));
        assert_eq!(status.soc(), None);
    }

    #[test]
    fn tire_lamps() {
        assert!(!TirePressure::default().any_lamp_lit());
        let t = TirePressure {
            rear_left: true,
            ..Default::default()
        };
        assert!(t.any_lamp_lit());
    }
}
