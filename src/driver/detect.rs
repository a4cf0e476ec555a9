//! Change detection
//!
//! [`derive_properties`] maps one observation of the vehicle onto the flat
//! set of published capabilities. [`reduce`] compares that set with what was
//! published before and yields the writes and directional triggers; it never
//! touches the sink itself.

use super::types::Thresholds;
use crate::sink::CapabilityView;
use crate::units::{decode_temperature, great_circle_km, round_tenth};
use crate::vehicle::{Location, Odometer, VehicleStatus};
use serde_json::{Value, json};

/// Capabilities whose transitions fire `<name>_true` / `<name>_false`
pub const DIRECTIONAL_CAPABILITIES: [&str; 4] = ["engine", "charging", "climate_control", "defrost"];

/// The records a cycle derives properties from
#[derive(Debug, Clone, Copy)]
pub struct Observation<'a> {
    pub status: &'a VehicleStatus,
    pub location: Option<&'a Location>,
    pub odometer: Option<&'a Odometer>,
}

/// Derived observable properties of a vehicle
#[derive(Debug, Clone, PartialEq)]
pub struct VehicleProperties {
    /// 12V battery in percent
    pub battery: Option<f64>,
    /// Traction battery in percent
    pub ev_battery: Option<f64>,
    /// Either battery below its alarm level
    pub alarm_battery: bool,
    pub alarm_12v_battery: bool,
    pub alarm_ev_battery: bool,
    pub alarm_tire_pressure: bool,
    pub locked: bool,
    /// Locked with every door, the trunk and the hood closed
    pub closed_locked: bool,
    pub climate_control: bool,
    pub defrost: bool,
    pub engine: bool,
    pub charging: bool,
    /// °C
    pub target_temperature: Option<f64>,
    pub odometer: Option<f64>,
    /// km
    pub range: Option<f64>,
    /// km/h
    pub speed: Option<f64>,
    pub location: Option<String>,
    /// km from the reference point, one decimal
    pub distance: Option<f64>,
}

fn below(value: Option<f64>, level: f64) -> bool {
    value.map(|v| v < level).unwrap_or(false)
}

pub fn derive_properties(
    observation: Observation<'_>,
    thresholds: &Thresholds,
    location_label: Option<String>,
) -> VehicleProperties {
    let status = observation.status;
    let alarm_12v_battery = below(status.battery_12v, thresholds.battery_alarm_level);
    let alarm_ev_battery = below(status.soc(), thresholds.ev_battery_alarm_level);

    let distance = match (thresholds.reference, observation.location) {
        (Some(reference), Some(location)) => {
            Some(round_tenth(great_circle_km(reference, location.point())))
        }
        _ => None,
    };

    VehicleProperties {
        battery: status.battery_12v,
        ev_battery: status.soc(),
        alarm_battery: alarm_12v_battery || alarm_ev_battery,
        alarm_12v_battery,
        alarm_ev_battery,
        alarm_tire_pressure: status.tire_pressure.any_lamp_lit(),
        locked: status.locked,
        closed_locked: status.locked && !status.doors.any_open(),
        climate_control: status.air_ctrl_on,
        defrost: status.defrost,
        engine: status.engine,
        charging: status.charging(),
        target_temperature: status.air_temp.as_deref().and_then(decode_temperature),
        odometer: observation.odometer.map(|o| o.value),
        range: status.range(),
        speed: observation.location.map(|l| l.speed),
        location: location_label,
        distance,
    }
}

impl VehicleProperties {
    /// Capability name and value pairs in publication order. Unknown values
    /// are published as null.
    pub fn capabilities(&self) -> Vec<(&'static str, Value)> {
        vec![
            ("measure_battery", json!(self.battery)),
            ("measure_ev_battery", json!(self.ev_battery)),
            ("alarm_battery", json!(self.alarm_battery)),
            ("alarm_12v_battery", json!(self.alarm_12v_battery)),
            ("alarm_ev_battery", json!(self.alarm_ev_battery)),
            ("alarm_tire_pressure", json!(self.alarm_tire_pressure)),
            ("locked", json!(self.locked)),
            ("closed_locked", json!(self.closed_locked)),
            ("climate_control", json!(self.climate_control)),
            ("defrost", json!(self.defrost)),
            ("engine", json!(self.engine)),
            ("charging", json!(self.charging)),
            ("target_temperature", json!(self.target_temperature)),
            ("measure_odometer", json!(self.odometer)),
            ("measure_range", json!(self.range)),
            ("measure_speed", json!(self.speed)),
            ("location", json!(self.location)),
            ("distance", json!(self.distance)),
        ]
    }
}

/// Directional trigger produced by a boolean transition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Transition {
    pub capability: &'static str,
    pub value: bool,
}

impl Transition {
    pub fn trigger_name(&self) -> String {
        format!("{}_{}", self.capability, self.value)
    }
}

/// Outcome of comparing new properties with the published view
#[derive(Debug, Clone, PartialEq)]
pub struct Reduction {
    /// Every capability, changed or not
    pub writes: Vec<(&'static str, Value)>,
    pub transitions: Vec<Transition>,
}

pub fn reduce(previous: &CapabilityView, properties: &VehicleProperties) -> Reduction {
    let writes = properties.capabilities();
    let mut transitions = Vec::new();

    for (name, value) in &writes {
        if DIRECTIONAL_CAPABILITIES.contains(name) {
            if let Some(new) = value.as_bool() {
                // First observation of an off state is steady state
                let changed = match previous.get_bool(name) {
                    Some(old) => old != new,
                    None => new,
                };
                if changed {
                    transitions.push(Transition {
                        capability: *name,
                        value: new,
                    });
                }
            }
        }
    }

    Reduction {
        writes,
        transitions,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::GeoPoint;
    use crate::vehicle::{DoorState, EvStatus, TirePressure};

    fn thresholds() -> Thresholds {
        Thresholds {
            battery_alarm_level: 60.0,
            ev_battery_alarm_level: 20.0,
            forced_interval: None,
            reference: None,
        }
    }

    fn applied(previous: &CapabilityView, reduction: &Reduction) -> CapabilityView {
        let mut view = previous.clone();
        for (name, value) in &reduction.writes {
            view.insert(name, value.clone());
        }
        view
    }

    fn props(status: &VehicleStatus) -> VehicleProperties {
        derive_properties(
            Observation {
                status,
                location: None,
                odometer: None,
            },
            &thresholds(),
            None,
        )
    }

    #[test]
    fn closed_locked_requires_every_closure_shut() {
        let mut status = VehicleStatus {
            locked: true,
            ..Default::default()
        };
        assert!(props(&status).closed_locked);

        status.doors = DoorState {
            back_right: true,
            ..Default::default()
        };
        assert!(!props(&status).closed_locked);

        status.doors = DoorState {
            hood: true,
            ..Default::default()
        };
        assert!(!props(&status).closed_locked);

        status.doors = DoorState::default();
        status.locked = false;
        assert!(!props(&status).closed_locked);
    }

    #[test]
    fn alarms_follow_thresholds() {
        let status = VehicleStatus {
            battery_12v: Some(55.0),
            ev: Some(EvStatus {
                soc: 45.0,
                ..Default::default()
            }),
            tire_pressure: TirePressure {
                front_left: true,
                ..Default::default()
            },
            ..Default::default()
        };
        let p = props(&status);
        assert!(p.alarm_12v_battery);
        assert!(!p.alarm_ev_battery);
        assert!(p.alarm_battery);
        assert!(p.alarm_tire_pressure);

        let unknown = props(&VehicleStatus::default());
        assert!(!unknown.alarm_battery);
    }

    #[test]
    fn target_temperature_is_decoded() {
        let status = VehicleStatus {
            air_temp: Some("0EH".to_string()),
            ..Default::default()
        };
        assert_eq!(props(&status).target_temperature, Some(21.0));
    }

    #[test]
    fn distance_is_rounded_to_a_tenth() {
        // One degree of latitude on the mean sphere is 111.19 km
        let mut t = thresholds();
        t.reference = Some(GeoPoint::new(52.0, 5.0));
        let location = Location {
            latitude: 53.0,
            longitude: 5.0,
            ..Default::default()
        };
        let status = VehicleStatus::default();
        let p = derive_properties(
            Observation {
                status: &status,
                location: Some(&location),
                odometer: None,
            },
            &t,
            None,
        );
        assert_eq!(p.distance, Some(111.2));
    }

    #[test]
    fn engine_flip_fires_exactly_one_trigger() {
        let off = VehicleStatus::default();
        let first = reduce(&CapabilityView::new(), &props(&off));
        assert!(first.transitions.is_empty());

        let on = VehicleStatus {
            engine: true,
            ..Default::default()
        };
        let second = reduce(&applied(&CapabilityView::new(), &first), &props(&on));
        assert_eq!(
            second.transitions,
            vec![Transition {
                capability: "engine",
                value: true
            }]
        );
        assert_eq!(second.transitions[0].trigger_name(), "engine_true");
    }

    #[test]
    fn unchanged_state_writes_everything_and_fires_nothing() {
        let status = VehicleStatus {
            engine: true,
            air_ctrl_on: true,
            ..Default::default()
        };
        let first = reduce(&CapabilityView::new(), &props(&status));
        assert_eq!(first.transitions.len(), 2);

        let published = applied(&CapabilityView::new(), &first);
        let second = reduce(&published, &props(&status));
        assert!(second.transitions.is_empty());
        assert_eq!(second.writes.len(), first.writes.len());
        assert_eq!(applied(&published, &second), published);
    }

    #[test]
    fn falling_edges_fire_false_triggers() {
        let mut previous = CapabilityView::new();
        previous.insert("charging", json!(true));
        previous.insert("defrost", json!(true));

        let r = reduce(&previous, &props(&VehicleStatus::default()));
        let names: Vec<String> = r.transitions.iter().map(|t| t.trigger_name()).collect();
        assert_eq!(names, vec!["defrost_false", "charging_false"]);
        assert_eq!(applied(&previous, &r).get_bool("charging"), Some(false));
    }
}
