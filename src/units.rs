//! Unit helpers: vendor temperature codes and great-circle distance

use serde::{Deserialize, Serialize};

/// Lowest settable cabin temperature in °C (code `00H`)
pub const MIN_TEMPERATURE_C: f64 = 14.0;
/// Highest settable cabin temperature in °C
pub const MAX_TEMPERATURE_C: f64 = 30.0;
const TEMPERATURE_STEP_C: f64 = 0.5;

/// Mean earth radius in kilometres
const EARTH_RADIUS_KM: f64 = 6371.0;

/// A WGS84 coordinate pair
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct GeoPoint {
    pub latitude: f64,
    pub longitude: f64,
}

impl GeoPoint {
    pub fn new(latitude: f64, longitude: f64) -> Self {
        Self {
            latitude,
            longitude,
        }
    }
}

/// Decode a vendor temperature code such as `"0EH"` into °C.
///
/// The code is a hexadecimal step index above 14 °C in 0.5 °C steps with an
/// `H` suffix. Returns `None` for malformed or out-of-range codes.
pub fn decode_temperature(code: &str) -> Option<f64> {
    let trimmed = code.trim();
    let hex = trimmed
        .strip_suffix('H')
        .or_else(|| trimmed.strip_suffix('h'))
        .unwrap_or(trimmed);
    if hex.is_empty() {
        return None;
    }
    let index = u32::from_str_radix(hex, 16).ok()?;
    let celsius = MIN_TEMPERATURE_C + f64::from(index) * TEMPERATURE_STEP_C;
    (celsius <= MAX_TEMPERATURE_C).then_some(celsius)
}

/// Encode °C into the vendor temperature code, clamping to the settable range
pub fn encode_temperature(celsius: f64) -> String {
    let clamped = if celsius.is_finite() {
        celsius.clamp(MIN_TEMPERATURE_C, MAX_TEMPERATURE_C)
    } else {
        MIN_TEMPERATURE_C
    };
    let index = ((clamped - MIN_TEMPERATURE_C) / TEMPERATURE_STEP_C).round() as u32;
    format!("{:02X}H", index)
}

/// Haversine distance in kilometres
pub fn great_circle_km(a: GeoPoint, b: GeoPoint) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let dlat = (b.latitude - a.latitude).to_radians();
    let dlon = (b.longitude - a.longitude).to_radians();

    let h = (dlat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (dlon / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_KM * h.sqrt().min(1.0).asin()
}

/// Round to one decimal place
pub fn round_tenth(value: f64) -> f64 {
    (value * 10.0).round() / 10.0
}
