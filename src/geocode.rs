//! Reverse geocoding seam
//!
//! Turning coordinates into an address is delegated; the built-in
//! implementation only formats the coordinates.

use crate::error::Result;
use crate::units::GeoPoint;

#[async_trait::async_trait]
pub trait ReverseGeocoder: Send + Sync {
    /// Human-readable description of a position
    async fn describe(&self, point: GeoPoint) -> Result<String>;
}

/// Formats the coordinates with five decimals (about one metre)
#[derive(Debug, Clone, Copy, Default)]
pub struct CoordinateGeocoder;

pub fn format_coordinates(point: GeoPoint) -> String {
    format!("{:.5}, {:.5}", point.latitude, point.longitude)
}

#[async_trait::async_trait]
impl ReverseGeocoder for CoordinateGeocoder {
    async fn describe(&self, point: GeoPoint) -> Result<String> {
        Ok(format_coordinates(point))
    }
}
