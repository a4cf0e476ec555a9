//! Session establishment with a single deadline-bound wait

use super::{VehicleApi, VehicleInfo};
use crate::error::{AutomedonError, Result};
use std::time::Duration;

/// Log in and return the vehicles on the account.
///
/// Resolves exactly once: the vehicle list, the login error, or a timeout
/// when no answer arrived before `deadline`. An account without vehicles is
/// a session error.
pub async fn connect(api: &dyn VehicleApi, deadline: Duration) -> Result<Vec<VehicleInfo>> {
    let vehicles = tokio::time::timeout(deadline, api.login())
        .await
        .map_err(|_| {
            AutomedonError::timeout(format!(
                "no login confirmation within {}s",
                deadline.as_secs()
            ))
        })??;

    if vehicles.is_empty() {
        return Err(AutomedonError::session("account has no vehicles"));
    }
    Ok(vehicles)
}

/// Pick the configured VIN, or the first vehicle when no VIN is configured
pub fn select_vehicle<'a>(vehicles: &'a [VehicleInfo], vin: Option<&str>) -> Result<&'a VehicleInfo> {
    match vin.map(str::trim).filter(|v| !v.is_empty()) {
        Some(vin) => vehicles
            .iter()
            .find(|v| v.vin.eq_ignore_ascii_case(vin))
            .ok_or_else(|| AutomedonError::session(format!("VIN {} not found on account", vin))),
        None => vehicles
            .first()
            .ok_or_else(|| AutomedonError::session("account has no vehicles")),
    }
}
