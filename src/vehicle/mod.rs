//! Vehicle API surface for Automedon
//!
//! The vendor protocol itself is out of scope: the driver talks to any
//! [`VehicleApi`] implementation, by default the HTTP [`gateway`] client.

pub mod gateway;
pub mod session;
pub mod types;

use crate::config::VehicleConfig;
use crate::error::Result;
use std::sync::Arc;

pub use gateway::{GatewayClient, GatewayFactory};
pub use session::{connect, select_vehicle};
pub use types::{
    ClimateOptions, DoorState, EvStatus, Location, Odometer, TirePressure, VehicleInfo,
    VehicleStatus,
};

/// Remote session and query/command surface of one vehicle
#[async_trait::async_trait]
pub trait VehicleApi: Send + Sync {
    /// Authenticate and list the vehicles on the account.
    ///
    /// Must be idempotent: calling it on a live session only revalidates.
    async fn login(&self) -> Result<Vec<VehicleInfo>>;

    /// Status record; `refresh = false` may return the backend's cached copy
    /// without waking the car.
    async fn status(&self, refresh: bool) -> Result<VehicleStatus>;

    async fn location(&self) -> Result<Location>;

    async fn odometer(&self) -> Result<Odometer>;

    async fn lock(&self) -> Result<()>;

    async fn unlock(&self) -> Result<()>;

    /// Start climate control
    async fn start(&self, options: ClimateOptions) -> Result<()>;

    /// Stop climate control
    async fn stop(&self) -> Result<()>;
}

/// Creates fresh sessions; used at activation and on watchdog restarts
pub trait VehicleApiFactory: Send + Sync {
    fn create(&self, vehicle: &VehicleConfig) -> Result<Arc<dyn VehicleApi>>;
}
