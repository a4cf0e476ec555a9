//! Core driver logic for Automedon
//!
//! One [`VehicleDriver`] owns the polling state of one vehicle. A recurring
//! tick gates each reconciliation cycle through the watchdog, runs it as a
//! task so a hung backend shows up as skipped ticks, and folds the result
//! back into the state. Manual commands arrive over an mpsc channel.

mod commands;
pub mod detect;
pub mod dispatch;
pub mod reconcile;
mod runtime;
pub mod types;
pub mod watchdog;

pub use detect::{Observation, Reduction, Transition, VehicleProperties, derive_properties, reduce};
pub use reconcile::{CycleContext, CycleOutcome, run_cycle};
pub use types::{
    DriverCommand, DriverState, DriverStatus, PollState, Stamped, Thresholds, VehicleSnapshot,
};
pub use watchdog::{CycleGate, PollScheduler};

use crate::config::VehicleConfig;
use crate::geocode::ReverseGeocoder;
use crate::logging::StructuredLogger;
use crate::sink::CapabilitySink;
use crate::telemetry::TelemetryForwarder;
use crate::vehicle::{VehicleApi, VehicleApiFactory};
use std::collections::VecDeque;
use std::sync::Arc;
use tokio::sync::{mpsc, watch};

/// Everything a driver talks to besides its own channels
#[derive(Clone)]
pub struct Collaborators {
    pub factory: Arc<dyn VehicleApiFactory>,
    pub sink: Arc<dyn CapabilitySink>,
    pub forwarder: Option<Arc<dyn TelemetryForwarder>>,
    pub geocoder: Arc<dyn ReverseGeocoder>,
}

/// Lifetime counters exposed through [`DriverStatus`]
#[derive(Debug, Clone, Copy, Default)]
struct CycleStats {
    total_cycles: u64,
    failed_cycles: u64,
    skipped_ticks: u64,
    restarts: u64,
}

/// Main driver for one vehicle
pub struct VehicleDriver {
    /// Configuration
    config: VehicleConfig,
    thresholds: Thresholds,

    /// Session factory, used again on every watchdog restart
    factory: Arc<dyn VehicleApiFactory>,
    api: Arc<dyn VehicleApi>,
    sink: Arc<dyn CapabilitySink>,
    forwarder: Option<Arc<dyn TelemetryForwarder>>,
    geocoder: Arc<dyn ReverseGeocoder>,

    state: PollState,
    scheduler: PollScheduler,
    /// Bumped on restart; results of older cycles are dropped
    generation: u64,
    driver_state: DriverState,
    stats: CycleStats,
    last_error: Option<String>,
    last_cycle_ms: Option<u64>,
    /// Remote commands that arrived while the vehicle was busy, one per subsystem
    deferred: VecDeque<DriverCommand>,

    /// Logger with context
    logger: StructuredLogger,

    /// Command receiver for external control
    commands_rx: mpsc::UnboundedReceiver<DriverCommand>,

    /// Command sender, used to queue the post-command resync
    commands_tx: mpsc::UnboundedSender<DriverCommand>,

    /// Finished cycles and remote commands
    completions_tx: mpsc::UnboundedSender<runtime::Completion>,
    completions_rx: mpsc::UnboundedReceiver<runtime::Completion>,

    /// Latest status for the control API
    status_tx: watch::Sender<Arc<DriverStatus>>,
}
