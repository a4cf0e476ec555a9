//! # Automedon - Connected Vehicle Bridge
//!
//! Keeps a local picture of one or more connected cars in sync with the
//! vendor backend without draining the 12V battery, and publishes that
//! picture as capabilities and directional trigger events for home
//! automation.
//!
//! ## Features
//!
//! - **Battery-aware polling**: cheap cached status by default, full wake-up
//!   refresh only when the car is active, on request or on a forced interval
//! - **Self-healing**: a per-vehicle watchdog rebuilds stuck sessions
//! - **Change detection**: every capability republished, triggers only on
//!   transitions
//! - **Live telemetry**: optional forwarding of position and charge state
//! - **Web Interface**: REST API for status and manual controls
//! - **Configuration**: YAML-based configuration with validation
//!
//! ## Architecture
//!
//! - `config`: Configuration management and validation
//! - `logging`: Structured logging and tracing
//! - `vehicle`: Vehicle API trait, session pairing and the HTTP gateway client
//! - `driver`: Poll scheduling, watchdog, reconciliation and change detection
//! - `sink`: Capability store and trigger bus
//! - `telemetry`: Live telemetry forwarding
//! - `geocode`: Reverse geocoding seam
//! - `units`: Temperature codes and distances
//! - `web`: HTTP server and REST API
//! - `persistence`: State persistence and recovery

pub mod config;
pub mod driver;
pub mod error;
pub mod geocode;
pub mod logging;
pub mod persistence;
pub mod sink;
pub mod telemetry;
pub mod units;
pub mod vehicle;
pub mod web;


// Re-export commonly used types
pub use config::Config;
pub use driver::{DriverCommand, VehicleDriver};
pub use error::{AutomedonError, Result};
