#![allow(dead_code)]

use automedon::config::VehicleConfig;
use automedon::error::{AutomedonError, Result};
use automedon::vehicle::{
    ClimateOptions, Location, Odometer, VehicleApi, VehicleApiFactory, VehicleInfo, VehicleStatus,
};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scriptable in-memory vehicle backend
#[derive(Default)]
pub struct StubApi {
    pub reject_credentials: AtomicBool,
    pub fail_login: AtomicBool,
    pub hang_login: AtomicBool,
    pub no_vehicles: AtomicBool,
    pub hang_lock: AtomicBool,
    /// Applied to every status request
    pub status_delay: Mutex<Option<Duration>>,
    pub status: Mutex<VehicleStatus>,
    pub location: Mutex<Location>,
    calls: Mutex<Vec<String>>,
}

impl StubApi {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn set_status(&self, status: VehicleStatus) {
        *self.status.lock().unwrap() = status;
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn count(&self, call: &str) -> usize {
        self.calls().iter().filter(|c| c.as_str() == call).count()
    }

    fn record(&self, call: &str) {
        self.calls.lock().unwrap().push(call.to_string());
    }
}

#[async_trait::async_trait]
impl VehicleApi for StubApi {
    async fn login(&self) -> Result<Vec<VehicleInfo>> {
        self.record("login");
        if self.hang_login.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        if self.reject_credentials.load(Ordering::SeqCst) {
            return Err(AutomedonError::auth("invalid PIN"));
        }
        if self.fail_login.load(Ordering::SeqCst) {
            return Err(AutomedonError::session("backend unavailable"));
        }
        if self.no_vehicles.load(Ordering::SeqCst) {
            return Ok(vec![]);
        }
        Ok(vec![VehicleInfo {
            id: "veh-1".to_string(),
            vin: "KNAC381AFN5000001".to_string(),
            name: "EV6".to_string(),
            model: Some("EV6".to_string()),
        }])
    }

    async fn status(&self, refresh: bool) -> Result<VehicleStatus> {
        self.record(if refresh { "status_full" } else { "status_cached" });
        let delay = *self.status_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        Ok(self.status.lock().unwrap().clone())
    }

    async fn location(&self) -> Result<Location> {
        self.record("location");
        Ok(self.location.lock().unwrap().clone())
    }

    async fn odometer(&self) -> Result<Odometer> {
        self.record("odometer");
        Ok(Odometer {
            value: 4321.0,
            unit: "km".to_string(),
        })
    }

    async fn lock(&self) -> Result<()> {
        self.record("lock");
        if self.hang_lock.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
        Ok(())
    }

    async fn unlock(&self) -> Result<()> {
        self.record("unlock");
        Ok(())
    }

    async fn start(&self, options: ClimateOptions) -> Result<()> {
        self.record(&format!("start:{}:{}", options.defrost, options.temperature));
        Ok(())
    }

    async fn stop(&self) -> Result<()> {
        self.record("stop");
        Ok(())
    }
}

/// Hands out the same stub for every session and counts creations
pub struct StubFactory {
    pub api: Arc<StubApi>,
    created: AtomicUsize,
}

impl StubFactory {
    pub fn new(api: Arc<StubApi>) -> Arc<Self> {
        Arc::new(Self {
            api,
            created: AtomicUsize::new(0),
        })
    }

    pub fn created(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }
}

impl VehicleApiFactory for StubFactory {
    fn create(&self, _vehicle: &VehicleConfig) -> Result<Arc<dyn VehicleApi>> {
        self.created.fetch_add(1, Ordering::SeqCst);
        Ok(self.api.clone())
    }
}

pub fn vehicle_config(id: &str) -> VehicleConfig {
    let mut config = VehicleConfig {
        id: id.to_string(),
        name: "Test EV6".to_string(),
        ..Default::default()
    };
    config.credentials.username = "driver@example.com".to_string();
    config
}
