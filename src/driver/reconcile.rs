//! One reconciliation cycle
//!
//! Decides between the cheap cached status and a full wake-up refresh,
//! fetches, publishes the derived capabilities and commits the result to
//! [`PollState`]. State is only written once the publish succeeded.

use super::detect::{Observation, derive_properties, reduce};
use super::dispatch::publish;
use super::types::{PollState, Stamped, Thresholds, VehicleSnapshot};
use crate::error::{AutomedonError, Result};
use crate::geocode::{ReverseGeocoder, format_coordinates};
use crate::logging::StructuredLogger;
use crate::sink::CapabilitySink;
use crate::telemetry::{TelemetryForwarder, TelemetryRecord};
use crate::vehicle::{VehicleApi, VehicleStatus, session};
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;

/// Collaborators of a cycle; cheap to clone into a spawned task
#[derive(Clone)]
pub struct CycleContext {
    pub device_id: String,
    pub api: Arc<dyn VehicleApi>,
    pub sink: Arc<dyn CapabilitySink>,
    pub forwarder: Option<Arc<dyn TelemetryForwarder>>,
    pub geocoder: Arc<dyn ReverseGeocoder>,
    pub thresholds: Thresholds,
    pub session_timeout: Duration,
    pub logger: StructuredLogger,
}

/// What a successful cycle did
#[derive(Debug, Clone, Default, PartialEq)]
pub struct CycleOutcome {
    pub force_refresh: bool,
    pub live_data: bool,
    /// A full status was fetched and the snapshot replaced
    pub new_status: bool,
    pub active: bool,
    pub forwarded: bool,
    pub triggers: Vec<String>,
}

/// Backend refreshed its cached record on its own since we last looked
fn backend_refreshed(cheap: Option<&VehicleStatus>, cached: Option<&Stamped<VehicleStatus>>) -> bool {
    match (cheap, cached) {
        (Some(new), Some(old)) => matches!(
            (new.last_status_date.as_deref(), old.value.last_status_date.as_deref()),
            (Some(a), Some(b)) if a != b
        ),
        _ => false,
    }
}

/// Unknown 12V level counts as healthy
fn battery_ok(status: Option<&VehicleStatus>, thresholds: &Thresholds) -> bool {
    status
        .and_then(|s| s.battery_12v)
        .map(|level| level > thresholds.battery_alarm_level)
        .unwrap_or(true)
}

async fn fetch_snapshot(api: &dyn VehicleApi, now: DateTime<Utc>) -> Result<VehicleSnapshot> {
    let status = api.status(true).await?;
    let location = api
        .location()
        .await
        .map_err(|e| AutomedonError::partial_fetch("location".to_string(), e.to_string()))?;
    let odometer = api
        .odometer()
        .await
        .map_err(|e| AutomedonError::partial_fetch("odometer".to_string(), e.to_string()))?;

    Ok(VehicleSnapshot::new(
        Stamped::new(status, now),
        Stamped::new(location, now),
        Stamped::new(odometer, now),
    ))
}

fn telemetry_record(snapshot: &VehicleSnapshot) -> TelemetryRecord {
    let location = &snapshot.location().value;
    let status = &snapshot.status().value;
    TelemetryRecord {
        lat: location.latitude,
        lon: location.longitude,
        speed: location.speed,
        soc: status.soc(),
        charging: status.charging(),
    }
}

/// Run one cycle. The caller owns gating: `busy` must already be set and
/// the watchdog is updated from the returned result.
pub async fn run_cycle(
    ctx: &CycleContext,
    state: &mut PollState,
    force_requested: bool,
    now: DateTime<Utc>,
) -> Result<CycleOutcome> {
    session::connect(ctx.api.as_ref(), ctx.session_timeout).await?;

    let force_refresh = force_requested
        || state.forced_interval_elapsed(ctx.thresholds.forced_interval, now)
        || state.snapshot.is_none();

    let cheap = if force_refresh {
        None
    } else {
        Some(ctx.api.status(false).await?)
    };

    let reference = cheap
        .as_ref()
        .or_else(|| state.snapshot.as_ref().map(|s| &s.status().value));
    let active = reference.map(VehicleStatus::shows_activity).unwrap_or(false)
        || backend_refreshed(cheap.as_ref(), state.cached_status.as_ref());
    let recently_active = state.recently_active(now);
    let battery_ok = battery_ok(reference, &ctx.thresholds);
    let live_data = force_refresh || (battery_ok && (active || recently_active));

    ctx.logger.debug(&format!(
        "force={} active={} recent={} battery_ok={} live={}",
        force_refresh, active, recently_active, battery_ok, live_data
    ));

    let fresh = if live_data {
        Some(fetch_snapshot(ctx.api.as_ref(), now).await?)
    } else {
        None
    };

    // Everything fetched; staged until published
    let mut next = state.clone();
    let new_status = fresh.is_some();
    let observed_active = active
        || fresh
            .as_ref()
            .map(|s| s.status().value.shows_activity())
            .unwrap_or(false);
    next.live_data_mode = live_data;
    if observed_active {
        next.last_active = Some(now);
    }
    match fresh {
        Some(snapshot) => {
            next.cached_status = Some(snapshot.status().clone());
            next.last_refresh = Some(now);
            next.snapshot = Some(snapshot);
        }
        None => {
            if let Some(status) = &cheap {
                next.cached_status = Some(Stamped::new(status.clone(), now));
            }
        }
    }

    let snapshot = next
        .snapshot
        .as_ref()
        .ok_or_else(|| AutomedonError::generic("no snapshot after reconciliation"))?;

    let mut forwarded = false;
    if live_data && let Some(forwarder) = &ctx.forwarder {
        match forwarder.send(&telemetry_record(snapshot)).await {
            Ok(()) => forwarded = true,
            Err(e) => ctx
                .logger
                .warn(&format!("Live telemetry forwarding failed: {}", e)),
        }
    }

    let point = snapshot.location().value.point();
    let label = match ctx.geocoder.describe(point).await {
        Ok(label) => label,
        Err(e) => {
            ctx.logger
                .warn(&format!("Reverse geocoding failed, using coordinates: {}", e));
            format_coordinates(point)
        }
    };

    let status = if new_status {
        &snapshot.status().value
    } else {
        cheap.as_ref().unwrap_or(&snapshot.status().value)
    };
    let properties = derive_properties(
        Observation {
            status,
            location: Some(&snapshot.location().value),
            odometer: Some(&snapshot.odometer().value),
        },
        &ctx.thresholds,
        Some(label),
    );

    let reduction = reduce(&ctx.sink.view().await, &properties);
    let triggers = publish(ctx.sink.as_ref(), &ctx.device_id, &reduction, now).await?;
    if !triggers.is_empty() {
        ctx.logger
            .info(&format!("Fired triggers: {}", triggers.join(", ")));
    }
    *state = next;

    Ok(CycleOutcome {
        force_refresh,
        live_data,
        new_status,
        active: observed_active,
        forwarded,
        triggers,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::geocode::CoordinateGeocoder;
    use crate::logging::get_logger;
    use crate::sink::{CapabilityView, MemorySink, TriggerEvent};
    use crate::vehicle::{ClimateOptions, Location, Odometer, VehicleInfo};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, Ordering};

    #[derive(Default)]
    struct StubApi {
        cached: Mutex<VehicleStatus>,
        full: Mutex<VehicleStatus>,
        location: Mutex<Location>,
        fail_location: AtomicBool,
        calls: Mutex<Vec<&'static str>>,
    }

    impl StubApi {
        fn calls(&self) -> Vec<&'static str> {
            self.calls.lock().unwrap().clone()
        }

        fn record(&self, call: &'static str) {
            self.calls.lock().unwrap().push(call);
        }
    }

    #[async_trait::async_trait]
    impl VehicleApi for StubApi {
        async fn login(&self) -> Result<Vec<VehicleInfo>> {
            self.record("login");
            Ok(vec![VehicleInfo {
                id: "1".to_string(),
                vin: "KNA1".to_string(),
                name: "EV6".to_string(),
                model: None,
            }])
        }

        async fn status(&self, refresh: bool) -> Result<VehicleStatus> {
            if refresh {
                self.record("status_full");
                Ok(self.full.lock().unwrap().clone())
            } else {
                self.record("status_cached");
                Ok(self.cached.lock().unwrap().clone())
            }
        }

        async fn location(&self) -> Result<Location> {
            self.record("location");
            if self.fail_location.load(Ordering::SeqCst) {
                return Err(AutomedonError::api("location unavailable"));
            }
            Ok(self.location.lock().unwrap().clone())
        }

        async fn odometer(&self) -> Result<Odometer> {
            self.record("odometer");
            Ok(Odometer {
                value: 12345.0,
                unit: "km".to_string(),
            })
        }

        async fn lock(&self) -> Result<()> {
            Ok(())
        }

        async fn unlock(&self) -> Result<()> {
            Ok(())
        }

        async fn start(&self, _options: ClimateOptions) -> Result<()> {
            Ok(())
        }

        async fn stop(&self) -> Result<()> {
            Ok(())
        }
    }

    struct RecordingForwarder {
        fail: bool,
        records: Mutex<Vec<TelemetryRecord>>,
    }

    #[async_trait::async_trait]
    impl TelemetryForwarder for RecordingForwarder {
        async fn send(&self, record: &TelemetryRecord) -> Result<()> {
            self.records.lock().unwrap().push(record.clone());
            if self.fail {
                return Err(AutomedonError::network("tracker offline"));
            }
            Ok(())
        }
    }

    /// Sink that accepts reads but rejects every write
    struct RejectingSink;

    #[async_trait::async_trait]
    impl CapabilitySink for RejectingSink {
        async fn set_capability(&self, _name: &str, _value: serde_json::Value) -> Result<()> {
            Err(AutomedonError::sink("store offline"))
        }

        async fn view(&self) -> CapabilityView {
            CapabilityView::new()
        }

        async fn trigger(&self, _event: TriggerEvent) -> Result<()> {
            Err(AutomedonError::sink("store offline"))
        }
    }

    fn context(api: Arc<StubApi>, sink: Arc<dyn CapabilitySink>) -> CycleContext {
        CycleContext {
            device_id: "ev6".to_string(),
            api,
            sink,
            forwarder: None,
            geocoder: Arc::new(CoordinateGeocoder),
            thresholds: Thresholds {
                battery_alarm_level: 60.0,
                ev_battery_alarm_level: 20.0,
                forced_interval: None,
                reference: None,
            },
            session_timeout: Duration::from_secs(5),
            logger: get_logger("reconcile"),
        }
    }

    fn located(lat: f64, lon: f64) -> Location {
        Location {
            latitude: lat,
            longitude: lon,
            ..Default::default()
        }
    }

    fn seeded_state(status: VehicleStatus, location: Location, at: DateTime<Utc>) -> PollState {
        let mut state = PollState::new(6);
        state.snapshot = Some(VehicleSnapshot::new(
            Stamped::new(status.clone(), at),
            Stamped::new(location, at),
            Stamped::new(Odometer::default(), at),
        ));
        state.cached_status = Some(Stamped::new(status, at));
        state.last_refresh = Some(at);
        state
    }

    #[tokio::test]
    async fn first_cycle_forces_a_full_refresh() {
        let api = Arc::new(StubApi::default());
        *api.location.lock().unwrap() = located(52.1, 5.1);
        let sink = Arc::new(MemorySink::new("ev6"));
        let ctx = context(api.clone(), sink.clone());
        let mut state = PollState::new(6);
        let now = Utc::now();

        let outcome = run_cycle(&ctx, &mut state, false, now).await.unwrap();

        assert!(outcome.force_refresh);
        assert!(outcome.live_data);
        assert!(outcome.new_status);
        assert_eq!(api.calls(), vec!["login", "status_full", "location", "odometer"]);
        assert_eq!(state.last_refresh, Some(now));
        assert!(state.live_data_mode);
        let snapshot = state.snapshot.as_ref().unwrap();
        assert_eq!(snapshot.odometer().value.value, 12345.0);
        assert_eq!(sink.snapshot().get_f64("measure_odometer"), Some(12345.0));
        assert_eq!(
            sink.snapshot().get("location").and_then(|v| v.as_str()),
            Some("52.10000, 5.10000")
        );
    }

    #[tokio::test]
    async fn low_battery_idle_car_republishes_cached_status() {
        let api = Arc::new(StubApi::default());
        let earlier = Utc::now() - chrono::Duration::hours(2);
        let cached = VehicleStatus {
            battery_12v: Some(40.0),
            locked: true,
            ..Default::default()
        };
        *api.cached.lock().unwrap() = cached.clone();
        let sink = Arc::new(MemorySink::new("ev6"));
        let ctx = context(api.clone(), sink.clone());
        let mut state = seeded_state(VehicleStatus::default(), located(1.0, 2.0), earlier);

        let outcome = run_cycle(&ctx, &mut state, false, Utc::now()).await.unwrap();

        assert!(!outcome.live_data);
        assert!(!outcome.new_status);
        assert!(!state.live_data_mode);
        assert_eq!(api.calls(), vec!["login", "status_cached"]);
        assert_eq!(state.last_refresh, Some(earlier));
        assert_eq!(sink.snapshot().get_bool("locked"), Some(true));
        assert_eq!(sink.snapshot().get_bool("alarm_12v_battery"), Some(true));
        assert!(sink.stats().writes_attempted > 0);
    }

    #[tokio::test]
    async fn active_car_with_low_battery_stays_on_cached_data() {
        let api = Arc::new(StubApi::default());
        *api.cached.lock().unwrap() = VehicleStatus {
            battery_12v: Some(30.0),
            engine: true,
            ..Default::default()
        };
        let sink = Arc::new(MemorySink::new("ev6"));
        let ctx = context(api.clone(), sink);
        let earlier = Utc::now() - chrono::Duration::hours(1);
        let mut state = seeded_state(VehicleStatus::default(), located(1.0, 2.0), earlier);

        let outcome = run_cycle(&ctx, &mut state, false, Utc::now()).await.unwrap();
        assert!(!outcome.live_data);
        assert!(outcome.active);
        assert!(state.last_active.is_some());
        assert_eq!(outcome.triggers, vec!["engine_true"]);
    }

    #[tokio::test]
    async fn backend_refresh_counts_as_activity() {
        let api = Arc::new(StubApi::default());
        let earlier = Utc::now() - chrono::Duration::hours(1);
        let seen = VehicleStatus {
            last_status_date: Some("20240512090000".to_string()),
            battery_12v: Some(90.0),
            ..Default::default()
        };
        *api.cached.lock().unwrap() = VehicleStatus {
            last_status_date: Some("20240512100000".to_string()),
            ..seen.clone()
        };
        let ctx = context(api.clone(), Arc::new(MemorySink::new("ev6")));
        let mut state = seeded_state(seen, located(1.0, 2.0), earlier);

        let outcome = run_cycle(&ctx, &mut state, false, Utc::now()).await.unwrap();
        assert!(outcome.active);
        assert!(outcome.live_data);
        assert_eq!(
            api.calls(),
            vec!["login", "status_cached", "status_full", "location", "odometer"]
        );
    }

    #[tokio::test]
    async fn partial_fetch_keeps_previous_snapshot() {
        let api = Arc::new(StubApi::default());
        api.fail_location.store(true, Ordering::SeqCst);
        let sink = Arc::new(MemorySink::new("ev6"));
        let ctx = context(api.clone(), sink.clone());
        let earlier = Utc::now() - chrono::Duration::hours(1);
        let mut state = seeded_state(VehicleStatus::default(), located(10.0, 20.0), earlier);
        let before = state.snapshot.clone();

        let err = run_cycle(&ctx, &mut state, true, Utc::now()).await.unwrap_err();

        assert!(matches!(err, AutomedonError::PartialFetch { ref stage, .. } if stage == "location"));
        assert_eq!(state.snapshot, before);
        assert_eq!(state.last_refresh, Some(earlier));
        assert_eq!(sink.stats().writes_attempted, 0);
    }

    #[tokio::test]
    async fn publish_failure_leaves_state_untouched() {
        let api = Arc::new(StubApi::default());
        let mut ctx = context(api.clone(), Arc::new(RejectingSink));
        ctx.thresholds.forced_interval = Some(chrono::Duration::minutes(60));
        let now = Utc::now();
        let earlier = now - chrono::Duration::minutes(90);
        let mut state = seeded_state(VehicleStatus::default(), located(10.0, 20.0), earlier);
        let before = state.clone();

        let err = run_cycle(&ctx, &mut state, false, now).await.unwrap_err();

        assert!(matches!(err, AutomedonError::Sink { .. }));
        assert!(api.calls().contains(&"status_full"));
        assert_eq!(state.last_refresh, Some(earlier));
        assert_eq!(state, before);
        assert!(state.forced_interval_elapsed(ctx.thresholds.forced_interval, now));
    }

    #[tokio::test]
    async fn forced_interval_triggers_full_refresh() {
        let api = Arc::new(StubApi::default());
        *api.cached.lock().unwrap() = VehicleStatus {
            battery_12v: Some(20.0),
            ..Default::default()
        };
        let mut ctx = context(api.clone(), Arc::new(MemorySink::new("ev6")));
        ctx.thresholds.forced_interval = Some(chrono::Duration::minutes(60));
        let now = Utc::now();
        let mut state = seeded_state(
            VehicleStatus::default(),
            located(1.0, 2.0),
            now - chrono::Duration::minutes(90),
        );

        let outcome = run_cycle(&ctx, &mut state, false, now).await.unwrap();
        assert!(outcome.force_refresh);
        assert!(outcome.live_data);
        assert_eq!(state.last_refresh, Some(now));
        assert!(!api.calls().contains(&"status_cached"));
    }

    #[tokio::test]
    async fn forwarder_failure_does_not_fail_the_cycle() {
        let api = Arc::new(StubApi::default());
        *api.location.lock().unwrap() = Location {
            latitude: 52.0,
            longitude: 4.0,
            speed: 88.0,
            ..Default::default()
        };
        let forwarder = Arc::new(RecordingForwarder {
            fail: true,
            records: Mutex::new(Vec::new()),
        });
        let mut ctx = context(api, Arc::new(MemorySink::new("ev6")));
        ctx.forwarder = Some(forwarder.clone());
        let mut state = PollState::new(6);

        let outcome = run_cycle(&ctx, &mut state, true, Utc::now()).await.unwrap();
        assert!(!outcome.forwarded);
        let records = forwarder.records.lock().unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].speed, 88.0);
    }
}
