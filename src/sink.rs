//! Capability store and trigger bus
//!
//! The platform side of the bridge: the driver writes derived properties as
//! capabilities and fires directional trigger events. [`MemorySink`] is the
//! in-process implementation served by the control API and persisted across
//! restarts.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, VecDeque};
use std::sync::{Mutex, MutexGuard};
use tokio::sync::broadcast;

const TRIGGER_HISTORY: usize = 100;

/// Last published value of each capability
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CapabilityView(BTreeMap<String, serde_json::Value>);

impl CapabilityView {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&serde_json::Value> {
        self.0.get(name)
    }

    pub fn get_bool(&self, name: &str) -> Option<bool> {
        self.0.get(name).and_then(|v| v.as_bool())
    }

    pub fn get_f64(&self, name: &str) -> Option<f64> {
        self.0.get(name).and_then(|v| v.as_f64())
    }

    /// Returns true when the stored value changed
    pub fn insert(&mut self, name: &str, value: serde_json::Value) -> bool {
        match self.0.get(name) {
            Some(existing) if *existing == value => false,
            _ => {
                self.0.insert(name.to_string(), value);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &serde_json::Value)> {
        self.0.iter()
    }
}

/// Automation event fired on a boolean transition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TriggerEvent {
    pub device_id: String,
    /// e.g. `engine_true`, `charging_false`
    pub name: String,
    pub tokens: serde_json::Value,
    pub fired_at: chrono::DateTime<chrono::Utc>,
}

#[async_trait::async_trait]
pub trait CapabilitySink: Send + Sync {
    /// Idempotent write; unchanged values are a no-op
    async fn set_capability(&self, name: &str, value: serde_json::Value) -> Result<()>;

    /// Currently published values
    async fn view(&self) -> CapabilityView;

    /// Last published value of one capability
    async fn capability(&self, name: &str) -> Option<serde_json::Value> {
        self.view().await.get(name).cloned()
    }

    async fn trigger(&self, event: TriggerEvent) -> Result<()>;
}

/// Counters describing sink traffic
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SinkStats {
    pub writes_attempted: u64,
    pub writes_applied: u64,
    pub triggers_fired: u64,
}

#[derive(Debug, Default)]
struct SinkInner {
    view: CapabilityView,
    triggers: VecDeque<TriggerEvent>,
    stats: SinkStats,
}

/// In-memory capability store with a broadcast trigger bus
pub struct MemorySink {
    device_id: String,
    inner: Mutex<SinkInner>,
    trigger_tx: broadcast::Sender<TriggerEvent>,
}

impl MemorySink {
    pub fn new(device_id: &str) -> Self {
        let (trigger_tx, _) = broadcast::channel(64);
        Self {
            device_id: device_id.to_string(),
            inner: Mutex::new(SinkInner::default()),
            trigger_tx,
        }
    }

    pub fn device_id(&self) -> &str {
        &self.device_id
    }

    fn lock(&self) -> MutexGuard<'_, SinkInner> {
        // Values are plain data; a panicked writer cannot leave them torn
        self.inner.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Seed the view, e.g. from persisted state at startup
    pub fn restore(&self, view: CapabilityView) {
        self.lock().view = view;
    }

    pub fn snapshot(&self) -> CapabilityView {
        self.lock().view.clone()
    }

    pub fn stats(&self) -> SinkStats {
        self.lock().stats
    }

    /// Most recent trigger events, oldest first
    pub fn recent_triggers(&self) -> Vec<TriggerEvent> {
        self.lock().triggers.iter().cloned().collect()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<TriggerEvent> {
        self.trigger_tx.subscribe()
    }
}

#[async_trait::async_trait]
impl CapabilitySink for MemorySink {
    async fn set_capability(&self, name: &str, value: serde_json::Value) -> Result<()> {
        let mut inner = self.lock();
        inner.stats.writes_attempted += 1;
        if inner.view.insert(name, value) {
            inner.stats.writes_applied += 1;
        }
        Ok(())
    }

    async fn view(&self) -> CapabilityView {
        self.snapshot()
    }

    async fn trigger(&self, event: TriggerEvent) -> Result<()> {
        {
            let mut inner = self.lock();
            inner.stats.triggers_fired += 1;
            if inner.triggers.len() == TRIGGER_HISTORY {
                inner.triggers.pop_front();
            }
            inner.triggers.push_back(event.clone());
        }
        // No subscribers is fine
        let _ = self.trigger_tx.send(event);
        Ok(())
    }
}
