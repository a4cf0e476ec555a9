//! Persistence layer for published capability values
//!
//! Saving the capability view lets the first cycle after a restart compare
//! against what automations last saw instead of an empty view.

use crate::error::Result;
use crate::logging::get_logger;
use crate::sink::CapabilityView;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// Persistent state structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistentState {
    /// Capability view per device id
    #[serde(default)]
    pub devices: BTreeMap<String, CapabilityView>,

    /// RFC 3339 time of the last save
    #[serde(default)]
    pub saved_at: Option<String>,
}

/// Persistence manager
pub struct PersistenceManager {
    file_path: String,
    state: PersistentState,
    logger: crate::logging::StructuredLogger,
}

impl PersistenceManager {
    /// Create a new persistence manager
    pub fn new(file_path: &str) -> Self {
        Self {
            file_path: file_path.to_string(),
            state: PersistentState::default(),
            logger: get_logger("persistence"),
        }
    }

    /// Load state from disk
    pub fn load(&mut self) -> Result<()> {
        let path = Path::new(&self.file_path);

        if !path.exists() {
            self.logger
                .info("No persistent state file found, using defaults");
            return Ok(());
        }

        let contents = std::fs::read_to_string(path)?;
        self.state = serde_json::from_str(&contents)?;
        self.logger.info(&format!(
            "Loaded persistent state for {} device(s)",
            self.state.devices.len()
        ));

        Ok(())
    }

    /// Save state to disk, writing through a temporary file
    pub fn save(&mut self) -> Result<()> {
        self.state.saved_at = Some(chrono::Utc::now().to_rfc3339());
        let contents = serde_json::to_string_pretty(&self.state)?;
        let tmp = format!("{}.tmp", self.file_path);
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &self.file_path)?;
        self.logger.debug("Saved persistent state to disk");

        Ok(())
    }

    pub fn device_view(&self, device_id: &str) -> Option<&CapabilityView> {
        self.state.devices.get(device_id)
    }

    pub fn set_device_view(&mut self, device_id: &str, view: CapabilityView) {
        self.state.devices.insert(device_id.to_string(), view);
    }

    /// Drop a removed device's state
    pub fn remove_device(&mut self, device_id: &str) -> bool {
        self.state.devices.remove(device_id).is_some()
    }

    pub fn state(&self) -> &PersistentState {
        &self.state
    }
}
