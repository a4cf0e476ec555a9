//! Live telemetry forwarding
//!
//! Pushes a compact position/charge record to a third-party live-tracking
//! service after cycles that produced live data. Fire-and-forget: callers
//! log failures and carry on.

use crate::config::TelemetryConfig;
use crate::error::{AutomedonError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use reqwest::header::{AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Compact record accepted by the live-tracking service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TelemetryRecord {
    pub lat: f64,
    pub lon: f64,
    /// km/h
    pub speed: f64,
    /// Traction battery state of charge in percent, when the car reports one
    pub soc: Option<f64>,
    pub charging: bool,
}

#[async_trait::async_trait]
pub trait TelemetryForwarder: Send + Sync {
    async fn send(&self, record: &TelemetryRecord) -> Result<()>;
}

/// Bearer-token authenticated HTTP forwarder
pub struct HttpForwarder {
    http: reqwest::Client,
    url: String,
    token: String,
    logger: StructuredLogger,
}

impl HttpForwarder {
    pub fn new(config: &TelemetryConfig, token: &str, device_id: &str) -> Result<Self> {
        if token.trim().is_empty() {
            return Err(AutomedonError::validation(
                "live_telemetry_token",
                "Token cannot be empty",
            ));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs.max(1)))
            .build()?;
        Ok(Self {
            http,
            url: config.url.clone(),
            token: token.trim().to_string(),
            logger: get_logger_with_context(LogContext::new("telemetry").with_device_id(device_id)),
        })
    }
}

#[async_trait::async_trait]
impl TelemetryForwarder for HttpForwarder {
    async fn send(&self, record: &TelemetryRecord) -> Result<()> {
        let resp = self
            .http
            .post(&self.url)
            .header(AUTHORIZATION, format!("Bearer {}", self.token))
            .header(USER_AGENT, concat!("automedon/", env!("APP_VERSION")))
            .json(record)
            .send()
            .await?;

        if !resp.status().is_success() {
            return Err(AutomedonError::network(format!(
                "telemetry service answered {}",
                resp.status()
            )));
        }
        self.logger.trace("Telemetry record forwarded");
        Ok(())
    }
}
