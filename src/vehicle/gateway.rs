//! HTTP gateway client
//!
//! Talks JSON to a gateway process that implements the vendor protocol. The
//! gateway holds no state we rely on beyond the bearer token it issues.

use super::session::select_vehicle;
use super::types::{ClimateOptions, Location, Odometer, VehicleInfo, VehicleStatus};
use super::{VehicleApi, VehicleApiFactory};
use crate::config::{GatewayConfig, VehicleConfig};
use crate::error::{AutomedonError, Result};
use crate::logging::{LogContext, StructuredLogger, get_logger_with_context};
use chrono::{DateTime, Utc};
use reqwest::StatusCode;
use reqwest::header::{ACCEPT, AUTHORIZATION, USER_AGENT};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Tokens are renewed this long before the gateway says they expire
const TOKEN_RENEW_MARGIN_SECS: i64 = 60;

#[derive(Debug, Serialize)]
struct LoginRequest<'a> {
    username: &'a str,
    password: &'a str,
    pin: &'a str,
    region: &'a str,
    brand: &'a str,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse {
    token: String,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    vehicles: Vec<VehicleInfo>,
}

#[derive(Debug, Clone)]
struct GatewaySession {
    token: String,
    vehicle_id: String,
    vehicles: Vec<VehicleInfo>,
    expires_at: Option<DateTime<Utc>>,
}

impl GatewaySession {
    fn is_valid(&self, now: DateTime<Utc>) -> bool {
        self.expires_at
            .map(|at| now + chrono::Duration::seconds(TOKEN_RENEW_MARGIN_SECS) < at)
            .unwrap_or(true)
    }
}

/// [`VehicleApi`] over the JSON gateway
pub struct GatewayClient {
    http: reqwest::Client,
    base_url: String,
    vehicle: VehicleConfig,
    session: Mutex<Option<GatewaySession>>,
    logger: StructuredLogger,
}

impl GatewayClient {
    pub fn new(gateway: &GatewayConfig, vehicle: &VehicleConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(gateway.request_timeout_secs.max(1)))
            .build()?;
        let logger = get_logger_with_context(
            LogContext::new("gateway").with_device_id(&vehicle.id),
        );
        Ok(Self {
            http,
            base_url: gateway.base_url.trim_end_matches('/').to_string(),
            vehicle: vehicle.clone(),
            session: Mutex::new(None),
            logger,
        })
    }

    async fn authorized(&self) -> Result<(String, String)> {
        let guard = self.session.lock().await;
        match guard.as_ref() {
            Some(s) => Ok((s.token.clone(), s.vehicle_id.clone())),
            None => Err(AutomedonError::session("not logged in")),
        }
    }

    async fn invalidate(&self) {
        *self.session.lock().await = None;
    }

    async fn check(&self, resp: reqwest::Response, what: &str) -> Result<reqwest::Response> {
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            self.invalidate().await;
            return Err(AutomedonError::session(format!(
                "{} rejected, session expired ({})",
                what, status
            )));
        }
        let body = resp.text().await.unwrap_or_default();
        Err(AutomedonError::api(format!(
            "{} failed with {}: {}",
            what,
            status,
            body.chars().take(200).collect::<String>()
        )))
    }

    async fn get_json<T: for<'de> Deserialize<'de>>(&self, path: &str, what: &str) -> Result<T> {
        let (token, vehicle_id) = self.authorized().await?;
        let url = format!("{}/vehicles/{}/{}", self.base_url, vehicle_id, path);
        let resp = self
            .http
            .get(url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(ACCEPT, "application/json")
            .header(USER_AGENT, concat!("automedon/", env!("APP_VERSION")))
            .send()
            .await?;
        let resp = self.check(resp, what).await?;
        Ok(resp.json::<T>().await?)
    }

    async fn post_command(&self, path: &str, body: serde_json::Value, what: &str) -> Result<()> {
        let (token, vehicle_id) = self.authorized().await?;
        let url = format!("{}/vehicles/{}/{}", self.base_url, vehicle_id, path);
        let resp = self
            .http
            .post(url)
            .header(AUTHORIZATION, format!("Bearer {}", token))
            .header(USER_AGENT, concat!("automedon/", env!("APP_VERSION")))
            .json(&body)
            .send()
            .await?;
        self.check(resp, what).await?;
        self.logger.info(&format!("{} accepted", what));
        Ok(())
    }
}

#[async_trait::async_trait]
impl VehicleApi for GatewayClient {
    async fn login(&self) -> Result<Vec<VehicleInfo>> {
        let mut guard = self.session.lock().await;
        if let Some(session) = guard.as_ref() {
            if session.is_valid(Utc::now()) {
                return Ok(session.vehicles.clone());
            }
        }

        let creds = &self.vehicle.credentials;
        let resp = self
            .http
            .post(format!("{}/login", self.base_url))
            .header(USER_AGENT, concat!("automedon/", env!("APP_VERSION")))
            .json(&LoginRequest {
                username: &creds.username,
                password: &creds.password,
                pin: &creds.pin,
                region: &creds.region,
                brand: &creds.brand,
            })
            .send()
            .await?;

        let status = resp.status();
        if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
            *guard = None;
            return Err(AutomedonError::auth("invalid username, password or PIN"));
        }
        if !status.is_success() {
            *guard = None;
            return Err(AutomedonError::session(format!("login failed with {}", status)));
        }

        let body: LoginResponse = resp.json().await?;
        let selected = select_vehicle(&body.vehicles, creds.vin.as_deref())?.clone();
        self.logger.info(&format!(
            "Session established for {} ({}), {} vehicle(s) on account",
            selected.name,
            selected.vin,
            body.vehicles.len()
        ));

        *guard = Some(GatewaySession {
            token: body.token,
            vehicle_id: selected.id,
            vehicles: body.vehicles.clone(),
            expires_at: body
                .expires_in
                .map(|secs| Utc::now() + chrono::Duration::seconds(secs)),
        });
        Ok(body.vehicles)
    }

    async fn status(&self, refresh: bool) -> Result<VehicleStatus> {
        let path = format!("status?refresh={}", refresh);
        self.get_json(&path, "status").await
    }

    async fn location(&self) -> Result<Location> {
        self.get_json("location", "location").await
    }

    async fn odometer(&self) -> Result<Odometer> {
        self.get_json("odometer", "odometer").await
    }

    async fn lock(&self) -> Result<()> {
        self.post_command("lock", serde_json::json!({}), "lock").await
    }

    async fn unlock(&self) -> Result<()> {
        self.post_command("unlock", serde_json::json!({}), "unlock")
            .await
    }

    async fn start(&self, options: ClimateOptions) -> Result<()> {
        let body = serde_json::json!({
            "defrost": options.defrost,
            "windscreenHeating": options.windscreen_heating,
            "temperature": options.temperature,
            "airTemp": crate::units::encode_temperature(options.temperature),
            "duration": options.duration,
        });
        self.post_command("climate/start", body, "climate start")
            .await
    }

    async fn stop(&self) -> Result<()> {
        self.post_command("climate/stop", serde_json::json!({}), "climate stop")
            .await
    }
}

/// Stateless factory producing one [`GatewayClient`] per session
#[derive(Debug, Clone)]
pub struct GatewayFactory {
    gateway: GatewayConfig,
}

impl GatewayFactory {
    pub fn new(gateway: GatewayConfig) -> Self {
        Self { gateway }
    }
}

impl VehicleApiFactory for GatewayFactory {
    fn create(&self, vehicle: &VehicleConfig) -> Result<Arc<dyn VehicleApi>> {
        Ok(Arc::new(GatewayClient::new(&self.gateway, vehicle)?))
    }
}
