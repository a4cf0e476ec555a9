//! Axum-based control API
//!
//! Read-only views of each vehicle's driver status and published
//! capabilities, plus the manual controls. Commands are queued to the
//! driver; the handlers never wait for the car.

use crate::driver::{DriverCommand, DriverStatus};
use crate::sink::MemorySink;
use crate::units::{MAX_TEMPERATURE_C, MIN_TEMPERATURE_C};
use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::net::{IpAddr, SocketAddr};
use std::sync::Arc;
use tokio::sync::{mpsc, watch};
use tower_http::{cors::CorsLayer, trace::TraceLayer};

/// What the API needs to reach one running driver
#[derive(Clone)]
pub struct DeviceHandle {
    pub id: String,
    pub name: String,
    pub commands: mpsc::UnboundedSender<DriverCommand>,
    pub status: watch::Receiver<Arc<DriverStatus>>,
    pub sink: Arc<MemorySink>,
}

#[derive(Clone)]
pub struct AppState {
    pub devices: Arc<BTreeMap<String, DeviceHandle>>,
}

impl AppState {
    pub fn new(handles: Vec<DeviceHandle>) -> Self {
        let devices = handles.into_iter().map(|h| (h.id.clone(), h)).collect();
        Self {
            devices: Arc::new(devices),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct LockBody {
    pub locked: bool,
}

#[derive(Debug, Deserialize)]
pub struct ClimateBody {
    pub on: bool,
    /// °C
    #[serde(default)]
    pub temperature: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct DefrostBody {
    pub on: bool,
}

fn error(status: StatusCode, message: impl Into<String>) -> Response {
    (status, Json(serde_json::json!({"error": message.into()}))).into_response()
}

fn not_found(id: &str) -> Response {
    error(StatusCode::NOT_FOUND, format!("unknown vehicle '{}'", id))
}

fn enqueue(state: &AppState, id: &str, cmd: DriverCommand) -> Response {
    let Some(device) = state.devices.get(id) else {
        return not_found(id);
    };
    match device.commands.send(cmd) {
        Ok(()) => (
            StatusCode::ACCEPTED,
            Json(serde_json::json!({"ok": true})),
        )
            .into_response(),
        Err(_) => error(StatusCode::SERVICE_UNAVAILABLE, "driver is not running"),
    }
}

pub(crate) async fn health() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

pub(crate) async fn list_vehicles(State(state): State<AppState>) -> impl IntoResponse {
    let statuses: Vec<DriverStatus> = state
        .devices
        .values()
        .map(|d| d.status.borrow().as_ref().clone())
        .collect();
    Json(statuses)
}

pub(crate) async fn get_vehicle(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    let Some(device) = state.devices.get(&id) else {
        return not_found(&id);
    };
    let status = device.status.borrow().as_ref().clone();
    Json(serde_json::json!({
        "id": device.id,
        "name": device.name,
        "status": status,
        "capabilities": device.sink.snapshot(),
        "sink": device.sink.stats(),
    }))
    .into_response()
}

pub(crate) async fn get_triggers(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Response {
    match state.devices.get(&id) {
        Some(device) => Json(device.sink.recent_triggers()).into_response(),
        None => not_found(&id),
    }
}

pub(crate) async fn force_poll(State(state): State<AppState>, Path(id): Path<String>) -> Response {
    enqueue(&state, &id, DriverCommand::ForcePoll)
}

pub(crate) async fn set_locked(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<LockBody>,
) -> Response {
    enqueue(&state, &id, DriverCommand::SetLocked(body.locked))
}

pub(crate) async fn set_climate(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<ClimateBody>,
) -> Response {
    if let Some(t) = body.temperature
        && !(MIN_TEMPERATURE_C..=MAX_TEMPERATURE_C).contains(&t)
    {
        return error(
            StatusCode::BAD_REQUEST,
            format!(
                "temperature must be between {} and {}",
                MIN_TEMPERATURE_C, MAX_TEMPERATURE_C
            ),
        );
    }
    enqueue(
        &state,
        &id,
        DriverCommand::SetClimate {
            on: body.on,
            temperature: body.temperature,
        },
    )
}

pub(crate) async fn set_defrost(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(body): Json<DefrostBody>,
) -> Response {
    enqueue(&state, &id, DriverCommand::SetDefrost(body.on))
}

pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/vehicles", get(list_vehicles))
        .route("/api/vehicles/{id}", get(get_vehicle))
        .route("/api/vehicles/{id}/triggers", get(get_triggers))
        .route("/api/vehicles/{id}/poll", post(force_poll))
        .route("/api/vehicles/{id}/lock", post(set_locked))
        .route("/api/vehicles/{id}/climate", post(set_climate))
        .route("/api/vehicles/{id}/defrost", post(set_defrost))
        .with_state(state)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
}

pub async fn serve(state: AppState, host: &str, port: u16) -> anyhow::Result<()> {
    let router = build_router(state);
    let logger = crate::logging::get_logger("web");
    logger.info(&format!(
        "Starting web server; requested host={}, port={}",
        host, port
    ));

    let addr: SocketAddr = match host.parse::<IpAddr>() {
        Ok(ip) => SocketAddr::new(ip, port),
        Err(_) => {
            logger.warn(&format!("Invalid host '{}'; falling back to 127.0.0.1", host));
            ([127, 0, 0, 1], port).into()
        }
    };

    let listener = tokio::net::TcpListener::bind(addr).await?;
    let local_addr = listener.local_addr()?;
    logger.info(&format!(
        "Web server listening at http://{}:{}",
        local_addr.ip(),
        local_addr.port()
    ));

    axum::serve(listener, router).await?;
    Ok(())
}
