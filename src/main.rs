use anyhow::Result;
use automedon::config::Config;
use automedon::driver::{Collaborators, DriverCommand, VehicleDriver};
use automedon::geocode::CoordinateGeocoder;
use automedon::persistence::PersistenceManager;
use automedon::sink::MemorySink;
use automedon::telemetry::{HttpForwarder, TelemetryForwarder};
use automedon::vehicle::GatewayFactory;
use automedon::web::{AppState, DeviceHandle};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> Result<()> {
    let config = Config::load().map_err(|e| {
        eprintln!("Failed to load configuration: {}", e);
        e
    })?;
    config.validate()?;
    automedon::logging::init_logging(&config.logging)?;

    info!("Automedon {} starting up", env!("APP_VERSION"));
    if config.vehicles.is_empty() {
        warn!("No vehicles configured; only the web server will run");
    }

    // Restore the last published capabilities (best-effort)
    let mut persistence = PersistenceManager::new(&config.persistence.state_file);
    if let Err(e) = persistence.load() {
        warn!("Ignoring unreadable state file: {}", e);
    }

    let factory = Arc::new(GatewayFactory::new(config.gateway.clone()));
    let geocoder = Arc::new(CoordinateGeocoder);

    let mut handles = Vec::new();
    let mut drivers = Vec::new();
    for vehicle in &config.vehicles {
        let sink = Arc::new(MemorySink::new(&vehicle.id));
        if let Some(view) = persistence.device_view(&vehicle.id) {
            sink.restore(view.clone());
        }

        let forwarder: Option<Arc<dyn TelemetryForwarder>> = match vehicle
            .live_telemetry_token
            .as_deref()
            .filter(|t| !t.trim().is_empty())
        {
            Some(token) => match HttpForwarder::new(&config.telemetry, token, &vehicle.id) {
                Ok(forwarder) => Some(Arc::new(forwarder)),
                Err(e) => {
                    warn!("Live telemetry disabled for {}: {}", vehicle.id, e);
                    None
                }
            },
            None => None,
        };

        let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<DriverCommand>();
        let collaborators = Collaborators {
            factory: factory.clone(),
            sink: sink.clone(),
            forwarder,
            geocoder: geocoder.clone(),
        };
        let mut driver = match VehicleDriver::new(vehicle.clone(), collaborators, cmd_rx, cmd_tx.clone()) {
            Ok(driver) => driver,
            Err(e) => {
                error!("Failed to create driver for {}: {}", vehicle.id, e);
                continue;
            }
        };

        handles.push(DeviceHandle {
            id: vehicle.id.clone(),
            name: vehicle.name.clone(),
            commands: cmd_tx.clone(),
            status: driver.subscribe_status(),
            sink: sink.clone(),
        });
        let task = tokio::spawn(async move { driver.run().await });
        drivers.push((vehicle.id.clone(), cmd_tx, sink, task));
    }

    let web_task = if config.web.enabled {
        let state = AppState::new(handles);
        let host = config.web.host.clone();
        let port = config.web.port;
        Some(tokio::spawn(async move {
            if let Err(e) = automedon::web::serve(state, &host, port).await {
                error!("Web server error: {}", e);
            }
        }))
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutdown requested");

    for (_, commands, _, _) in &drivers {
        let _ = commands.send(DriverCommand::Shutdown);
    }
    for (id, _, sink, task) in drivers {
        match task.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Driver {} failed: {}", id, e),
            Err(e) => error!("Driver {} task panicked: {}", id, e),
        }
        persistence.set_device_view(&id, sink.snapshot());
    }
    if let Err(e) = persistence.save() {
        error!("Failed to save state: {}", e);
    }

    if let Some(task) = web_task {
        task.abort();
    }
    info!("Shutdown complete");
    Ok(())
}
