use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};

use super::reconcile::{CycleContext, CycleOutcome, run_cycle};
use super::types::{DriverCommand, DriverState, DriverStatus, PollState, Thresholds};
use super::watchdog::{CycleGate, PollScheduler};
use super::{Collaborators, CycleStats, VehicleDriver};
use crate::config::VehicleConfig;
use crate::error::Result;
use crate::logging::{LogContext, get_logger_with_context};
use crate::vehicle::session;

/// Result of a spawned cycle, sent back to the driver loop
pub(crate) struct CycleCompletion {
    generation: u64,
    state: PollState,
    result: Result<CycleOutcome>,
    elapsed: Duration,
}

/// Result of a spawned remote command
pub(crate) struct RemoteCompletion {
    pub(crate) generation: u64,
    pub(crate) command: DriverCommand,
    pub(crate) result: Result<()>,
}

/// Background work that held the vehicle busy
pub(crate) enum Completion {
    Cycle(CycleCompletion),
    Remote(RemoteCompletion),
}

impl Completion {
    fn generation(&self) -> u64 {
        match self {
            Completion::Cycle(done) => done.generation,
            Completion::Remote(done) => done.generation,
        }
    }
}

impl VehicleDriver {
    /// Create a new driver instance
    pub fn new(
        config: VehicleConfig,
        collaborators: Collaborators,
        commands_rx: mpsc::UnboundedReceiver<DriverCommand>,
        commands_tx: mpsc::UnboundedSender<DriverCommand>,
    ) -> Result<Self> {
        let logger = get_logger_with_context(LogContext::new("driver").with_device_id(&config.id));
        logger.info(&format!("Initializing driver for {}", config.name));

        let api = collaborators.factory.create(&config)?;
        let (completions_tx, completions_rx) = mpsc::unbounded_channel();

        let mut driver = Self {
            thresholds: Thresholds::from(&config),
            state: PollState::new(config.polling.watchdog_budget),
            config,
            factory: collaborators.factory,
            api,
            sink: collaborators.sink,
            forwarder: collaborators.forwarder,
            geocoder: collaborators.geocoder,
            scheduler: PollScheduler::new(),
            generation: 0,
            driver_state: DriverState::Initializing,
            stats: CycleStats::default(),
            last_error: None,
            last_cycle_ms: None,
            deferred: VecDeque::new(),
            logger,
            commands_rx,
            commands_tx,
            completions_tx,
            completions_rx,
            status_tx: watch::channel(Arc::new(DriverStatus::placeholder())).0,
        };
        driver.publish_status();
        Ok(driver)
    }

    /// Receive status updates; the current value is available immediately
    pub fn subscribe_status(&self) -> watch::Receiver<Arc<DriverStatus>> {
        self.status_tx.subscribe()
    }

    pub fn poll_state(&self) -> &PollState {
        &self.state
    }

    /// Run the driver main loop until `Shutdown` or until every command
    /// sender is gone
    pub async fn run(&mut self) -> Result<()> {
        self.logger.info("Starting vehicle driver main loop");
        self.driver_state = DriverState::Running;
        self.scheduler.schedule(self.config.polling.interval_minutes);
        self.publish_status();

        loop {
            tokio::select! {
                _ = self.scheduler.tick() => {
                    self.start_cycle(false).await;
                }
                Some(done) = self.completions_rx.recv() => {
                    self.finish(done);
                    self.run_deferred().await;
                }
                cmd = self.commands_rx.recv() => {
                    match cmd {
                        Some(DriverCommand::Shutdown) | None => {
                            self.logger.info("Shutdown signal received");
                            break;
                        }
                        Some(cmd) => self.handle_command(cmd).await,
                    }
                }
            }
            self.publish_status();
        }

        // Shutdown sequence
        self.driver_state = DriverState::ShuttingDown;
        self.scheduler.stop();
        self.publish_status();
        if self.state.busy {
            self.logger.info("Waiting for the running cycle or command to finish");
            while let Some(done) = self.completions_rx.recv().await {
                let current = done.generation() == self.generation;
                self.finish(done);
                if current {
                    break;
                }
            }
        }
        if !self.deferred.is_empty() {
            self.logger.warn(&format!(
                "Dropping {} pending command(s) on shutdown",
                self.deferred.len()
            ));
        }
        self.publish_status();
        self.logger.info("Vehicle driver stopped");
        Ok(())
    }

    fn finish(&mut self, done: Completion) {
        match done {
            Completion::Cycle(done) => self.finish_cycle(done),
            Completion::Remote(done) => self.finish_remote(done),
        }
    }

    pub(crate) fn session_timeout(&self) -> Duration {
        Duration::from_secs(self.config.polling.session_timeout_secs.max(1))
    }

    pub(crate) fn cycle_context(&self) -> CycleContext {
        CycleContext {
            device_id: self.config.id.clone(),
            api: self.api.clone(),
            sink: self.sink.clone(),
            forwarder: self.forwarder.clone(),
            geocoder: self.geocoder.clone(),
            thresholds: self.thresholds.clone(),
            session_timeout: self.session_timeout(),
            logger: self.logger.clone(),
        }
    }

    /// Gate and, when allowed, spawn one cycle
    pub(crate) async fn start_cycle(&mut self, force: bool) -> CycleGate {
        let gate = if force {
            self.state.gate_forced()
        } else {
            self.state.gate()
        };

        match gate {
            CycleGate::Restart => self.restart().await,
            CycleGate::Skip if force => {
                self.logger
                    .debug("Force poll dropped, a cycle is already running");
            }
            CycleGate::Skip => {
                self.stats.skipped_ticks = self.stats.skipped_ticks.saturating_add(1);
                self.logger.warn(&format!(
                    "Previous cycle still running, skipping tick ({} left before restart)",
                    self.state.watchdog_counter
                ));
            }
            CycleGate::Proceed => {
                let ctx = self.cycle_context();
                let mut state = self.state.clone();
                let generation = self.generation;
                let completions = self.completions_tx.clone();
                tokio::spawn(async move {
                    let started = tokio::time::Instant::now();
                    let result = run_cycle(&ctx, &mut state, force, Utc::now()).await;
                    let _ = completions.send(Completion::Cycle(CycleCompletion {
                        generation,
                        state,
                        result,
                        elapsed: started.elapsed(),
                    }));
                });
            }
        }
        gate
    }

    pub(crate) fn finish_cycle(&mut self, done: CycleCompletion) {
        if done.generation != self.generation {
            self.logger
                .debug("Discarding result of a cycle started before the last restart");
            return;
        }

        self.stats.total_cycles = self.stats.total_cycles.saturating_add(1);
        self.last_cycle_ms = Some(done.elapsed.as_millis() as u64);

        // Only a successful cycle commits what it fetched
        match done.result {
            Ok(outcome) => {
                self.state.absorb(done.state);
                self.state.record_success();
                self.last_error = None;
                self.logger.info(&format!(
                    "Cycle complete: live={} new_status={} active={} triggers={}",
                    outcome.live_data,
                    outcome.new_status,
                    outcome.active,
                    outcome.triggers.len()
                ));
            }
            Err(e) => {
                self.state.record_failure();
                self.stats.failed_cycles = self.stats.failed_cycles.saturating_add(1);
                self.logger.error(&format!(
                    "Poll cycle failed ({} left before restart): {}",
                    self.state.watchdog_counter, e
                ));
                self.last_error = Some(e.to_string());
            }
        }
    }

    /// Tear down the session and start over with a full watchdog budget
    pub(crate) async fn restart(&mut self) {
        self.logger
            .warn("Watchdog exhausted, restarting vehicle session");
        self.driver_state = DriverState::Restarting;
        self.publish_status();
        self.generation = self.generation.wrapping_add(1);
        self.stats.restarts = self.stats.restarts.saturating_add(1);

        match self.factory.create(&self.config) {
            Ok(api) => {
                self.api = api;
                match session::connect(self.api.as_ref(), self.session_timeout()).await {
                    Ok(vehicles) => self.logger.info(&format!(
                        "Session re-established, {} vehicle(s) on account",
                        vehicles.len()
                    )),
                    Err(e) => self.logger.warn(&format!(
                        "Session restart failed, retrying on the next tick: {}",
                        e
                    )),
                }
            }
            Err(e) => {
                self.logger
                    .error(&format!("Failed to create vehicle session: {}", e));
                self.last_error = Some(e.to_string());
            }
        }

        self.state.reset();
        self.scheduler.rearm();
        self.driver_state = DriverState::Running;
    }

    async fn run_deferred(&mut self) {
        while !self.state.busy
            && let Some(cmd) = self.deferred.pop_front()
        {
            self.handle_command(cmd).await;
        }
    }

    fn build_status(&self) -> DriverStatus {
        DriverStatus {
            timestamp: Utc::now().to_rfc3339(),
            device_id: self.config.id.clone(),
            name: self.config.name.clone(),
            driver_state: self.driver_state.as_str().to_string(),
            busy: self.state.busy,
            watchdog_counter: self.state.watchdog_counter,
            watchdog_budget: self.state.watchdog_budget(),
            polling_armed: self.scheduler.is_armed(),
            poll_interval_minutes: self.scheduler.minutes(),
            last_refresh: self.state.last_refresh.map(|t| t.to_rfc3339()),
            last_active: self.state.last_active.map(|t| t.to_rfc3339()),
            live_data_mode: self.state.live_data_mode,
            has_snapshot: self.state.snapshot.is_some(),
            total_cycles: self.stats.total_cycles,
            failed_cycles: self.stats.failed_cycles,
            skipped_ticks: self.stats.skipped_ticks,
            restarts: self.stats.restarts,
            last_cycle_ms: self.last_cycle_ms,
            last_error: self.last_error.clone(),
        }
    }

    pub(crate) fn publish_status(&self) {
        self.status_tx.send_replace(Arc::new(self.build_status()));
    }
}

impl DriverStatus {
    fn placeholder() -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            device_id: String::new(),
            name: String::new(),
            driver_state: DriverState::Initializing.as_str().to_string(),
            busy: false,
            watchdog_counter: 0,
            watchdog_budget: 0,
            polling_armed: false,
            poll_interval_minutes: None,
            last_refresh: None,
            last_active: None,
            live_data_mode: false,
            has_snapshot: false,
            total_cycles: 0,
            failed_cycles: 0,
            skipped_ticks: 0,
            restarts: 0,
            last_cycle_ms: None,
            last_error: None,
        }
    }
}
