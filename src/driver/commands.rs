use std::time::Duration;

use super::reconcile::CycleContext;
use super::runtime::{Completion, RemoteCompletion};
use super::{DriverCommand, DriverState, VehicleDriver};
use crate::error::{AutomedonError, Result};
use crate::sink::CapabilitySink;
use crate::units::{MAX_TEMPERATURE_C, MIN_TEMPERATURE_C};
use crate::vehicle::{ClimateOptions, session};

/// Used when neither the command nor the published state has a temperature
pub const DEFAULT_TARGET_TEMPERATURE_C: f64 = 21.0;

/// Whether two remote commands act on the same part of the car; a queued
/// command is superseded by a later one for the same part
fn same_subsystem(a: &DriverCommand, b: &DriverCommand) -> bool {
    use DriverCommand::*;
    matches!(
        (a, b),
        (SetLocked(_), SetLocked(_))
            | (SetClimate { .. } | SetDefrost(_), SetClimate { .. } | SetDefrost(_))
    )
}

impl VehicleDriver {
    pub(crate) async fn handle_command(&mut self, cmd: DriverCommand) {
        match cmd {
            DriverCommand::ForcePoll => {
                self.logger.info("Force poll requested");
                self.start_cycle(true).await;
            }
            DriverCommand::Schedule(minutes) => {
                self.scheduler.schedule(minutes);
                self.logger
                    .info(&format!("Polling every {} minute(s)", minutes.max(1)));
            }
            DriverCommand::StopPolling => {
                self.scheduler.stop();
                self.logger.info("Polling stopped");
            }
            // Handled by the run loop
            DriverCommand::Shutdown => {}
            remote => {
                if self.state.busy {
                    self.defer(remote);
                    return;
                }
                self.start_remote(remote);
            }
        }
    }

    /// Queue a remote command until the vehicle is free. At most one
    /// command per subsystem is kept; the latest wins.
    fn defer(&mut self, cmd: DriverCommand) {
        let before = self.deferred.len();
        self.deferred.retain(|queued| !same_subsystem(queued, &cmd));
        if self.deferred.len() < before {
            self.logger
                .info(&format!("{:?} replaces an earlier pending command", cmd));
        } else {
            self.logger
                .debug(&format!("Deferring {:?} until the vehicle is free", cmd));
        }
        self.deferred.push_back(cmd);
    }

    /// Send a command to the car in the background. The vehicle counts as
    /// busy until it returns, so ticks keep being gated meanwhile.
    fn start_remote(&mut self, command: DriverCommand) {
        self.state.busy = true;
        let ctx = self.cycle_context();
        let generation = self.generation;
        let completions = self.completions_tx.clone();
        tokio::spawn(async move {
            let result = execute_remote(&ctx, &command).await;
            let _ = completions.send(Completion::Remote(RemoteCompletion {
                generation,
                command,
                result,
            }));
        });
    }

    /// Resync once the car had time to settle
    pub(crate) fn finish_remote(&mut self, done: RemoteCompletion) {
        if done.generation != self.generation {
            self.logger.debug(&format!(
                "Ignoring {:?} issued before the last restart",
                done.command
            ));
            return;
        }
        self.state.busy = false;

        match done.result {
            Ok(()) if self.driver_state != DriverState::ShuttingDown => {
                self.logger.info(&format!(
                    "{:?} accepted, resynchronizing in {}s",
                    done.command, self.config.polling.settle_delay_secs
                ));
                self.schedule_resync();
            }
            Ok(()) => {
                self.logger
                    .info(&format!("{:?} accepted during shutdown", done.command));
            }
            Err(e) => {
                self.logger
                    .error(&format!("{:?} failed: {}", done.command, e));
                self.last_error = Some(e.to_string());
            }
        }
    }

    fn schedule_resync(&self) {
        let tx = self.commands_tx.clone();
        let delay = Duration::from_secs(self.config.polling.settle_delay_secs);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = tx.send(DriverCommand::ForcePoll);
        });
    }
}

async fn execute_remote(ctx: &CycleContext, cmd: &DriverCommand) -> Result<()> {
    session::connect(ctx.api.as_ref(), ctx.session_timeout).await?;
    match cmd {
        DriverCommand::SetLocked(true) => ctx.api.lock().await,
        DriverCommand::SetLocked(false) => ctx.api.unlock().await,
        DriverCommand::SetClimate {
            on: true,
            temperature,
        } => {
            let temperature = target_temperature(ctx.sink.as_ref(), *temperature).await;
            ctx.api.start(ClimateOptions::climate(temperature)).await
        }
        DriverCommand::SetDefrost(true) => {
            let temperature = target_temperature(ctx.sink.as_ref(), None).await;
            ctx.api.start(ClimateOptions::defrost(temperature)).await
        }
        DriverCommand::SetClimate { on: false, .. } | DriverCommand::SetDefrost(false) => {
            ctx.api.stop().await
        }
        other => Err(AutomedonError::generic(format!(
            "{:?} is not a vehicle command",
            other
        ))),
    }
}

async fn target_temperature(sink: &dyn CapabilitySink, requested: Option<f64>) -> f64 {
    let temperature = match requested {
        Some(t) => t,
        None => sink
            .capability("target_temperature")
            .await
            .and_then(|v| v.as_f64())
            .unwrap_or(DEFAULT_TARGET_TEMPERATURE_C),
    };
    temperature.clamp(MIN_TEMPERATURE_C, MAX_TEMPERATURE_C)
}
