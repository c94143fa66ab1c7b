use std::sync::Arc;

use chrono::Utc;
use tokio::task::JoinHandle;
use tokio::time::{interval, Duration, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::scheduler::{SchedulerContext, TickGate, TickKind};
use super::telemetry::TelemetryEvent;
use crate::intent::controller::{ControllerError, LifecycleController};
use crate::signals::SignalAggregator;

/// Drives the intention pipeline from a fixed pulse.
///
/// **Ordering**: within one pulse, generation runs before decay and decay
/// before evaluation, so a signal that reinforces an intention is counted
/// before the intention is judged against its threshold.
///
/// Progression is the only long-running kind. It runs on its own task
/// behind the [`TickGate`]; a pulse that finds it still running drops it.
pub struct Reactor {
    controller: Arc<LifecycleController>,
    aggregators: Vec<Arc<dyn SignalAggregator>>,
    context: SchedulerContext,
    gate: Arc<TickGate>,
    progression: Option<JoinHandle<()>>,
}

impl Reactor {
    pub fn new(controller: Arc<LifecycleController>, aggregators: Vec<Arc<dyn SignalAggregator>>) -> Self {
        let context = SchedulerContext::new(&controller.config().schedule);
        Self {
            controller,
            aggregators,
            context,
            gate: TickGate::new(),
            progression: None,
        }
    }

    pub fn context(&self) -> &SchedulerContext {
        &self.context
    }

    pub fn gate(&self) -> &Arc<TickGate> {
        &self.gate
    }

    /// One scheduler pulse: advances the tick and runs every due kind.
    pub async fn pulse(&mut self, cancel: &CancellationToken) -> Result<(), ControllerError> {
        let tick = self.context.advance(Utc::now());
        self.controller.set_tick(tick);

        for kind in self.context.due_kinds() {
            if cancel.is_cancelled() {
                return Err(ControllerError::Cancelled);
            }
            let Some(guard) = self.gate.try_enter(kind) else {
                debug!(?kind, tick = tick.frame, "tick still running, dropped");
                self.controller.record(TelemetryEvent::TickDropped { kind });
                continue;
            };
            self.context.mark_run(kind);

            match kind {
                TickKind::Generation => {
                    let outcomes = self.controller.generation_tick(&self.aggregators, tick, cancel).await?;
                    if !outcomes.is_empty() {
                        debug!(tick = tick.frame, signals = outcomes.len(), "signals ingested");
                    }
                }
                TickKind::Decay => {
                    self.controller.decay_tick(tick).await?;
                }
                TickKind::Evaluation => {
                    let promoted = self.controller.evaluation_tick(tick).await?;
                    if !promoted.is_empty() {
                        info!(tick = tick.frame, count = promoted.len(), "intentions activated");
                    }
                }
                TickKind::Progression => {
                    let controller = self.controller.clone();
                    let cancel = cancel.clone();
                    self.progression = Some(tokio::spawn(async move {
                        let _guard = guard;
                        match controller.progression_tick(&cancel).await {
                            Ok(advanced) if advanced > 0 => debug!(advanced, "progression tick"),
                            Ok(_) => {}
                            Err(ControllerError::Cancelled) => debug!("progression cancelled"),
                            Err(e) => warn!(error = %e, "progression tick failed"),
                        }
                    }));
                    continue;
                }
                TickKind::Cleanup => {
                    self.controller.cleanup(self.context.now).await?;
                }
            }
            drop(guard);
        }
        Ok(())
    }

    /// Async driver loop. Returns when `cancel` fires, after the running
    /// progression task has observed the cancellation.
    pub async fn run(&mut self, cancel: CancellationToken) {
        let pulse_ms = self.controller.config().schedule.pulse_ms;
        info!(pulse_ms, "reactor started");

        let mut cadence = interval(Duration::from_millis(pulse_ms));
        cadence.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                _ = cadence.tick() => {}
            }
            match self.pulse(&cancel).await {
                Ok(()) => {}
                Err(ControllerError::Cancelled) => break,
                Err(e) => warn!(tick = self.context.tick.frame, error = %e, "pulse failed"),
            }
        }

        if let Some(handle) = self.progression.take() {
            if let Err(e) = handle.await {
                warn!(error = %e, "progression task ended abnormally");
            }
        }
        info!(tick = self.context.tick.frame, "reactor stopped");
    }
}
