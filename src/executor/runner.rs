use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::errors::ClassifiedError;
use super::failure::FailureTracker;
use super::{Execution, ExecutionStatus, ExecutorConfig, StepResult, Termination};
use crate::planner::observation::{format_observation, ObservationMode};
use crate::planner::react::{PlannerError, ReactPlanner};
use crate::planner::retrieval::match_retrieval;
use crate::planner::types::{PlannerDecision, ScratchpadEntry, ToolCall};
use crate::services::capability::CapabilityCatalog;

/// `None` once the deadline passes.
async fn bounded<F: Future>(deadline: Option<Instant>, fut: F) -> Option<F::Output> {
    match deadline {
        Some(deadline) => tokio::time::timeout_at(deadline, fut).await.ok(),
        None => Some(fut.await),
    }
}

pub struct Executor {
    planner: ReactPlanner,
    catalog: Arc<dyn CapabilityCatalog>,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(planner: ReactPlanner, catalog: Arc<dyn CapabilityCatalog>, config: ExecutorConfig) -> Self {
        Self {
            planner,
            catalog,
            config,
        }
    }

    pub fn config(&self) -> &ExecutorConfig {
        &self.config
    }

    pub fn catalog(&self) -> &Arc<dyn CapabilityCatalog> {
        &self.catalog
    }

    /// Runs one execution attempt. Never returns an error: every way the
    /// loop can end is recorded on the returned [`Execution`].
    pub async fn run(
        &self,
        goal: &str,
        attempt: u32,
        plan_version: Option<u32>,
        cancel: &CancellationToken,
    ) -> Execution {
        let started = Instant::now();
        let mut execution = Execution::start(attempt, plan_version, goal);
        info!(attempt, goal, budget = self.config.step_budget(), "execution started");

        let retrieval = match_retrieval(&self.config.retrieval_rules, goal).filter(|call| self.catalog.contains(&call.tool));
        let termination = match retrieval {
            Some(call) => self.retrieve(&mut execution, call, cancel).await,
            None => self.react_loop(&mut execution, goal, started, cancel).await,
        };

        self.finish(&mut execution, termination, started);
        execution
    }

    async fn retrieve(&self, execution: &mut Execution, call: ToolCall, cancel: &CancellationToken) -> Termination {
        debug!(tool = %call.tool, "goal resolved by retrieval rule");
        execution.current_step = 1;
        execution.steps_executed = 1;
        let outcome = self.catalog.invoke(&call.tool, &call.args, cancel).await;
        if cancel.is_cancelled() {
            return Termination::Cancelled;
        }
        let observation = format_observation(ObservationMode::Verbatim, &call.tool, &outcome);
        self.record_observation(execution, 1, &call, &outcome.error, outcome.success, &observation);
        execution.trace.push(ScratchpadEntry {
            step: 1,
            thought: "Direct data request; answering from a single lookup.".to_string(),
            action: Some(call),
            observation: Some(observation.clone()),
            timestamp: Utc::now(),
        });
        if outcome.success {
            execution.result = Some(observation);
        }
        Termination::Retrieval
    }

    async fn react_loop(
        &self,
        execution: &mut Execution,
        goal: &str,
        started: Instant,
        cancel: &CancellationToken,
    ) -> Termination {
        let budget = self.config.step_budget();
        let deadline = self
            .config
            .wall_clock_budget_secs
            .map(|secs| started + Duration::from_secs(secs));
        let catalog = self.catalog.describe();
        let mut tracker = FailureTracker::new();

        loop {
            if execution.steps_executed >= budget {
                return Termination::StepBudget;
            }
            if cancel.is_cancelled() {
                return Termination::Cancelled;
            }
            let step = execution.steps_executed + 1;
            execution.current_step = step;

            let warnings = tracker.warnings();
            let planned = bounded(
                deadline,
                self.planner.next_step(goal, &execution.trace, &catalog, &warnings, cancel),
            )
            .await;
            let decision = match planned {
                None => return Termination::WallClock,
                Some(Ok(decision)) => decision,
                Some(Err(PlannerError::Cancelled)) => return Termination::Cancelled,
                Some(Err(PlannerError::InvalidOutput { reason, raw })) => {
                    error!(step, %reason, raw = %raw, "planner output invalid twice, giving up");
                    execution.steps_executed = step;
                    execution.error = Some(format!("planning failed: {}", reason));
                    return Termination::PlanningFailed;
                }
                Some(Err(PlannerError::Model(e))) => {
                    warn!(step, error = %e, "planner call failed");
                    execution.steps_executed = step;
                    let classified = ClassifiedError::from_message(e.to_string());
                    let observation = classified.render();
                    execution.failures += 1;
                    execution.step_results.push(StepResult {
                        step,
                        tool: None,
                        success: false,
                        output: None,
                        error: Some(classified),
                        timestamp: Utc::now(),
                    });
                    execution.trace.push(ScratchpadEntry {
                        step,
                        thought: "(no decision: the model call failed)".to_string(),
                        action: None,
                        observation: Some(observation),
                        timestamp: Utc::now(),
                    });
                    if self.should_stop_early(execution) {
                        return Termination::EarlyStop;
                    }
                    continue;
                }
            };
            execution.steps_executed = step;

            match decision {
                PlannerDecision::Thought { thought } => {
                    execution.trace.push(ScratchpadEntry {
                        step,
                        thought,
                        action: None,
                        observation: None,
                        timestamp: Utc::now(),
                    });
                }
                PlannerDecision::FinalAnswer { thought, answer, style } => {
                    debug!(step, ?style, "planner responded");
                    execution.trace.push(ScratchpadEntry {
                        step,
                        thought,
                        action: None,
                        observation: None,
                        timestamp: Utc::now(),
                    });
                    execution.step_results.push(StepResult {
                        step,
                        tool: None,
                        success: true,
                        output: Some(answer.clone()),
                        error: None,
                        timestamp: Utc::now(),
                    });
                    execution.result = Some(answer);
                    return Termination::Responded;
                }
                PlannerDecision::Action { thought, call } => {
                    if let Some(previous) = tracker.terminal_error(&call).cloned() {
                        warn!(
                            step,
                            tool = %call.tool,
                            args = %call.args,
                            kind = previous.kind.code(),
                            "planner repeated a call that cannot succeed, not invoking it"
                        );
                        let observation = format!(
                            "{}\nNot invoked: {} is terminal for this action. Choose a different action.",
                            previous.render(),
                            previous.kind.code()
                        );
                        execution.failures += 1;
                        execution.step_results.push(StepResult {
                            step,
                            tool: Some(call.tool.clone()),
                            success: false,
                            output: None,
                            error: Some(previous),
                            timestamp: Utc::now(),
                        });
                        execution.trace.push(ScratchpadEntry {
                            step,
                            thought,
                            action: Some(call),
                            observation: Some(observation),
                            timestamp: Utc::now(),
                        });
                        if self.should_stop_early(execution) {
                            return Termination::EarlyStop;
                        }
                        continue;
                    }
                    if tracker.is_looping(&call) {
                        warn!(tool = %call.tool, args = %call.args, "planner repeated an action that is already looping");
                    }
                    let invoked = bounded(deadline, self.catalog.invoke(&call.tool, &call.args, cancel)).await;
                    let Some(outcome) = invoked else {
                        execution.trace.push(ScratchpadEntry {
                            step,
                            thought,
                            action: Some(call),
                            observation: Some("wall-clock budget exhausted during the call".to_string()),
                            timestamp: Utc::now(),
                        });
                        return Termination::WallClock;
                    };
                    if cancel.is_cancelled() {
                        return Termination::Cancelled;
                    }

                    let observation = format_observation(self.config.observation_mode, &call.tool, &outcome);
                    let failed = self.record_observation(execution, step, &call, &outcome.error, outcome.success, &observation);
                    if let Some(error) = failed {
                        if error.kind.is_terminal_for_action() {
                            tracker.mark_terminal(&call, error);
                        } else if tracker.record_failure(&call, error.kind) {
                            warn!(tool = %call.tool, args = %call.args, "failure loop detected");
                            execution.looping_actions.push(call.fingerprint());
                        }
                    }
                    execution.trace.push(ScratchpadEntry {
                        step,
                        thought,
                        action: Some(call),
                        observation: Some(observation),
                        timestamp: Utc::now(),
                    });
                    if self.should_stop_early(execution) {
                        return Termination::EarlyStop;
                    }
                }
            }
        }
    }

    /// Tallies one capability observation; returns the classified error on
    /// failure.
    fn record_observation(
        &self,
        execution: &mut Execution,
        step: u32,
        call: &ToolCall,
        error: &Option<String>,
        success: bool,
        observation: &str,
    ) -> Option<ClassifiedError> {
        if success {
            execution.successes += 1;
            execution.step_results.push(StepResult {
                step,
                tool: Some(call.tool.clone()),
                success: true,
                output: Some(observation.to_string()),
                error: None,
                timestamp: Utc::now(),
            });
            return None;
        }
        let classified = ClassifiedError::from_message(
            error.clone().unwrap_or_else(|| format!("{} failed without an error message", call.tool)),
        );
        warn!(
            step,
            tool = %call.tool,
            args = %call.args,
            kind = classified.kind.code(),
            error = %classified.message,
            "capability failed"
        );
        execution.failures += 1;
        execution.step_results.push(StepResult {
            step,
            tool: Some(call.tool.clone()),
            success: false,
            output: None,
            error: Some(classified.clone()),
            timestamp: Utc::now(),
        });
        Some(classified)
    }

    fn should_stop_early(&self, execution: &Execution) -> bool {
        execution.steps_executed >= self.config.early_stop_min_steps
            && execution.successes == 0
            && execution.failures > 0
    }

    fn finish(&self, execution: &mut Execution, termination: Termination, started: Instant) {
        let no_progress = execution.successes == 0 && execution.failures > 0;
        execution.status = match termination {
            Termination::Responded => ExecutionStatus::Completed,
            Termination::Retrieval if execution.successes > 0 => ExecutionStatus::Completed,
            Termination::Retrieval => ExecutionStatus::Failed,
            Termination::StepBudget | Termination::WallClock if no_progress => ExecutionStatus::Failed,
            Termination::StepBudget | Termination::WallClock => ExecutionStatus::InProgress,
            Termination::EarlyStop | Termination::PlanningFailed => ExecutionStatus::Failed,
            Termination::Cancelled => ExecutionStatus::Cancelled,
        };

        match (termination, execution.status) {
            (Termination::StepBudget | Termination::WallClock, ExecutionStatus::InProgress) => {
                let last = execution
                    .step_results
                    .iter()
                    .rev()
                    .find(|r| r.success)
                    .and_then(|r| r.output.clone());
                let mut summary = format!(
                    "Stopped after {} steps without a final answer.",
                    execution.steps_executed
                );
                if let Some(last) = last {
                    summary.push_str(&format!(" Last observation: {}", last));
                }
                execution.result = Some(summary);
            }
            (_, ExecutionStatus::Failed) if execution.error.is_none() => {
                let errors = execution.errors();
                execution.error = Some(if errors.is_empty() {
                    "execution ended without a successful observation".to_string()
                } else {
                    errors.join("\n\n")
                });
            }
            (Termination::Cancelled, _) => execution.error = Some("execution cancelled".to_string()),
            _ => {}
        }

        execution.termination = Some(termination);
        execution.elapsed_ms = started.elapsed().as_millis() as u64;
        execution.finished_at = Some(Utc::now());
        info!(
            attempt = execution.attempt,
            status = ?execution.status,
            termination = ?termination,
            steps = execution.steps_executed,
            elapsed_ms = execution.elapsed_ms,
            successes = execution.successes,
            failures = execution.failures,
            "execution finished"
        );
    }
}
