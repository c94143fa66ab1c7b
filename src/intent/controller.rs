//! Lifecycle controller: the only writer of intentions.
//!
//! Every mutation goes through [`IntentionStore::update`], so it happens
//! under the intention's lock with a fresh copy, and every status change
//! goes through one transition function that checks the state machine,
//! accumulates time-in-status, journals the change and records telemetry.
//!
//! Model and capability calls never run under the lock: a stage step reads
//! a snapshot, does its slow work, then applies the result in a second
//! `update`. Reinforcement arriving in between is not lost.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::character::character;
use super::journal::{LifecycleEntry, LifecycleEventKind};
use super::lifecycle::can_transition;
use super::strength::{activation_order, apply_decay, apply_reinforcement, is_above_threshold};
use super::types::{Intention, IntentionId, IntentionMetrics, IntentionStatus, RejectionRecord};
use crate::config::AgencyConfig;
use crate::executor::{Execution, ExecutionStatus, Executor};
use crate::kernel::cancel::CancellationRegistry;
use crate::kernel::telemetry::{GateOutcome, TelemetryEvent, TelemetryRecorder, TelemetrySnapshot};
use crate::kernel::time::Tick;
use crate::planner::types::ReviewVerdict;
use crate::planner::{PlanGenerator, PlanReviewer, PlannerError, ReactPlanner};
use crate::policy::{decide_plan, GateDecision};
use crate::review::{OutcomeReview, OutcomeReviewer, OutcomeVerdict};
use crate::services::capability::CapabilityCatalog;
use crate::services::llm::LanguageModel;
use crate::signals::{is_near_duplicate, Signal, SignalAggregator};
use crate::store::{IntentionStore, StoreError};

#[derive(Debug, Error)]
pub enum ControllerError {
    #[error(transparent)]
    Store(#[from] StoreError),
    #[error("intention {id} cannot move from {from} to {to}")]
    InvalidTransition {
        id: IntentionId,
        from: IntentionStatus,
        to: IntentionStatus,
    },
    #[error("intention {id} is {status}, expected {expected}")]
    UnexpectedStatus {
        id: IntentionId,
        status: IntentionStatus,
        expected: IntentionStatus,
    },
    #[error("intention {0} was rejected without permission to retry")]
    NotRetryable(IntentionId),
    #[error("operation cancelled")]
    Cancelled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignalOutcome {
    Created(IntentionId),
    Reinforced(IntentionId),
    /// Source disabled or pending queue full.
    Ignored,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DecaySummary {
    pub decayed: usize,
    pub abandoned: usize,
}

pub struct LifecycleController {
    store: Arc<IntentionStore>,
    config: AgencyConfig,
    catalog: Arc<dyn CapabilityCatalog>,
    generator: PlanGenerator,
    reviewer: PlanReviewer,
    executor: Executor,
    outcome: OutcomeReviewer,
    cancellations: CancellationRegistry,
    in_flight: Mutex<HashSet<IntentionId>>,
    telemetry: Mutex<TelemetryRecorder>,
    tick: AtomicU64,
    last_decay: AtomicU64,
}

/// Clears the in-flight mark when a stage step ends, however it ends.
struct InFlight<'a> {
    set: &'a Mutex<HashSet<IntentionId>>,
    id: IntentionId,
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.set.lock().unwrap_or_else(|e| e.into_inner()).remove(&self.id);
    }
}

impl LifecycleController {
    pub fn new(
        store: Arc<IntentionStore>,
        llm: Arc<dyn LanguageModel>,
        catalog: Arc<dyn CapabilityCatalog>,
        config: AgencyConfig,
    ) -> Self {
        let planner_config = config.planner.clone();
        Self {
            generator: PlanGenerator::new(llm.clone(), planner_config.clone()),
            reviewer: PlanReviewer::new(llm.clone(), planner_config.clone()),
            executor: Executor::new(
                ReactPlanner::new(llm.clone(), planner_config.clone()),
                catalog.clone(),
                config.executor.clone(),
            ),
            outcome: OutcomeReviewer::new(Some(llm), planner_config),
            store,
            catalog,
            cancellations: CancellationRegistry::new(),
            in_flight: Mutex::new(HashSet::new()),
            telemetry: Mutex::new(TelemetryRecorder::new()),
            tick: AtomicU64::new(0),
            last_decay: AtomicU64::new(0),
            config,
        }
    }

    /// Replaces the model-backed outcome reviewer.
    pub fn with_outcome_reviewer(mut self, outcome: OutcomeReviewer) -> Self {
        self.outcome = outcome;
        self
    }

    pub fn store(&self) -> &Arc<IntentionStore> {
        &self.store
    }

    pub fn config(&self) -> &AgencyConfig {
        &self.config
    }

    pub fn set_tick(&self, tick: Tick) {
        self.tick.store(tick.frame, Ordering::Release);
    }

    fn current_tick(&self) -> Tick {
        Tick {
            frame: self.tick.load(Ordering::Acquire),
        }
    }

    pub fn record(&self, event: TelemetryEvent) {
        self.telemetry.lock().unwrap_or_else(|e| e.into_inner()).record(event);
    }

    pub fn telemetry(&self) -> TelemetrySnapshot {
        self.telemetry.lock().unwrap_or_else(|e| e.into_inner()).snapshot()
    }

    fn entry(intention: &Intention, kind: LifecycleEventKind, note: impl Into<String>) -> LifecycleEntry {
        LifecycleEntry::new(kind, intention.status, intention.strength, note)
    }

    /// The one place a status changes.
    fn transition(
        &self,
        intention: &mut Intention,
        entries: &mut Vec<LifecycleEntry>,
        to: IntentionStatus,
        note: &str,
        now: DateTime<Utc>,
    ) -> Result<(), ControllerError> {
        let from = intention.status;
        if !can_transition(from, to) {
            return Err(ControllerError::InvalidTransition {
                id: intention.id,
                from,
                to,
            });
        }

        let metrics = &mut intention.metrics;
        let elapsed = (now - metrics.last_transition_at).num_milliseconds().max(0) as u64;
        *metrics.time_in_status.entry(from).or_insert(0) += elapsed;
        if from.is_active() {
            metrics.active_ms += elapsed;
        } else {
            metrics.idle_ms += elapsed;
        }
        metrics.last_transition_at = now;
        metrics.current_cycle = metrics.cycle_count + 1;

        intention.status = to;
        entries.push(
            Self::entry(intention, LifecycleEventKind::StatusChange, note).with_data(json!({ "from": from, "to": to })),
        );
        info!(intention = %intention.id, %from, %to, note, "intention transition");
        self.record(TelemetryEvent::Transition {
            id: intention.id,
            from,
            to,
            tick: self.current_tick(),
        });
        Ok(())
    }

    fn expect_status(intention: &Intention, expected: IntentionStatus) -> Result<(), ControllerError> {
        if intention.status == expected {
            Ok(())
        } else {
            Err(ControllerError::UnexpectedStatus {
                id: intention.id,
                status: intention.status,
                expected,
            })
        }
    }

    fn new_intention(&self, signal: &Signal, tick: Tick) -> Intention {
        let s = &self.config.strength;
        let strength = signal.strength.unwrap_or(s.initial_strength).clamp(s.min_strength, 1.0);
        let mut intention = Intention::new(signal.source, signal.title.clone());
        intention.description = signal.description.clone();
        intention.reason = signal.reason.clone();
        intention.strength = strength;
        intention.base_weight = self.config.source_weight(signal.source);
        intention.threshold = s.activation_threshold;
        intention.decay_rate = s.decay_rate;
        intention.last_reinforced_tick = Some(tick.frame);
        intention.risk = signal.risk.unwrap_or_default();
        intention.required_trust_level = signal.required_trust.unwrap_or_default();
        intention.metrics = IntentionMetrics::new(strength, intention.created_at);
        intention
    }

    /// Creates an intention from a signal, or reinforces the near-duplicate
    /// that already exists.
    pub async fn ingest_signal(&self, signal: Signal, tick: Tick) -> Result<SignalOutcome, ControllerError> {
        if !self.config.source_enabled(signal.source) {
            debug!(source = signal.source.label(), "signal from disabled source ignored");
            return Ok(SignalOutcome::Ignored);
        }

        let threshold = self.config.strength.duplicate_similarity;
        let existing = self.store.list_non_terminal().await?;
        if let Some(duplicate) = existing.iter().find(|i| is_near_duplicate(&signal, i, threshold)) {
            return self.reinforce(duplicate.id, &signal, tick).await;
        }

        let queued = self.store.count_with_status(IntentionStatus::Pending)
            + self.store.count_with_status(IntentionStatus::Nascent);
        if queued >= self.config.limits.max_pending {
            warn!(queued, limit = self.config.limits.max_pending, "pending limit reached, signal dropped");
            return Ok(SignalOutcome::Ignored);
        }

        let intention = self.new_intention(&signal, tick);
        let id = intention.id;
        self.store.create(&intention).await?;
        self.record(TelemetryEvent::IntentionCreated {
            id,
            source: signal.source,
        });

        let now = Utc::now();
        self.store
            .update(id, |intention, entries| {
                entries.push(
                    Self::entry(intention, LifecycleEventKind::Origin, format!("from {}", intention.source.label()))
                        .with_data(json!({ "source": intention.source, "base_weight": intention.base_weight })),
                );
                self.transition(intention, entries, IntentionStatus::Pending, "strength set", now)
            })
            .await?;
        Ok(SignalOutcome::Created(id))
    }

    async fn reinforce(&self, id: IntentionId, signal: &Signal, tick: Tick) -> Result<SignalOutcome, ControllerError> {
        let boost = signal.strength.unwrap_or(self.config.strength.reinforcement_boost);
        self.store
            .update(id, |intention, entries| {
                let before = intention.strength;
                intention.strength = apply_reinforcement(intention.strength, boost);
                intention.reinforcements += 1;
                intention.last_reinforced_tick = Some(tick.frame);
                intention.metrics.observe_strength(intention.strength);
                entries.push(
                    Self::entry(intention, LifecycleEventKind::Reinforcement, format!("from {}", signal.source.label()))
                        .with_data(json!({ "before": before, "after": intention.strength, "boost": boost })),
                );
                Ok::<_, ControllerError>(())
            })
            .await?;
        self.record(TelemetryEvent::Reinforced { id });
        debug!(intention = %id, boost, "intention reinforced");
        Ok(SignalOutcome::Reinforced(id))
    }

    pub async fn generation_tick(
        &self,
        aggregators: &[Arc<dyn SignalAggregator>],
        tick: Tick,
        cancel: &CancellationToken,
    ) -> Result<Vec<SignalOutcome>, ControllerError> {
        self.set_tick(tick);
        let mut outcomes = Vec::new();
        for aggregator in aggregators {
            for signal in aggregator.gather(cancel).await {
                if cancel.is_cancelled() {
                    return Err(ControllerError::Cancelled);
                }
                outcomes.push(self.ingest_signal(signal, tick).await?);
            }
        }
        Ok(outcomes)
    }

    /// Decays every non-terminal intention not reinforced since the previous
    /// decay run. A pending intention that has faded to the floor is abandoned.
    pub async fn decay_tick(&self, tick: Tick) -> Result<DecaySummary, ControllerError> {
        self.set_tick(tick);
        let since = self.last_decay.swap(tick.frame, Ordering::AcqRel).min(tick.frame.saturating_sub(1));
        let reinforced = |frame: Option<u64>| frame.is_some_and(|f| f > since);
        let min = self.config.strength.min_strength;
        let mut summary = DecaySummary::default();

        for snapshot in self.store.list_non_terminal().await? {
            if reinforced(snapshot.last_reinforced_tick) {
                continue;
            }
            if snapshot.strength <= min && snapshot.status != IntentionStatus::Pending {
                continue;
            }
            let now = Utc::now();
            let (_, (decayed, abandoned)) = self
                .store
                .update(snapshot.id, |intention, entries| {
                    if reinforced(intention.last_reinforced_tick) || intention.status.is_terminal() {
                        return Ok::<_, ControllerError>((false, false));
                    }
                    let before = intention.strength;
                    intention.strength = apply_decay(intention.strength, intention.decay_rate, min);
                    intention.metrics.observe_strength(intention.strength);
                    let decayed = intention.strength < before;
                    if decayed {
                        entries.push(
                            Self::entry(intention, LifecycleEventKind::Decay, "")
                                .with_data(json!({ "before": before, "after": intention.strength })),
                        );
                    }
                    let fade = intention.status == IntentionStatus::Pending && intention.strength <= min;
                    if fade {
                        entries.push(Self::entry(intention, LifecycleEventKind::Abandoned, "faded to minimum strength"));
                        self.transition(intention, entries, IntentionStatus::Abandoned, "faded", now)?;
                    }
                    Ok((decayed, fade))
                })
                .await?;
            summary.decayed += usize::from(decayed);
            summary.abandoned += usize::from(abandoned);
        }
        debug!(tick = tick.frame, decayed = summary.decayed, abandoned = summary.abandoned, "decay tick");
        Ok(summary)
    }

    fn active_count(&self) -> usize {
        IntentionStatus::ALL
            .into_iter()
            .filter(|s| s.is_active())
            .map(|s| self.store.count_with_status(s))
            .sum()
    }

    /// Promotes pending intentions above threshold to `evaluating`, in
    /// activation order, up to the active limit. Returns the promoted ids.
    pub async fn evaluation_tick(&self, tick: Tick) -> Result<Vec<IntentionId>, ControllerError> {
        self.set_tick(tick);
        let mut candidates: Vec<Intention> = self
            .store
            .list_by_status(IntentionStatus::Pending)
            .await?
            .into_iter()
            .filter(is_above_threshold)
            .collect();
        candidates.sort_by(activation_order);

        let capacity = self.config.limits.max_active.saturating_sub(self.active_count());
        let mut promoted = Vec::new();
        for candidate in candidates.into_iter().take(capacity) {
            let now = Utc::now();
            let (_, crossed) = self
                .store
                .update(candidate.id, |intention, entries| {
                    if intention.status != IntentionStatus::Pending || !is_above_threshold(intention) {
                        return Ok::<_, ControllerError>(false);
                    }
                    entries.push(
                        Self::entry(intention, LifecycleEventKind::ThresholdCrossed, "")
                            .with_data(json!({ "effective_strength": intention.effective_strength(), "threshold": intention.threshold })),
                    );
                    self.transition(intention, entries, IntentionStatus::Evaluating, "threshold crossed", now)?;
                    Ok(true)
                })
                .await?;
            if crossed {
                promoted.push(candidate.id);
            }
        }
        Ok(promoted)
    }

    /// Advances every in-progress intention by one stage, strongest first.
    pub async fn progression_tick(&self, cancel: &CancellationToken) -> Result<usize, ControllerError> {
        let mut work = Vec::new();
        for status in [
            IntentionStatus::Evaluating,
            IntentionStatus::Planning,
            IntentionStatus::Reviewing,
            IntentionStatus::Approved,
            IntentionStatus::Executing,
            IntentionStatus::AwaitingReview,
        ] {
            work.extend(self.store.list_by_status(status).await?);
        }
        work.sort_by(activation_order);

        let mut advanced = 0;
        for intention in work {
            if cancel.is_cancelled() {
                return Err(ControllerError::Cancelled);
            }
            match self.advance(intention.id, cancel).await {
                Ok(_) => advanced += 1,
                Err(ControllerError::Cancelled) => return Err(ControllerError::Cancelled),
                Err(e) => warn!(intention = %intention.id, error = %e, "stage step failed"),
            }
        }
        Ok(advanced)
    }

    /// Runs one stage step and returns the resulting status. Statuses that
    /// wait on a signal, a tick or a human are left as they are.
    pub async fn advance(&self, id: IntentionId, cancel: &CancellationToken) -> Result<IntentionStatus, ControllerError> {
        if !self.in_flight.lock().unwrap_or_else(|e| e.into_inner()).insert(id) {
            debug!(intention = %id, "stage step already in flight");
            return self.store.status_of(id).ok_or(ControllerError::Store(StoreError::NotFound(id)));
        }
        let _in_flight = InFlight {
            set: &self.in_flight,
            id,
        };

        let snapshot = self.store.load(id).await?;
        match snapshot.status {
            IntentionStatus::Evaluating => self.evaluate_step(id).await,
            IntentionStatus::Planning => self.plan_step(snapshot, cancel).await,
            IntentionStatus::Reviewing => self.review_step(snapshot, cancel).await,
            IntentionStatus::Approved => self.execute_step(snapshot, cancel).await,
            IntentionStatus::Executing => self.recover_interrupted(id).await,
            IntentionStatus::AwaitingReview => self.outcome_step(snapshot, cancel).await,
            other => Ok(other),
        }
    }

    async fn evaluate_step(&self, id: IntentionId) -> Result<IntentionStatus, ControllerError> {
        let now = Utc::now();
        let (intention, _) = self
            .store
            .update(id, |intention, entries| {
                Self::expect_status(intention, IntentionStatus::Evaluating)?;
                if is_above_threshold(intention) {
                    entries.push(Self::entry(intention, LifecycleEventKind::Evaluation, "still above threshold"));
                    self.transition(intention, entries, IntentionStatus::Planning, "ready to plan", now)
                } else {
                    entries.push(Self::entry(intention, LifecycleEventKind::Evaluation, "fell below threshold"));
                    self.transition(intention, entries, IntentionStatus::Pending, "below threshold", now)
                }
            })
            .await?;
        Ok(intention.status)
    }

    async fn plan_step(&self, snapshot: Intention, cancel: &CancellationToken) -> Result<IntentionStatus, ControllerError> {
        let id = snapshot.id;
        let limit = self.config.limits.max_plan_attempts;
        let now = Utc::now();

        let (snapshot, give_up) = self
            .store
            .update(id, |intention, entries| {
                Self::expect_status(intention, IntentionStatus::Planning)?;
                if intention.metrics.plan_failures >= limit {
                    entries.push(Self::entry(
                        intention,
                        LifecycleEventKind::PlanFailed,
                        format!("no usable plan after {} attempts", intention.metrics.plan_failures),
                    ));
                    self.transition(intention, entries, IntentionStatus::Failed, "planning exhausted", now)?;
                    return Ok(true);
                }
                intention.metrics.plan_attempts += 1;
                entries.push(Self::entry(
                    intention,
                    LifecycleEventKind::PlanRequested,
                    format!("attempt {}", intention.metrics.plan_attempts),
                ));
                Ok::<_, ControllerError>(false)
            })
            .await?;
        if give_up {
            return Ok(snapshot.status);
        }

        let drafted = self.generator.generate(&snapshot, self.catalog.as_ref(), cancel).await;
        let now = Utc::now();
        match drafted {
            Err(PlannerError::Cancelled) => Err(ControllerError::Cancelled),
            Err(e) => {
                warn!(intention = %id, error = %e, "plan generation failed");
                let (intention, _) = self
                    .store
                    .update(id, |intention, entries| {
                        intention.metrics.plan_failures += 1;
                        entries.push(Self::entry(intention, LifecycleEventKind::PlanFailed, e.to_string()));
                        if intention.status == IntentionStatus::Planning && intention.metrics.plan_failures >= limit {
                            self.transition(intention, entries, IntentionStatus::Failed, "planning exhausted", now)?;
                        }
                        Ok::<_, ControllerError>(())
                    })
                    .await?;
                Ok(intention.status)
            }
            Ok(mut plan) => {
                let (intention, _) = self
                    .store
                    .update(id, |intention, entries| {
                        Self::expect_status(intention, IntentionStatus::Planning)?;
                        plan.version = intention.next_plan_version();
                        if let Some(previous) = intention.plan.take() {
                            intention.plan_history.push(previous);
                        }
                        intention.metrics.plan_failures = 0;
                        intention.review = None;
                        intention.plan = Some(plan.clone());
                        entries.push(
                            Self::entry(intention, LifecycleEventKind::PlanCreated, plan.goal.clone()).with_data(json!({
                                "version": plan.version,
                                "steps": plan.steps.len(),
                                "estimated_risk": plan.estimated_risk,
                            })),
                        );
                        self.transition(intention, entries, IntentionStatus::Reviewing, "plan drafted", now)
                    })
                    .await?;
                self.store.save_plan(id, &plan).await?;
                Ok(intention.status)
            }
        }
    }

    async fn review_step(&self, snapshot: Intention, cancel: &CancellationToken) -> Result<IntentionStatus, ControllerError> {
        let id = snapshot.id;
        let Some(plan) = snapshot.plan.clone() else {
            let now = Utc::now();
            let (intention, _) = self
                .store
                .update(id, |intention, entries| {
                    self.transition(intention, entries, IntentionStatus::Planning, "no plan to review", now)
                })
                .await?;
            return Ok(intention.status);
        };

        let review = match self.reviewer.review(&snapshot, &plan, cancel).await {
            Ok(review) => review,
            Err(PlannerError::Cancelled) => return Err(ControllerError::Cancelled),
            Err(e) => {
                warn!(intention = %id, error = %e, "plan review failed");
                return Ok(snapshot.status);
            }
        };
        self.store.save_review(id, &review).await?;

        let revise = review.verdict == ReviewVerdict::Revise
            && snapshot.metrics.plan_revisions < self.config.limits.max_plan_revisions;
        let gate = match review.verdict {
            ReviewVerdict::Reject => None,
            _ if revise => None,
            _ => Some(decide_plan(
                &plan,
                &review,
                snapshot.risk,
                snapshot.required_trust_level,
                self.config.trust_level,
                &self.config.policy,
                self.config.auto_approve_threshold,
            )),
        };

        let now = Utc::now();
        let (intention, _) = self
            .store
            .update(id, |intention, entries| {
                Self::expect_status(intention, IntentionStatus::Reviewing)?;
                intention.review = Some(review.clone());
                entries.push(
                    Self::entry(intention, LifecycleEventKind::PlanReviewed, format!("{:?}", review.verdict))
                        .with_data(json!({
                            "version": review.plan_version,
                            "alignment": review.alignment_score,
                            "concerns": review.concerns,
                        })),
                );

                match (&review.verdict, &gate) {
                    (ReviewVerdict::Reject, _) => {
                        intention.rejection_history.push(RejectionRecord {
                            at: now,
                            reason: format!("plan review rejected: {}", review.concerns.join("; ")),
                            can_retry: true,
                            from: IntentionStatus::Reviewing,
                            by_human: false,
                        });
                        self.transition(intention, entries, IntentionStatus::Rejected, "plan rejected by review", now)
                    }
                    (_, None) => {
                        intention.metrics.plan_revisions += 1;
                        entries.push(Self::entry(
                            intention,
                            LifecycleEventKind::PlanRevised,
                            format!("revision {}", intention.metrics.plan_revisions),
                        ));
                        self.transition(intention, entries, IntentionStatus::Planning, "revision requested", now)
                    }
                    (_, Some(GateDecision::AutoApprove)) => {
                        entries.push(Self::entry(intention, LifecycleEventKind::GateAutoApproved, ""));
                        self.transition(intention, entries, IntentionStatus::Approved, "auto-approved", now)
                    }
                    (_, Some(GateDecision::RequireApproval { reason })) => {
                        intention.needs_attention = true;
                        entries.push(Self::entry(intention, LifecycleEventKind::GateQueued, reason.clone()));
                        self.transition(intention, entries, IntentionStatus::AwaitingApproval, "queued for approval", now)
                    }
                    (_, Some(GateDecision::Block { reason })) => {
                        intention.rejection_history.push(RejectionRecord {
                            at: now,
                            reason: reason.clone(),
                            can_retry: false,
                            from: IntentionStatus::Reviewing,
                            by_human: false,
                        });
                        entries.push(Self::entry(intention, LifecycleEventKind::GateBlocked, reason.clone()));
                        self.transition(intention, entries, IntentionStatus::Rejected, "blocked by policy", now)
                    }
                }
            })
            .await?;

        if let Some(decision) = &gate {
            let outcome = match decision {
                GateDecision::AutoApprove => GateOutcome::AutoApproved,
                GateDecision::RequireApproval { .. } => GateOutcome::Queued,
                GateDecision::Block { .. } => GateOutcome::Blocked,
            };
            info!(intention = %id, decision = ?decision, "gate decision");
            self.record(TelemetryEvent::Gate { id, outcome });
        }
        Ok(intention.status)
    }

    async fn execute_step(&self, snapshot: Intention, cancel: &CancellationToken) -> Result<IntentionStatus, ControllerError> {
        let id = snapshot.id;
        let goal = snapshot
            .plan
            .as_ref()
            .map(|p| p.goal.clone())
            .unwrap_or_else(|| snapshot.title.clone());
        let plan_version = snapshot.plan.as_ref().map(|p| p.version);
        let attempt = snapshot.metrics.execution_attempts + 1;

        let now = Utc::now();
        self.store
            .update(id, |intention, entries| {
                Self::expect_status(intention, IntentionStatus::Approved)?;
                intention.metrics.execution_attempts = attempt;
                intention.run_count += 1;
                intention.needs_attention = false;
                intention.execution = Some(Execution::start(attempt, plan_version, goal.clone()));
                entries.push(Self::entry(
                    intention,
                    LifecycleEventKind::ExecutionStarted,
                    format!("attempt {}", attempt),
                ));
                self.transition(intention, entries, IntentionStatus::Executing, "executing", now)
            })
            .await?;

        let token = self.cancellations.register(id, cancel);
        let execution = self.executor.run(&goal, attempt, plan_version, &token).await;
        self.cancellations.release(id);
        self.store.save_execution_attempt(id, &execution).await?;

        self.record(TelemetryEvent::ExecutionFinished {
            id,
            attempt,
            status: execution.status,
            steps: execution.steps_executed,
            elapsed_ms: execution.elapsed_ms,
            successes: execution.successes,
            failures: execution.failures,
        });
        for _ in &execution.looping_actions {
            self.record(TelemetryEvent::FailureLoop { id });
        }

        let now = Utc::now();
        let (intention, _) = self
            .store
            .update(id, |intention, entries| {
                for result in &execution.step_results {
                    entries.push(
                        Self::entry(intention, LifecycleEventKind::ExecutionStep, result.tool.clone().unwrap_or_default())
                            .with_data(json!({
                                "step": result.step,
                                "success": result.success,
                                "error_kind": result.error.as_ref().map(|e| e.kind),
                            })),
                    );
                }
                for fingerprint in &execution.looping_actions {
                    entries.push(Self::entry(intention, LifecycleEventKind::FailureLoopDetected, fingerprint.clone()));
                }
                entries.push(
                    Self::entry(intention, LifecycleEventKind::ExecutionFinished, format!("{:?}", execution.status))
                        .with_data(json!({
                            "steps": execution.steps_executed,
                            "elapsed_ms": execution.elapsed_ms,
                            "successes": execution.successes,
                            "failures": execution.failures,
                            "termination": execution.termination,
                        })),
                );
                match execution.status {
                    ExecutionStatus::Completed => intention.metrics.successful_executions += 1,
                    ExecutionStatus::Failed => intention.metrics.failed_executions += 1,
                    _ => {}
                }
                intention.execution = Some(execution.clone());
                // A human may have rejected the intention mid-run.
                if intention.status == IntentionStatus::Executing {
                    self.transition(intention, entries, IntentionStatus::AwaitingReview, "execution finished", now)?;
                }
                Ok::<_, ControllerError>(())
            })
            .await?;
        Ok(intention.status)
    }

    /// An intention found in `executing` with nothing running was cut off by
    /// a restart; its attempt is closed as cancelled and reviewed.
    async fn recover_interrupted(&self, id: IntentionId) -> Result<IntentionStatus, ControllerError> {
        if self.cancellations.is_running(id) {
            return Ok(IntentionStatus::Executing);
        }
        let now = Utc::now();
        let (intention, _) = self
            .store
            .update(id, |intention, entries| {
                Self::expect_status(intention, IntentionStatus::Executing)?;
                let attempt = intention.metrics.execution_attempts;
                let mut execution = intention
                    .execution
                    .take()
                    .unwrap_or_else(|| Execution::start(attempt, None, intention.title.clone()));
                if !execution.is_finished() {
                    execution.status = ExecutionStatus::Cancelled;
                    execution.error = Some("execution interrupted".to_string());
                    execution.finished_at = Some(now);
                }
                intention.execution = Some(execution);
                entries.push(Self::entry(intention, LifecycleEventKind::ExecutionFinished, "interrupted"));
                self.transition(intention, entries, IntentionStatus::AwaitingReview, "recovered after interruption", now)
            })
            .await?;
        Ok(intention.status)
    }

    async fn outcome_step(&self, snapshot: Intention, cancel: &CancellationToken) -> Result<IntentionStatus, ControllerError> {
        let id = snapshot.id;
        let Some(execution) = snapshot.execution.clone() else {
            let now = Utc::now();
            let (intention, _) = self
                .store
                .update(id, |intention, entries| {
                    self.transition(intention, entries, IntentionStatus::Planning, "nothing to review", now)
                })
                .await?;
            return Ok(intention.status);
        };

        let review = match self.outcome.review(&snapshot, &execution, cancel).await {
            Ok(review) => review,
            Err(PlannerError::Cancelled) => return Err(ControllerError::Cancelled),
            Err(e) => {
                warn!(intention = %id, error = %e, "outcome review failed");
                return Ok(snapshot.status);
            }
        };
        self.store.save_outcome_review(id, &review).await?;
        self.record(TelemetryEvent::Outcome {
            id,
            verdict: review.verdict,
        });

        let now = Utc::now();
        let (intention, _) = self
            .store
            .update(id, |intention, entries| {
                Self::expect_status(intention, IntentionStatus::AwaitingReview)?;
                self.apply_outcome(intention, entries, &review, now)
            })
            .await?;
        info!(
            intention = %id,
            verdict = ?review.verdict,
            character = ?character(&intention.metrics, &self.config.character),
            "outcome applied"
        );
        Ok(intention.status)
    }

    /// Moves to `OutcomeVerdict::target_status`. A retry past the
    /// execution-attempt limit fails the intention instead.
    fn apply_outcome(
        &self,
        intention: &mut Intention,
        entries: &mut Vec<LifecycleEntry>,
        review: &OutcomeReview,
        now: DateTime<Utc>,
    ) -> Result<(), ControllerError> {
        intention.outcome_review = Some(review.clone());
        entries.push(
            Self::entry(intention, LifecycleEventKind::OutcomeReviewed, format!("{:?}", review.verdict)).with_data(json!({
                "attempt": review.attempt,
                "success_score": review.success_score,
                "lessons": review.lessons,
            })),
        );
        let fulfilled = intention
            .execution
            .as_ref()
            .map(|e| e.status == ExecutionStatus::Completed)
            .unwrap_or(false);

        let exhausted = review.verdict == OutcomeVerdict::Retry
            && intention.metrics.execution_attempts >= self.config.limits.max_execution_attempts;
        let target = if exhausted {
            IntentionStatus::Failed
        } else {
            review.verdict.target_status()
        };

        let note = match review.verdict {
            _ if exhausted => {
                entries.push(Self::entry(
                    intention,
                    LifecycleEventKind::Abandoned,
                    format!("{} execution attempts exhausted", intention.metrics.execution_attempts),
                ));
                "attempts exhausted"
            }
            OutcomeVerdict::Completed => {
                intention.metrics.completion_count += 1;
                entries.push(Self::entry(intention, LifecycleEventKind::Completed, ""));
                "completed"
            }
            OutcomeVerdict::Continue => {
                if fulfilled {
                    intention.metrics.completion_count += 1;
                }
                intention.metrics.cycle_count += 1;
                if let Some(value) = review.strength_override {
                    let floor = self.config.strength.min_strength;
                    intention.strength = intention.strength.max(value.clamp(floor, 1.0));
                    intention.metrics.observe_strength(intention.strength);
                }
                if let Some(plan) = intention.plan.take() {
                    intention.plan_history.push(plan);
                }
                intention.review = None;
                "continue later"
            }
            OutcomeVerdict::Retry => {
                intention.metrics.cycle_count += 1;
                if let Some(plan) = intention.plan.take() {
                    intention.plan_history.push(plan);
                }
                intention.review = None;
                entries.push(Self::entry(
                    intention,
                    LifecycleEventKind::RetryScheduled,
                    format!("cycle {}", intention.metrics.cycle_count),
                ));
                "retry"
            }
            OutcomeVerdict::Escalate => {
                intention.needs_attention = true;
                entries.push(Self::entry(intention, LifecycleEventKind::Escalated, review.lessons.join("; ")));
                "escalated"
            }
            OutcomeVerdict::Abandon => {
                entries.push(Self::entry(intention, LifecycleEventKind::Abandoned, review.lessons.join("; ")));
                "abandoned"
            }
        };
        self.transition(intention, entries, target, note, now)
    }

    pub async fn approve(&self, id: IntentionId) -> Result<Intention, ControllerError> {
        let now = Utc::now();
        let (intention, _) = self
            .store
            .update(id, |intention, entries| {
                Self::expect_status(intention, IntentionStatus::AwaitingApproval)?;
                intention.metrics.user_approvals += 1;
                intention.metrics.user_interactions += 1;
                intention.needs_attention = false;
                entries.push(Self::entry(intention, LifecycleEventKind::HumanApproved, ""));
                self.transition(intention, entries, IntentionStatus::Approved, "approved by human", now)
            })
            .await?;
        Ok(intention)
    }

    /// Human rejection from any live state; stops a running execution.
    pub async fn reject(&self, id: IntentionId, reason: &str, can_retry: bool) -> Result<Intention, ControllerError> {
        let now = Utc::now();
        let (intention, _) = self
            .store
            .update(id, |intention, entries| {
                let from = intention.status;
                if !can_transition(from, IntentionStatus::Rejected) {
                    return Err(ControllerError::InvalidTransition {
                        id,
                        from,
                        to: IntentionStatus::Rejected,
                    });
                }
                intention.rejection_history.push(RejectionRecord {
                    at: now,
                    reason: reason.to_string(),
                    can_retry,
                    from,
                    by_human: true,
                });
                intention.metrics.user_rejections += 1;
                intention.metrics.user_interactions += 1;
                intention.needs_attention = false;
                entries.push(
                    Self::entry(intention, LifecycleEventKind::HumanRejected, reason).with_data(json!({ "can_retry": can_retry })),
                );
                self.transition(intention, entries, IntentionStatus::Rejected, "rejected by human", now)
            })
            .await?;
        if self.cancellations.cancel(id) {
            info!(intention = %id, "running execution cancelled by rejection");
        }
        Ok(intention)
    }

    /// Puts a rejected intention back in the queue when its latest
    /// rejection allows it.
    pub async fn requeue(&self, id: IntentionId) -> Result<Intention, ControllerError> {
        let now = Utc::now();
        let (intention, _) = self
            .store
            .update(id, |intention, entries| {
                Self::expect_status(intention, IntentionStatus::Rejected)?;
                if !intention.latest_rejection().map(|r| r.can_retry).unwrap_or(false) {
                    return Err(ControllerError::NotRetryable(id));
                }
                intention.metrics.user_interactions += 1;
                intention.metrics.plan_failures = 0;
                entries.push(Self::entry(intention, LifecycleEventKind::Requeued, ""));
                self.transition(intention, entries, IntentionStatus::Pending, "requeued", now)
            })
            .await?;
        Ok(intention)
    }

    pub async fn pending_approvals(&self) -> Result<Vec<Intention>, ControllerError> {
        Ok(self.store.list_by_status(IntentionStatus::AwaitingApproval).await?)
    }

    pub async fn cleanup(&self, now: DateTime<Utc>) -> Result<usize, ControllerError> {
        let purged = self.store.purge_expired(&self.config.retention, now).await?;
        if !purged.is_empty() {
            self.record(TelemetryEvent::Purged {
                count: purged.len() as u64,
            });
        }
        Ok(purged.len())
    }
}
