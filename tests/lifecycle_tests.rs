use std::sync::Arc;

use tempfile::TempDir;
use tokio_util::sync::CancellationToken;
use volition::config::AgencyConfig;
use volition::executor::{Execution, ExecutionStatus};
use volition::intent::journal::LifecycleEventKind;
use volition::intent::lifecycle::can_transition;
use volition::intent::types::{Intention, IntentionSource, IntentionStatus, RiskLevel};
use volition::intent::{ControllerError, LifecycleController, SignalOutcome};
use volition::kernel::time::Tick;
use volition::planner::types::Plan;
use volition::planner::PlannerConfig;
use volition::review::OutcomeReviewer;
use volition::services::capability::CapabilityRegistry;
use volition::services::llm::{LanguageModel, ScriptedModel};
use volition::signals::Signal;
use volition::store::IntentionStore;

const PLAN: &str = r#"{"goal": "tell the time", "steps": [{"action": "check the clock", "capability": "time_now", "risk": "none"}]}"#;
const APPROVE: &str = r#"{"verdict": "approve", "concerns": [], "suggestions": [], "alignment_score": 0.9}"#;
const CLOCK: &str = r#"{"thought": "check the clock", "action": {"tool": "time_now", "args": {}}}"#;
const ANSWER: &str = r#"{"thought": "done", "respond": true, "response": "It is late."}"#;
const COMPLETED: &str = r#"{"verdict": "completed", "success_score": 0.95, "lessons": ["the clock works"]}"#;

struct Harness {
    _dir: TempDir,
    model: Arc<ScriptedModel>,
    controller: LifecycleController,
}

async fn harness(replies: &[&str], config: AgencyConfig) -> Harness {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(IntentionStore::open(dir.path()).await.unwrap());
    let model = Arc::new(ScriptedModel::new(replies.iter().copied()));
    let controller = LifecycleController::new(
        store,
        model.clone() as Arc<dyn LanguageModel>,
        Arc::new(CapabilityRegistry::with_builtins()),
        config,
    );
    Harness {
        _dir: dir,
        model,
        controller,
    }
}

fn heuristic_outcomes(controller: LifecycleController) -> LifecycleController {
    controller.with_outcome_reviewer(OutcomeReviewer::new(None, PlannerConfig::default()))
}

fn strong(title: &str) -> Signal {
    Signal::new(IntentionSource::PersonaGoal, title).with_strength(1.0)
}

/// An intention parked in `awaiting_review` after a finished attempt.
fn reviewed_intention(status: ExecutionStatus, cycle_count: u32, attempts: u32) -> Intention {
    let mut intention = Intention::new(IntentionSource::Task, "tidy the downloads folder");
    intention.status = IntentionStatus::AwaitingReview;
    intention.strength = 0.8;
    intention.metrics.cycle_count = cycle_count;
    intention.metrics.execution_attempts = attempts;
    intention.plan = Some(Plan::new(1, "tidy the downloads folder".to_string(), Vec::new(), intention.required_trust_level));
    let mut execution = Execution::start(attempts, Some(1), "tidy the downloads folder");
    execution.status = status;
    execution.steps_executed = 3;
    execution.successes = u32::from(status == ExecutionStatus::InProgress);
    execution.finished_at = Some(chrono::Utc::now());
    intention.execution = Some(execution);
    intention
}

#[test]
fn test_transition_table() {
    use IntentionStatus::*;
    assert!(can_transition(Nascent, Pending));
    assert!(can_transition(AwaitingReview, Planning));
    assert!(can_transition(Executing, Rejected), "humans can reject a running intention");
    assert!(!can_transition(Pending, Executing));
    assert!(!can_transition(Completed, Pending), "terminal states never move");
    assert!(!can_transition(Rejected, Rejected));
    for status in IntentionStatus::ALL {
        if !status.is_terminal() && status != Rejected {
            assert!(can_transition(status, Rejected));
        }
    }
}

#[tokio::test]
async fn test_end_to_end_completion() {
    let h = harness(&[PLAN, APPROVE, CLOCK, ANSWER, COMPLETED], AgencyConfig::default()).await;
    let cancel = CancellationToken::new();
    let c = &h.controller;

    let SignalOutcome::Created(id) = c.ingest_signal(strong("Tell the time"), Tick { frame: 1 }).await.unwrap() else {
        panic!("expected a new intention");
    };
    assert_eq!(c.store().status_of(id), Some(IntentionStatus::Pending));

    assert_eq!(c.evaluation_tick(Tick { frame: 1 }).await.unwrap(), vec![id]);
    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::Planning);
    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::Reviewing);
    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::Approved);
    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::AwaitingReview);
    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::Completed);
    assert_eq!(h.model.remaining(), 0, "every scripted reply was used");

    let intention = c.store().load(id).await.unwrap();
    assert_eq!(intention.metrics.completion_count, 1);
    assert_eq!(intention.metrics.successful_executions, 1);
    assert_eq!(intention.run_count, 1);
    assert_eq!(intention.plan.as_ref().map(|p| p.version), Some(1));
    assert_eq!(intention.execution.as_ref().map(|e| e.status), Some(ExecutionStatus::Completed));
    assert!(intention.metrics.time_in_status.contains_key(&IntentionStatus::Pending));

    let folder = c.store().root().join("completed").join(id.to_string());
    assert!(folder.join("manifest.json").exists());
    assert!(folder.join("plans/v1.json").exists());
    assert!(folder.join("reviews/plan-v1.json").exists());
    assert!(folder.join("reviews/outcome-v1.json").exists());
    assert!(folder.join("executions/attempt-001.json").exists());

    let journal = c.store().read_scratchpad(id).await.unwrap();
    assert_eq!(journal.first().map(|e| e.kind), Some(LifecycleEventKind::Origin));
    let kinds: Vec<_> = journal.iter().map(|e| e.kind).collect();
    for expected in [
        LifecycleEventKind::ThresholdCrossed,
        LifecycleEventKind::PlanCreated,
        LifecycleEventKind::GateAutoApproved,
        LifecycleEventKind::ExecutionStep,
        LifecycleEventKind::OutcomeReviewed,
        LifecycleEventKind::Completed,
    ] {
        assert!(kinds.contains(&expected), "missing {:?}", expected);
    }

    let snapshot = c.telemetry();
    assert_eq!(snapshot.intention_stats.created, 1);
    assert_eq!(snapshot.gate_stats.auto_approved, 1);
    assert_eq!(snapshot.execution_stats.completed, 1);
    assert_eq!(snapshot.outcome_stats.completed, 1);
}

#[tokio::test]
async fn test_retry_loops_back_to_planning() {
    let h = harness(&[PLAN], AgencyConfig::default()).await;
    let c = heuristic_outcomes(h.controller);
    let cancel = CancellationToken::new();

    let intention = reviewed_intention(ExecutionStatus::Failed, 2, 1);
    let id = intention.id;
    c.store().create(&intention).await.unwrap();

    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::Planning);
    let after = c.store().load(id).await.unwrap();
    assert_eq!(after.metrics.cycle_count, 3);
    assert!(after.plan.is_none());
    assert_eq!(after.plan_history.len(), 1);
    assert_eq!(after.plan_history[0].version, 1);

    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::Reviewing);
    let replanned = c.store().load(id).await.unwrap();
    assert_eq!(replanned.plan.as_ref().map(|p| p.version), Some(2), "new plan is one past the old one");
}

#[tokio::test]
async fn test_retry_past_attempt_limit_fails() {
    let h = harness(&[], AgencyConfig::default()).await;
    let c = heuristic_outcomes(h.controller);

    let intention = reviewed_intention(ExecutionStatus::Failed, 2, 3);
    let id = intention.id;
    c.store().create(&intention).await.unwrap();

    assert_eq!(c.advance(id, &CancellationToken::new()).await.unwrap(), IntentionStatus::Failed);
}

#[tokio::test]
async fn test_partial_execution_continues_later() {
    let h = harness(&[], AgencyConfig::default()).await;
    let c = heuristic_outcomes(h.controller);

    let intention = reviewed_intention(ExecutionStatus::InProgress, 0, 1);
    let id = intention.id;
    c.store().create(&intention).await.unwrap();

    assert_eq!(c.advance(id, &CancellationToken::new()).await.unwrap(), IntentionStatus::Pending);
    let after = c.store().load(id).await.unwrap();
    assert_eq!(after.metrics.cycle_count, 1);
    assert_eq!(after.metrics.completion_count, 0, "a partial run is not a completion");
    assert_eq!(after.plan_history.len(), 1);
    assert!(after.outcome_review.is_some());
}

#[tokio::test]
async fn test_escalate_waits_for_attention() {
    let h = harness(
        &[r#"{"verdict": "escalate", "success_score": 0.2, "lessons": ["the folder is shared"]}"#],
        AgencyConfig::default(),
    )
    .await;
    let c = &h.controller;

    let intention = reviewed_intention(ExecutionStatus::Failed, 0, 1);
    let id = intention.id;
    c.store().create(&intention).await.unwrap();

    assert_eq!(c.advance(id, &CancellationToken::new()).await.unwrap(), IntentionStatus::AwaitingApproval);
    let after = c.store().load(id).await.unwrap();
    assert!(after.needs_attention, "escalation flags the intention for a human");
    let journal = c.store().read_scratchpad(id).await.unwrap();
    assert!(journal.iter().any(|e| e.kind == LifecycleEventKind::Escalated));
}

#[tokio::test]
async fn test_abandon_verdict_abandons() {
    let h = harness(
        &[r#"{"verdict": "abandon", "success_score": 0.0, "lessons": ["nothing to tidy"]}"#],
        AgencyConfig::default(),
    )
    .await;
    let c = &h.controller;

    let intention = reviewed_intention(ExecutionStatus::Completed, 0, 1);
    let id = intention.id;
    c.store().create(&intention).await.unwrap();

    assert_eq!(c.advance(id, &CancellationToken::new()).await.unwrap(), IntentionStatus::Abandoned);
    let after = c.store().load(id).await.unwrap();
    assert_eq!(after.status, IntentionStatus::Abandoned);
    assert!(!after.needs_attention);
    assert_eq!(after.metrics.completion_count, 0);
}

#[tokio::test]
async fn test_strength_override_only_raises() {
    let h = harness(
        &[
            r#"{"verdict": "continue", "success_score": 0.5, "strength_override": 0.95}"#,
            r#"{"verdict": "continue", "success_score": 0.5, "strength_override": 0.3}"#,
        ],
        AgencyConfig::default(),
    )
    .await;
    let c = &h.controller;
    let cancel = CancellationToken::new();

    let raised = reviewed_intention(ExecutionStatus::InProgress, 0, 1);
    c.store().create(&raised).await.unwrap();
    assert_eq!(c.advance(raised.id, &cancel).await.unwrap(), IntentionStatus::Pending);
    let after = c.store().load(raised.id).await.unwrap();
    assert!((after.strength - 0.95).abs() < 1e-6, "override above the current strength is applied");

    let kept = reviewed_intention(ExecutionStatus::InProgress, 0, 1);
    c.store().create(&kept).await.unwrap();
    assert_eq!(c.advance(kept.id, &cancel).await.unwrap(), IntentionStatus::Pending);
    let after = c.store().load(kept.id).await.unwrap();
    assert!((after.strength - 0.8).abs() < 1e-6, "a lower override never weakens the intention");
    assert_eq!(h.model.remaining(), 0);
}

#[tokio::test]
async fn test_interrupted_execution_is_reviewed() {
    let h = harness(&[], AgencyConfig::default()).await;
    let c = heuristic_outcomes(h.controller);

    let mut intention = reviewed_intention(ExecutionStatus::Running, 0, 1);
    intention.status = IntentionStatus::Executing;
    if let Some(execution) = intention.execution.as_mut() {
        execution.finished_at = None;
    }
    let id = intention.id;
    c.store().create(&intention).await.unwrap();

    assert_eq!(c.advance(id, &CancellationToken::new()).await.unwrap(), IntentionStatus::AwaitingReview);
    let after = c.store().load(id).await.unwrap();
    assert_eq!(after.execution.map(|e| e.status), Some(ExecutionStatus::Cancelled));
}

#[tokio::test]
async fn test_risky_plan_waits_for_human() {
    let h = harness(&[PLAN, APPROVE], AgencyConfig::default()).await;
    let c = &h.controller;
    let cancel = CancellationToken::new();

    let signal = strong("Reorganize the project folder").with_risk(RiskLevel::Medium);
    let SignalOutcome::Created(id) = c.ingest_signal(signal, Tick { frame: 1 }).await.unwrap() else {
        panic!("expected a new intention");
    };
    c.evaluation_tick(Tick { frame: 1 }).await.unwrap();
    c.advance(id, &cancel).await.unwrap();
    c.advance(id, &cancel).await.unwrap();
    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::AwaitingApproval);

    let pending = c.pending_approvals().await.unwrap();
    assert_eq!(pending.len(), 1);
    assert!(pending[0].needs_attention);

    let approved = c.approve(id).await.unwrap();
    assert_eq!(approved.status, IntentionStatus::Approved);
    assert_eq!(approved.metrics.user_approvals, 1);
    assert_eq!(approved.metrics.user_interactions, 1);
    assert!(matches!(c.approve(id).await, Err(ControllerError::UnexpectedStatus { .. })));
    assert_eq!(c.telemetry().gate_stats.queued, 1);
}

#[tokio::test]
async fn test_reject_and_requeue() {
    let h = harness(&[], AgencyConfig::default()).await;
    let c = &h.controller;

    let SignalOutcome::Created(id) = c.ingest_signal(strong("Clean the inbox"), Tick { frame: 1 }).await.unwrap() else {
        panic!("expected a new intention");
    };
    let rejected = c.reject(id, "not now", true).await.unwrap();
    assert_eq!(rejected.status, IntentionStatus::Rejected);
    assert!(rejected.latest_rejection().unwrap().by_human);

    let requeued = c.requeue(id).await.unwrap();
    assert_eq!(requeued.status, IntentionStatus::Pending);
    assert_eq!(requeued.metrics.user_interactions, 2);

    c.reject(id, "never", false).await.unwrap();
    assert!(matches!(c.requeue(id).await, Err(ControllerError::NotRetryable(_))));
}

#[tokio::test]
async fn test_blocked_plan_is_not_retryable() {
    let h = harness(&[PLAN, APPROVE], AgencyConfig::default()).await;
    let c = &h.controller;
    let cancel = CancellationToken::new();

    let signal = strong("Wipe the backup drive").with_risk(RiskLevel::Critical);
    let SignalOutcome::Created(id) = c.ingest_signal(signal, Tick { frame: 1 }).await.unwrap() else {
        panic!("expected a new intention");
    };
    c.evaluation_tick(Tick { frame: 1 }).await.unwrap();
    c.advance(id, &cancel).await.unwrap();
    c.advance(id, &cancel).await.unwrap();
    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::Rejected);
    assert!(matches!(c.requeue(id).await, Err(ControllerError::NotRetryable(_))));
}

#[tokio::test]
async fn test_revision_loops_back_once() {
    let revise = r#"{"verdict": "revise", "concerns": ["too vague"], "alignment_score": 0.4}"#;
    let h = harness(&[PLAN, revise, PLAN, APPROVE], AgencyConfig::default()).await;
    let c = &h.controller;
    let cancel = CancellationToken::new();

    let SignalOutcome::Created(id) = c.ingest_signal(strong("Tell the time"), Tick { frame: 1 }).await.unwrap() else {
        panic!("expected a new intention");
    };
    c.evaluation_tick(Tick { frame: 1 }).await.unwrap();
    c.advance(id, &cancel).await.unwrap();
    c.advance(id, &cancel).await.unwrap();
    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::Planning);
    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::Reviewing);

    let revision_prompt = &h.model.requests()[2].messages[0].content;
    assert!(revision_prompt.contains("Concern: too vague"), "review feedback reaches the planner");

    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::Approved);
    let intention = c.store().load(id).await.unwrap();
    assert_eq!(intention.metrics.plan_revisions, 1);
    assert_eq!(intention.plan.map(|p| p.version), Some(2));
    assert_eq!(intention.plan_history.len(), 1);
}

#[tokio::test]
async fn test_planning_gives_up_after_attempts() {
    let h = harness(&["x", "x", "y", "y", "z", "z"], AgencyConfig::default()).await;
    let c = &h.controller;
    let cancel = CancellationToken::new();

    let SignalOutcome::Created(id) = c.ingest_signal(strong("Tell the time"), Tick { frame: 1 }).await.unwrap() else {
        panic!("expected a new intention");
    };
    c.evaluation_tick(Tick { frame: 1 }).await.unwrap();
    c.advance(id, &cancel).await.unwrap();

    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::Planning);
    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::Planning);
    assert_eq!(c.advance(id, &cancel).await.unwrap(), IntentionStatus::Failed);
    let intention = c.store().load(id).await.unwrap();
    assert_eq!(intention.metrics.plan_attempts, 3);
    assert_eq!(intention.metrics.plan_failures, 3);
}

#[tokio::test]
async fn test_duplicate_signal_reinforces() {
    let h = harness(&[], AgencyConfig::default()).await;
    let c = &h.controller;

    let SignalOutcome::Created(id) = c
        .ingest_signal(Signal::new(IntentionSource::Task, "Water the plants"), Tick { frame: 1 })
        .await
        .unwrap()
    else {
        panic!("expected a new intention");
    };
    let again = c
        .ingest_signal(Signal::new(IntentionSource::Curiosity, "water the plants!"), Tick { frame: 2 })
        .await
        .unwrap();
    assert_eq!(again, SignalOutcome::Reinforced(id));

    let intention = c.store().load(id).await.unwrap();
    assert_eq!(intention.reinforcements, 1);
    assert!((intention.strength - 0.8).abs() < 1e-6, "0.5 + 0.3 boost");
    assert_eq!(intention.last_reinforced_tick, Some(2));
    assert_eq!(intention.base_weight, IntentionSource::Task.default_weight(), "weight never changes");
}

#[tokio::test]
async fn test_disabled_source_and_pending_cap() {
    let mut config = AgencyConfig::default();
    config.sources.insert(
        IntentionSource::Dream,
        volition::config::SourceSettings {
            enabled: false,
            weight: None,
        },
    );
    config.limits.max_pending = 1;
    let h = harness(&[], config).await;
    let c = &h.controller;

    let dream = Signal::new(IntentionSource::Dream, "fly over the city");
    assert_eq!(c.ingest_signal(dream, Tick { frame: 1 }).await.unwrap(), SignalOutcome::Ignored);

    assert!(matches!(
        c.ingest_signal(Signal::new(IntentionSource::Task, "first"), Tick { frame: 1 }).await.unwrap(),
        SignalOutcome::Created(_)
    ));
    assert_eq!(
        c.ingest_signal(Signal::new(IntentionSource::Task, "second unrelated thing"), Tick { frame: 1 })
            .await
            .unwrap(),
        SignalOutcome::Ignored
    );
}

#[tokio::test]
async fn test_decay_abandons_faded_intention() {
    let h = harness(&[], AgencyConfig::default()).await;
    let c = &h.controller;

    let signal = Signal::new(IntentionSource::Reflection, "revisit old notes").with_strength(0.06);
    let SignalOutcome::Created(id) = c.ingest_signal(signal, Tick { frame: 1 }).await.unwrap() else {
        panic!("expected a new intention");
    };

    let same_tick = c.decay_tick(Tick { frame: 1 }).await.unwrap();
    assert_eq!(same_tick.decayed, 0, "reinforced this tick, no decay");

    let next = c.decay_tick(Tick { frame: 2 }).await.unwrap();
    assert_eq!(next.abandoned, 1);
    let intention = c.store().load(id).await.unwrap();
    assert_eq!(intention.status, IntentionStatus::Abandoned);
    assert!((intention.strength - 0.05).abs() < 1e-6);
}

#[tokio::test]
async fn test_reinforced_between_decay_runs_is_spared() {
    let h = harness(&[], AgencyConfig::default()).await;
    let c = &h.controller;

    let SignalOutcome::Created(id) = c
        .ingest_signal(Signal::new(IntentionSource::Task, "Water the plants"), Tick { frame: 1 })
        .await
        .unwrap()
    else {
        panic!("expected a new intention");
    };
    c.decay_tick(Tick { frame: 1 }).await.unwrap();

    c.ingest_signal(Signal::new(IntentionSource::Task, "water the plants"), Tick { frame: 2 })
        .await
        .unwrap();
    let reinforced = c.store().load(id).await.unwrap().strength;

    let spared = c.decay_tick(Tick { frame: 3 }).await.unwrap();
    assert_eq!(spared.decayed, 0, "reinforced after the last decay run");
    assert_eq!(c.store().load(id).await.unwrap().strength, reinforced);

    let next = c.decay_tick(Tick { frame: 4 }).await.unwrap();
    assert_eq!(next.decayed, 1);
    assert!(c.store().load(id).await.unwrap().strength < reinforced);
}

#[tokio::test]
async fn test_evaluation_respects_active_limit() {
    let mut config = AgencyConfig::default();
    config.limits.max_active = 1;
    let h = harness(&[], config).await;
    let c = &h.controller;

    let Ok(SignalOutcome::Created(weaker)) = c
        .ingest_signal(Signal::new(IntentionSource::Task, "back up photos").with_strength(0.95), Tick { frame: 1 })
        .await
    else {
        panic!("expected a new intention");
    };
    let Ok(SignalOutcome::Created(stronger)) = c.ingest_signal(strong("finish the report"), Tick { frame: 1 }).await else {
        panic!("expected a new intention");
    };

    let promoted = c.evaluation_tick(Tick { frame: 1 }).await.unwrap();
    assert_eq!(promoted, vec![stronger]);
    assert_eq!(c.store().status_of(weaker), Some(IntentionStatus::Pending));
    assert!(c.evaluation_tick(Tick { frame: 2 }).await.unwrap().is_empty(), "no free slot");
}
