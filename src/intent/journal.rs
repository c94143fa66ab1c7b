//! Per-intention lifecycle journal. Entries are written as individually
//! numbered files and exist for audit only; nothing reads them back to make
//! a decision.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::types::IntentionStatus;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LifecycleEventKind {
    Origin,
    Reinforcement,
    Decay,
    ThresholdCrossed,
    StatusChange,
    Evaluation,
    PlanRequested,
    PlanCreated,
    PlanFailed,
    PlanRevised,
    PlanReviewed,
    GateAutoApproved,
    GateQueued,
    GateBlocked,
    HumanApproved,
    HumanRejected,
    Requeued,
    ExecutionStarted,
    ExecutionStep,
    ExecutionFinished,
    FailureLoopDetected,
    OutcomeReviewed,
    RetryScheduled,
    Escalated,
    Abandoned,
    Completed,
}

impl LifecycleEventKind {
    /// Slug used in the entry file name (`NNNN-<slug>.json`).
    pub fn slug(self) -> &'static str {
        match self {
            LifecycleEventKind::Origin => "origin",
            LifecycleEventKind::Reinforcement => "reinforcement",
            LifecycleEventKind::Decay => "decay",
            LifecycleEventKind::ThresholdCrossed => "threshold_crossed",
            LifecycleEventKind::StatusChange => "status_change",
            LifecycleEventKind::Evaluation => "evaluation",
            LifecycleEventKind::PlanRequested => "plan_requested",
            LifecycleEventKind::PlanCreated => "plan_created",
            LifecycleEventKind::PlanFailed => "plan_failed",
            LifecycleEventKind::PlanRevised => "plan_revised",
            LifecycleEventKind::PlanReviewed => "plan_reviewed",
            LifecycleEventKind::GateAutoApproved => "gate_auto_approved",
            LifecycleEventKind::GateQueued => "gate_queued",
            LifecycleEventKind::GateBlocked => "gate_blocked",
            LifecycleEventKind::HumanApproved => "human_approved",
            LifecycleEventKind::HumanRejected => "human_rejected",
            LifecycleEventKind::Requeued => "requeued",
            LifecycleEventKind::ExecutionStarted => "execution_started",
            LifecycleEventKind::ExecutionStep => "execution_step",
            LifecycleEventKind::ExecutionFinished => "execution_finished",
            LifecycleEventKind::FailureLoopDetected => "failure_loop_detected",
            LifecycleEventKind::OutcomeReviewed => "outcome_reviewed",
            LifecycleEventKind::RetryScheduled => "retry_scheduled",
            LifecycleEventKind::Escalated => "escalated",
            LifecycleEventKind::Abandoned => "abandoned",
            LifecycleEventKind::Completed => "completed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LifecycleEntry {
    pub kind: LifecycleEventKind,
    pub timestamp: DateTime<Utc>,
    pub status: IntentionStatus,
    pub strength: f32,
    pub note: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl LifecycleEntry {
    pub fn new(kind: LifecycleEventKind, status: IntentionStatus, strength: f32, note: impl Into<String>) -> Self {
        Self {
            kind,
            timestamp: Utc::now(),
            status,
            strength,
            note: note.into(),
            data: None,
        }
    }

    pub fn with_data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn file_name(&self, sequence: u32) -> String {
        format!("{:04}-{}.json", sequence, self.kind.slug())
    }
}
