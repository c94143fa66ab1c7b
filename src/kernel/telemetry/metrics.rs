use std::collections::{BTreeMap, VecDeque};

use super::event::{GateOutcome, TelemetryEvent};
use crate::executor::ExecutionStatus;
use crate::intent::types::IntentionStatus;
use crate::review::OutcomeVerdict;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct TelemetrySnapshot {
    pub intention_stats: IntentionStats,
    pub gate_stats: GateStats,
    pub execution_stats: ExecutionStats,
    pub outcome_stats: OutcomeStats,
    pub dropped_ticks: u64,
    pub purged: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntentionStats {
    pub created: u64,
    pub reinforced: u64,
    pub transitions: u64,
    /// Arrivals per status.
    pub entered: BTreeMap<IntentionStatus, u64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GateStats {
    pub auto_approved: u64,
    pub queued: u64,
    pub blocked: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionStats {
    pub count: u64,
    pub completed: u64,
    pub partial: u64,
    pub failed: u64,
    pub cancelled: u64,
    pub total_steps: u64,
    pub avg_steps: f64,
    pub total_elapsed_ms: u64,
    pub avg_elapsed_ms: f64,
    pub failure_loops: u64,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct OutcomeStats {
    pub completed: u64,
    pub continued: u64,
    pub retried: u64,
    pub escalated: u64,
    pub abandoned: u64,
}

pub fn compute_snapshot(events: &VecDeque<TelemetryEvent>) -> TelemetrySnapshot {
    let mut snap = TelemetrySnapshot::default();

    for event in events {
        match event {
            TelemetryEvent::IntentionCreated { .. } => snap.intention_stats.created += 1,
            TelemetryEvent::Reinforced { .. } => snap.intention_stats.reinforced += 1,
            TelemetryEvent::Transition { to, .. } => {
                snap.intention_stats.transitions += 1;
                *snap.intention_stats.entered.entry(*to).or_insert(0) += 1;
            }
            TelemetryEvent::Gate { outcome, .. } => match outcome {
                GateOutcome::AutoApproved => snap.gate_stats.auto_approved += 1,
                GateOutcome::Queued => snap.gate_stats.queued += 1,
                GateOutcome::Blocked => snap.gate_stats.blocked += 1,
            },
            TelemetryEvent::ExecutionFinished {
                status,
                steps,
                elapsed_ms,
                ..
            } => {
                let stats = &mut snap.execution_stats;
                stats.count += 1;
                stats.total_steps += u64::from(*steps);
                stats.total_elapsed_ms += elapsed_ms;
                match status {
                    ExecutionStatus::Completed => stats.completed += 1,
                    ExecutionStatus::InProgress => stats.partial += 1,
                    ExecutionStatus::Failed => stats.failed += 1,
                    ExecutionStatus::Cancelled => stats.cancelled += 1,
                    ExecutionStatus::Running => {}
                }
            }
            TelemetryEvent::FailureLoop { .. } => snap.execution_stats.failure_loops += 1,
            TelemetryEvent::Outcome { verdict, .. } => match verdict {
                OutcomeVerdict::Completed => snap.outcome_stats.completed += 1,
                OutcomeVerdict::Continue => snap.outcome_stats.continued += 1,
                OutcomeVerdict::Retry => snap.outcome_stats.retried += 1,
                OutcomeVerdict::Escalate => snap.outcome_stats.escalated += 1,
                OutcomeVerdict::Abandon => snap.outcome_stats.abandoned += 1,
            },
            TelemetryEvent::TickDropped { .. } => snap.dropped_ticks += 1,
            TelemetryEvent::Purged { count } => snap.purged += count,
        }
    }

    let stats = &mut snap.execution_stats;
    if stats.count > 0 {
        stats.avg_steps = stats.total_steps as f64 / stats.count as f64;
        stats.avg_elapsed_ms = stats.total_elapsed_ms as f64 / stats.count as f64;
    }

    snap
}
