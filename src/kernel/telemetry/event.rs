use serde::{Deserialize, Serialize};

use crate::executor::ExecutionStatus;
use crate::intent::types::{IntentionId, IntentionSource, IntentionStatus};
use crate::kernel::scheduler::TickKind;
use crate::kernel::time::Tick;
use crate::review::OutcomeVerdict;

// Allowed: ids, ticks, durations, counts, enums.
// Forbidden: any text that came from a signal, the model or a capability.

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TelemetryEvent {
    IntentionCreated {
        id: IntentionId,
        source: IntentionSource,
    },

    Reinforced {
        id: IntentionId,
    },

    Transition {
        id: IntentionId,
        from: IntentionStatus,
        to: IntentionStatus,
        tick: Tick,
    },

    Gate {
        id: IntentionId,
        outcome: GateOutcome,
    },

    ExecutionFinished {
        id: IntentionId,
        attempt: u32,
        status: ExecutionStatus,
        steps: u32,
        elapsed_ms: u64,
        successes: u32,
        failures: u32,
    },

    FailureLoop {
        id: IntentionId,
    },

    Outcome {
        id: IntentionId,
        verdict: OutcomeVerdict,
    },

    TickDropped {
        kind: TickKind,
    },

    Purged {
        count: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum GateOutcome {
    AutoApproved,
    Queued,
    Blocked,
}
