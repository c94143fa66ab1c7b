//! Scheduler state and the per-kind re-entrancy gate.
//!
//! There are no module-level timers. The reactor owns one
//! [`SchedulerContext`] and hands it to every tick function by reference.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::time::Tick;
use crate::config::ScheduleConfig;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TickKind {
    Generation,
    Decay,
    Evaluation,
    Progression,
    Cleanup,
}

impl TickKind {
    /// Within one pulse, kinds run in this order: decay and reinforcement
    /// always precede threshold evaluation.
    pub const ALL: [TickKind; 5] = [
        TickKind::Generation,
        TickKind::Decay,
        TickKind::Evaluation,
        TickKind::Progression,
        TickKind::Cleanup,
    ];

    fn index(self) -> usize {
        match self {
            TickKind::Generation => 0,
            TickKind::Decay => 1,
            TickKind::Evaluation => 2,
            TickKind::Progression => 3,
            TickKind::Cleanup => 4,
        }
    }
}

#[derive(Debug, Clone)]
pub struct SchedulerContext {
    pub tick: Tick,
    pub now: DateTime<Utc>,
    intervals: HashMap<TickKind, u64>,
    last_run: HashMap<TickKind, Tick>,
}

impl SchedulerContext {
    pub fn new(schedule: &ScheduleConfig) -> Self {
        let intervals = HashMap::from([
            (TickKind::Generation, schedule.generation_every),
            (TickKind::Decay, schedule.decay_every),
            (TickKind::Evaluation, schedule.evaluation_every),
            (TickKind::Progression, schedule.progression_every),
            (TickKind::Cleanup, schedule.cleanup_every),
        ]);
        Self {
            tick: Tick::new(),
            now: Utc::now(),
            intervals,
            last_run: HashMap::new(),
        }
    }

    pub fn advance(&mut self, now: DateTime<Utc>) -> Tick {
        self.tick = self.tick.next();
        self.now = now;
        self.tick
    }

    /// A kind that never ran is due immediately.
    pub fn is_due(&self, kind: TickKind) -> bool {
        let every = self.intervals.get(&kind).copied().unwrap_or(1).max(1);
        match self.last_run.get(&kind) {
            None => true,
            Some(last) => self.tick.frame.saturating_sub(last.frame) >= every,
        }
    }

    pub fn due_kinds(&self) -> Vec<TickKind> {
        TickKind::ALL.into_iter().filter(|k| self.is_due(*k)).collect()
    }

    pub fn mark_run(&mut self, kind: TickKind) {
        self.last_run.insert(kind, self.tick);
    }

    pub fn last_run(&self, kind: TickKind) -> Option<Tick> {
        self.last_run.get(&kind).copied()
    }
}

/// At most one active tick per kind. A tick that finds its kind still
/// running is dropped, never queued.
#[derive(Debug, Default)]
pub struct TickGate {
    running: [AtomicBool; 5],
}

impl TickGate {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn try_enter(self: &Arc<Self>, kind: TickKind) -> Option<TickGuard> {
        self.running[kind.index()]
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| TickGuard {
                gate: Arc::clone(self),
                kind,
            })
    }

    pub fn is_running(&self, kind: TickKind) -> bool {
        self.running[kind.index()].load(Ordering::Acquire)
    }
}

/// Releases the kind when dropped, including on panic or cancellation.
#[derive(Debug)]
pub struct TickGuard {
    gate: Arc<TickGate>,
    kind: TickKind,
}

impl TickGuard {
    pub fn kind(&self) -> TickKind {
        self.kind
    }
}

impl Drop for TickGuard {
    fn drop(&mut self) {
        self.gate.running[self.kind.index()].store(false, Ordering::Release);
    }
}
