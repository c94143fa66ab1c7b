//! Intention telemetry.
//!
//! # Read-only invariant
//! Telemetry is a side-effect layer. Nothing in the controller, planner,
//! gate or executor reads it back to make a decision.
//!
//! # Content invariant
//! Events carry ids, statuses, counts and durations only; never titles,
//! goals, thoughts or observations.

pub mod event;
pub mod metrics;
pub mod recorder;

pub use event::{GateOutcome, TelemetryEvent};
pub use metrics::{compute_snapshot, TelemetrySnapshot};
pub use recorder::TelemetryRecorder;
