//! Intentions: data model, strength dynamics, the lifecycle state machine
//! and the controller that drives it.

pub mod character;
pub mod controller;
pub mod journal;
pub mod lifecycle;
pub mod strength;
pub mod types;

pub use controller::{ControllerError, DecaySummary, LifecycleController, SignalOutcome};
pub use types::{Intention, IntentionId, IntentionSource, IntentionStage, IntentionStatus, RiskLevel, TrustLevel};
