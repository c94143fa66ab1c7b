//! Reasoning layer: plan drafting, plan self-review, and the ReAct step
//! planner the executor drives.

pub mod observation;
pub mod plan;
pub mod react;
pub mod retrieval;
pub mod review;
pub mod schema;
pub mod types;

pub use plan::PlanGenerator;
pub use react::{PlannerConfig, PlannerError, ReactPlanner};
pub use review::PlanReviewer;
