pub mod config;
pub mod executor;
pub mod intent;
pub mod kernel;
pub mod planner;
pub mod policy;
pub mod review;
pub mod services;
pub mod signals;
pub mod store;

// Re-export specific items if needed for convenient access
pub use config::AgencyConfig;
pub use intent::{Intention, IntentionId, IntentionStatus, LifecycleController};
pub use kernel::reactor::Reactor;
pub use store::IntentionStore;
