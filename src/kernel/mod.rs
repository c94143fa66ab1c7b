pub mod cancel;
pub mod reactor;
pub mod scheduler;
pub mod telemetry;
pub mod time;
