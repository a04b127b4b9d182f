//! Service layer
//!
//! Services contain the execution logic: the engine that runs a block
//! sequence, the fan-out driver for multiplier pipelines, and the usage
//! tracker that enforces pipeline constraints.

pub mod engine;
pub mod fan_out;
pub mod usage;

pub use engine::ExecutionEngine;
pub use fan_out::{FanOutDriver, FanOutOutcome, StopReason};
pub use usage::UsageTracker;
