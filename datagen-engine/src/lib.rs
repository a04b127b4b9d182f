//! Datagen execution engine
//!
//! Runs block pipelines against accumulated state, fans multiplier
//! pipelines out into independent seeds, and schedules generation jobs in
//! the background with polled cancellation and usage constraints.
//!
//! Layers:
//! - [`block`]: block contract and registry
//! - [`service`]: execution engine, fan-out driver, usage tracker
//! - [`scheduler`]: admission gate, checkpoints, job scheduler
//! - [`repository`]: storage traits and in-memory implementations

pub mod block;
pub mod config;
pub mod context;
pub mod error;
pub mod execution;
pub mod pipeline;
pub mod repository;
pub mod scheduler;
pub mod service;

pub use config::EngineConfig;
pub use error::{EngineError, Result};
pub use execution::{Execution, RunOutput, RunStatus};
pub use pipeline::{PreparedPipeline, is_fan_out};
pub use scheduler::JobScheduler;
pub use service::ExecutionEngine;
