//! Scheduler layer
//!
//! This layer admits one job at a time, drives its seeds through the engine
//! in the background, and polls for cancellation at the checkpoints. It is
//! the only writer of job status.

pub mod admission;
pub mod checkpoint;
pub mod job_scheduler;

pub use admission::{AdmissionGate, AdmissionPermit};
pub use checkpoint::{Checkpoint, CheckpointSite, Checkpoints};
pub use job_scheduler::{JobHandle, JobScheduler};
