//! Repository layer
//!
//! Repositories abstract storage of jobs, records and pipelines. The engine
//! only needs create, read and update-by-id; durable backends live outside
//! this crate and implement the same traits.
//!
//! All repositories are trait-based to enable testing and mocking. The
//! in-memory implementations back tests and embedders without a database.

mod jobs;
mod pipelines;
mod records;

// Re-export traits
pub use jobs::{JobRepository, Transition};
pub use pipelines::PipelineRepository;
pub use records::RecordRepository;

// Re-export implementations
pub use jobs::InMemoryJobRepository;
pub use pipelines::InMemoryPipelineRepository;
pub use records::InMemoryRecordRepository;

use std::sync::{Mutex, MutexGuard};

/// Locks an in-memory table, turning poisoning into a storage error
fn lock<'a, T>(table: &'a Mutex<T>, name: &str) -> anyhow::Result<MutexGuard<'a, T>> {
    table
        .lock()
        .map_err(|_| anyhow::anyhow!("{} table lock poisoned", name))
}
