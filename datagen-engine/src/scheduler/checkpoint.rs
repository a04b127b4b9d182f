//! Cancellation checkpoints
//!
//! Cancellation is cooperative: a cancel request only changes the job's
//! status in storage, and runs observe it by polling at four points:
//!
//! 1. before each block of a plain run
//! 2. before each seed of a fan-out run
//! 3. before each remaining block inside a fan-out seed
//! 4. after all repetitions of a seed, before the next seed
//!
//! Each point is its own call so it can be exercised on its own.

use std::sync::Arc;
use tracing::{debug, warn};

use crate::context::JobRef;
use crate::error::Result;
use crate::repository::JobRepository;

/// Outcome of polling a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Checkpoint {
    Continue,
    Stop,
}

impl Checkpoint {
    pub fn should_stop(self) -> bool {
        self == Checkpoint::Stop
    }
}

/// Where a checkpoint is polled from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointSite {
    BeforeBlock,
    BeforeSeed,
    BeforeSeedBlock,
    AfterSeedRepetitions,
}

impl CheckpointSite {
    pub fn as_str(self) -> &'static str {
        match self {
            CheckpointSite::BeforeBlock => "before block",
            CheckpointSite::BeforeSeed => "before seed",
            CheckpointSite::BeforeSeedBlock => "before seed block",
            CheckpointSite::AfterSeedRepetitions => "after seed repetitions",
        }
    }
}

/// Polls the job store for cancellation
#[derive(Clone)]
pub struct Checkpoints {
    jobs: Arc<dyn JobRepository>,
}

impl Checkpoints {
    pub fn new(jobs: Arc<dyn JobRepository>) -> Self {
        Self { jobs }
    }

    /// Checkpoint 1: before each block of a plain run
    pub async fn before_block(&self, job: JobRef) -> Result<Checkpoint> {
        self.poll(CheckpointSite::BeforeBlock, job).await
    }

    /// Checkpoint 2: before each seed of a fan-out run
    pub async fn before_seed(&self, job: JobRef) -> Result<Checkpoint> {
        self.poll(CheckpointSite::BeforeSeed, job).await
    }

    /// Checkpoint 3: before each remaining block inside a fan-out seed
    pub async fn before_seed_block(&self, job: JobRef) -> Result<Checkpoint> {
        self.poll(CheckpointSite::BeforeSeedBlock, job).await
    }

    /// Checkpoint 4: after all repetitions of a seed
    pub async fn after_seed_repetitions(&self, job: JobRef) -> Result<Checkpoint> {
        self.poll(CheckpointSite::AfterSeedRepetitions, job).await
    }

    /// Polls the given site
    ///
    /// Ad-hoc runs always continue. A job that reached a terminal status
    /// (cancelled, or stopped by the constraint tracker) or that vanished
    /// from storage stops the run.
    pub async fn poll(&self, site: CheckpointSite, job: JobRef) -> Result<Checkpoint> {
        let JobRef::Job(job_id) = job else {
            return Ok(Checkpoint::Continue);
        };

        match self.jobs.find_by_id(job_id).await? {
            Some(job) if job.status.is_terminal() => {
                debug!(
                    "Checkpoint '{}' observed status '{}' for job {}",
                    site.as_str(),
                    job.status,
                    job_id
                );
                Ok(Checkpoint::Stop)
            }
            Some(_) => Ok(Checkpoint::Continue),
            None => {
                warn!(
                    "Checkpoint '{}': job {} no longer exists, stopping",
                    site.as_str(),
                    job_id
                );
                Ok(Checkpoint::Stop)
            }
        }
    }
}
