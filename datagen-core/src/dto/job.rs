//! Job DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::job::{Job, JobError, JobStatus};
use crate::domain::seed::Seed;
use crate::domain::usage::Usage;

/// Request to start generation for a pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreateJob {
    pub pipeline_id: Uuid,
    pub seeds: Vec<Seed>,
}

/// Partial job update
///
/// Only the fields that are `Some` are written.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct JobUpdate {
    pub status: Option<JobStatus>,
    pub total_seeds: Option<u64>,
    pub current_seed: Option<u64>,
    pub records_generated: Option<u64>,
    pub records_failed: Option<u64>,
    pub progress: Option<f64>,
    pub current_block: Option<String>,
    pub current_step: Option<String>,
    pub usage: Option<Usage>,
    pub error: Option<JobError>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl JobUpdate {
    /// Update that only changes the status
    pub fn status(status: JobStatus) -> Self {
        Self {
            status: Some(status),
            ..Default::default()
        }
    }

    /// Update that only changes the current block label
    pub fn current_block(block_type: impl Into<String>) -> Self {
        Self {
            current_block: Some(block_type.into()),
            ..Default::default()
        }
    }

    /// Writes every set field into `job`
    pub fn apply(self, job: &mut Job) {
        if let Some(status) = self.status {
            job.status = status;
        }
        if let Some(total_seeds) = self.total_seeds {
            job.total_seeds = total_seeds;
        }
        if let Some(current_seed) = self.current_seed {
            job.current_seed = current_seed;
        }
        if let Some(generated) = self.records_generated {
            job.records_generated = generated;
        }
        if let Some(failed) = self.records_failed {
            job.records_failed = failed;
        }
        if let Some(progress) = self.progress {
            job.progress = progress;
        }
        if let Some(block) = self.current_block {
            job.current_block = Some(block);
        }
        if let Some(step) = self.current_step {
            job.current_step = Some(step);
        }
        if let Some(usage) = self.usage {
            job.usage = usage;
        }
        if let Some(error) = self.error {
            job.error = Some(error);
        }
        if let Some(started_at) = self.started_at {
            job.started_at = Some(started_at);
        }
        if let Some(completed_at) = self.completed_at {
            job.completed_at = Some(completed_at);
        }
    }
}
