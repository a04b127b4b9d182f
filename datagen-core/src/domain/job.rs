//! Job domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usage::Usage;

/// Generation job record
///
/// Created when generation starts and mutated only by the scheduler.
/// Terminal once it reaches completed, failed, cancelled or stopped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: Uuid,
    pub pipeline_id: Uuid,
    pub status: JobStatus,
    /// Number of runs the job will perform (grows when a multiplier fans out)
    pub total_seeds: u64,
    /// Number of runs finished so far
    pub current_seed: u64,
    pub records_generated: u64,
    pub records_failed: u64,
    /// Fraction of runs finished, in `0.0..=1.0`
    pub progress: f64,
    pub current_block: Option<String>,
    pub current_step: Option<String>,
    pub usage: Usage,
    /// First fatal error, when the job failed
    pub error: Option<JobError>,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub started_at: Option<chrono::DateTime<chrono::Utc>>,
    pub completed_at: Option<chrono::DateTime<chrono::Utc>>,
}

impl Job {
    /// Creates a pending job for `pipeline_id`
    pub fn new(pipeline_id: Uuid, total_seeds: u64) -> Self {
        Self {
            id: Uuid::new_v4(),
            pipeline_id,
            status: JobStatus::Pending,
            total_seeds,
            current_seed: 0,
            records_generated: 0,
            records_failed: 0,
            progress: 0.0,
            current_block: None,
            current_step: None,
            usage: Usage::default(),
            error: None,
            created_at: chrono::Utc::now(),
            started_at: None,
            completed_at: None,
        }
    }
}

/// Job execution status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    Pending,
    Running,
    Completed,
    Failed,
    /// Operator requested cancellation
    Cancelled,
    /// A usage constraint was reached
    Stopped,
}

impl JobStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            JobStatus::Completed | JobStatus::Failed | JobStatus::Cancelled | JobStatus::Stopped
        )
    }

    pub fn as_str(self) -> &'static str {
        match self {
            JobStatus::Pending => "pending",
            JobStatus::Running => "running",
            JobStatus::Completed => "completed",
            JobStatus::Failed => "failed",
            JobStatus::Cancelled => "cancelled",
            JobStatus::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for JobStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Structured description of the error that failed a job
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobError {
    pub kind: JobErrorKind,
    pub message: String,
    /// Error context (block type, step, input snapshot, offending fields...)
    #[serde(default)]
    pub details: serde_json::Value,
}

/// Category of a job failure
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobErrorKind {
    BlockNotFound,
    InvalidPipeline,
    BlockExecution,
    OutputContractViolation,
    Internal,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_statuses() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(!JobStatus::Running.is_terminal());
        assert!(JobStatus::Completed.is_terminal());
        assert!(JobStatus::Failed.is_terminal());
        assert!(JobStatus::Cancelled.is_terminal());
        assert!(JobStatus::Stopped.is_terminal());
    }

    #[test]
    fn test_status_serializes_lowercase() {
        let json = serde_json::to_value(JobStatus::Stopped).unwrap();
        assert_eq!(json, serde_json::json!("stopped"));
        assert_eq!(JobStatus::Cancelled.to_string(), "cancelled");
    }

    #[test]
    fn test_new_job_is_pending() {
        let job = Job::new(Uuid::new_v4(), 4);
        assert_eq!(job.status, JobStatus::Pending);
        assert_eq!(job.total_seeds, 4);
        assert_eq!(job.progress, 0.0);
        assert!(job.started_at.is_none());
    }
}
