//! Error types for the datagen engine

use datagen_core::FieldMap;
use datagen_core::domain::job::{JobError, JobErrorKind};
use serde_json::json;
use thiserror::Error;
use uuid::Uuid;

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;

/// Errors raised while preparing or executing pipelines
#[derive(Debug, Error)]
pub enum EngineError {
    /// A pipeline references a block type the registry does not know
    #[error("Block '{type_name}' not found (available: {})", available.join(", "))]
    BlockNotFound {
        type_name: String,
        available: Vec<String>,
    },

    /// A block constructor rejected its instance configuration
    #[error("Failed to configure block '{block_type}': {source:#}")]
    BlockConfig {
        block_type: String,
        #[source]
        source: anyhow::Error,
    },

    /// Structural problem in a pipeline definition
    #[error("Invalid pipeline: {0}")]
    InvalidPipeline(String),

    /// A block raised while executing
    #[error("Block '{block_type}' failed at step {step}: {source:#}")]
    BlockExecution {
        block_type: String,
        step: usize,
        /// State snapshot the block was invoked with
        input: FieldMap,
        #[source]
        source: anyhow::Error,
    },

    /// A block returned fields outside its declared outputs
    #[error(
        "Block '{block_type}' returned undeclared fields {extra:?} (declared: {declared:?}, actual: {actual:?})"
    )]
    OutputContract {
        block_type: String,
        declared: Vec<String>,
        actual: Vec<String>,
        extra: Vec<String>,
    },

    /// Another job already holds the admission slot
    #[error("Job {0} is already running")]
    JobAlreadyRunning(Uuid),

    #[error("Job {0} not found")]
    JobNotFound(Uuid),

    #[error("Pipeline {0} not found")]
    PipelineNotFound(Uuid),

    /// Operation not allowed in the job's current state
    #[error("Invalid state: {0}")]
    InvalidState(String),

    /// Rejected job submission
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// The background task driving a job panicked or was aborted
    #[error("Job task failed: {0}")]
    TaskFailed(String),

    /// Storage failure
    #[error("Repository error: {0:#}")]
    Repository(#[from] anyhow::Error),
}

impl EngineError {
    pub(crate) fn block_execution(
        block_type: &str,
        step: usize,
        input: FieldMap,
        source: anyhow::Error,
    ) -> Self {
        Self::BlockExecution {
            block_type: block_type.to_string(),
            step,
            input,
            source,
        }
    }

    /// Errors caused by the pipeline definition rather than by a run
    ///
    /// These are never retried; re-running the same definition fails the same way.
    pub fn is_definition_error(&self) -> bool {
        matches!(
            self,
            Self::BlockNotFound { .. }
                | Self::BlockConfig { .. }
                | Self::InvalidPipeline(_)
                | Self::OutputContract { .. }
        )
    }

    /// Runtime failures confined to the run (or seed) that raised them
    pub fn is_isolated(&self) -> bool {
        matches!(self, Self::BlockExecution { .. })
    }

    /// Check if this error is an output contract violation
    pub fn is_contract_violation(&self) -> bool {
        matches!(self, Self::OutputContract { .. })
    }

    /// Structured form stored on a failed job
    pub fn to_job_error(&self) -> JobError {
        let (kind, details) = match self {
            Self::BlockNotFound {
                type_name,
                available,
            } => (
                JobErrorKind::BlockNotFound,
                json!({ "type_name": type_name, "available": available }),
            ),
            Self::BlockConfig { block_type, .. } => (
                JobErrorKind::InvalidPipeline,
                json!({ "block_type": block_type }),
            ),
            Self::InvalidPipeline(_) => (JobErrorKind::InvalidPipeline, serde_json::Value::Null),
            Self::BlockExecution {
                block_type,
                step,
                input,
                ..
            } => (
                JobErrorKind::BlockExecution,
                json!({ "block_type": block_type, "step": step, "input": input }),
            ),
            Self::OutputContract {
                block_type,
                declared,
                actual,
                extra,
            } => (
                JobErrorKind::OutputContractViolation,
                json!({
                    "block_type": block_type,
                    "declared": declared,
                    "actual": actual,
                    "extra": extra,
                }),
            ),
            _ => (JobErrorKind::Internal, serde_json::Value::Null),
        };

        JobError {
            kind,
            message: self.to_string(),
            details,
        }
    }
}
