//! Run results and job progress bookkeeping

use datagen_core::FieldMap;
use datagen_core::domain::job::JobError;
use datagen_core::domain::record::TraceEntry;
use datagen_core::domain::usage::Usage;
use datagen_core::dto::job::JobUpdate;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::context::ExecutionContext;
use crate::error::EngineError;

/// State key holding a run's final output
pub const FINAL_OUTPUT_FIELD: &str = "output";

/// How a run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RunStatus {
    /// Every block ran
    Completed,
    /// A checkpoint observed cancellation; the result is partial
    Cancelled,
}

/// Result of one run: accumulated state, trace and correlation id
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunOutput {
    pub result: FieldMap,
    pub trace: Vec<TraceEntry>,
    pub trace_id: Uuid,
    /// Usage reported by the blocks of this run
    pub usage: Usage,
    pub status: RunStatus,
}

impl RunOutput {
    pub(crate) fn from_context(ctx: ExecutionContext, status: RunStatus) -> Self {
        let (result, trace, trace_id, usage) = ctx.into_parts();
        Self {
            result,
            trace,
            trace_id,
            usage,
            status,
        }
    }

    /// Final output value, or null for a cancelled run
    pub fn final_output(&self) -> Value {
        self.result
            .get(FINAL_OUTPUT_FIELD)
            .cloned()
            .unwrap_or(Value::Null)
    }

    pub fn is_cancelled(&self) -> bool {
        self.status == RunStatus::Cancelled
    }
}

/// Result of an ad-hoc execution
#[derive(Debug, Clone, PartialEq)]
pub enum Execution {
    Single(RunOutput),
    /// One entry per processed fan-out seed
    FanOut(Vec<RunOutput>),
}

impl Execution {
    /// Every run, in execution order
    pub fn runs(&self) -> &[RunOutput] {
        match self {
            Execution::Single(run) => std::slice::from_ref(run),
            Execution::FanOut(runs) => runs,
        }
    }

    pub fn into_runs(self) -> Vec<RunOutput> {
        match self {
            Execution::Single(run) => vec![run],
            Execution::FanOut(runs) => runs,
        }
    }
}

/// Counters mirrored onto the job after every seed
#[derive(Debug, Clone, Default, PartialEq)]
pub struct JobProgress {
    /// Runs the job will perform; grows when a multiplier fans out
    pub total: u64,
    /// Runs finished so far, successful or not
    pub current: u64,
    pub generated: u64,
    pub failed: u64,
    /// First isolated failure, kept for the all-failed outcome
    pub first_error: Option<JobError>,
}

impl JobProgress {
    pub fn new(total: u64) -> Self {
        Self {
            total,
            ..Default::default()
        }
    }

    /// Replaces one pending run with the `skeletons` it expanded into
    pub fn expand_run(&mut self, skeletons: u64) {
        self.total = self.total.saturating_add(skeletons).saturating_sub(1);
    }

    pub fn record_success(&mut self) {
        self.generated += 1;
    }

    pub fn record_failure(&mut self, error: &EngineError) {
        self.failed += 1;
        if self.first_error.is_none() {
            self.first_error = Some(error.to_job_error());
        }
    }

    pub fn finish_run(&mut self) {
        self.current += 1;
    }

    /// Fraction of runs finished, in `0.0..=1.0`
    pub fn fraction(&self) -> f64 {
        if self.total == 0 {
            return 1.0;
        }
        (self.current as f64 / self.total as f64).min(1.0)
    }

    /// Whether every finished run failed
    pub fn all_failed(&self) -> bool {
        self.generated == 0 && self.failed > 0
    }

    /// Job update carrying the counters and cumulative usage
    pub fn to_update(&self, usage: Usage) -> JobUpdate {
        JobUpdate {
            total_seeds: Some(self.total),
            current_seed: Some(self.current),
            records_generated: Some(self.generated),
            records_failed: Some(self.failed),
            progress: Some(self.fraction()),
            usage: Some(usage),
            ..Default::default()
        }
    }
}
