//! Execution context for pipeline runs
//!
//! Contains all state owned by a single run:
//! - Correlation id (fixed for the lifetime of the run)
//! - The job the run belongs to, or the ad-hoc sentinel
//! - Accumulated state and the trace so far
//! - Usage reported by blocks and the pipeline's constraints
//!
//! A context is never shared between runs. Each fan-out seed gets its own.

use datagen_core::FieldMap;
use datagen_core::domain::record::TraceEntry;
use datagen_core::domain::usage::{Constraints, Usage};
use serde_json::Value;
use uuid::Uuid;

/// Job a run is bound to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobRef {
    /// Ad-hoc run outside any job (editor previews, tests)
    AdHoc,
    /// Run driven by the scheduler for this job
    Job(Uuid),
}

impl JobRef {
    pub fn job_id(self) -> Option<Uuid> {
        match self {
            JobRef::AdHoc => None,
            JobRef::Job(id) => Some(id),
        }
    }
}

impl std::fmt::Display for JobRef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobRef::AdHoc => f.write_str("ad-hoc"),
            JobRef::Job(id) => write!(f, "{}", id),
        }
    }
}

/// Per-run execution context handed to every block
#[derive(Debug)]
pub struct ExecutionContext {
    trace_id: Uuid,
    job: JobRef,
    pipeline_id: Uuid,
    state: FieldMap,
    usage: Usage,
    /// Usage reported since the scheduler last collected it
    unsynced: Usage,
    trace: Vec<TraceEntry>,
    constraints: Constraints,
}

impl ExecutionContext {
    /// Creates a context with a fresh correlation id
    ///
    /// # Arguments
    /// * `job` - Job the run belongs to
    /// * `pipeline_id` - Pipeline being executed
    /// * `constraints` - Ceilings configured on the pipeline
    /// * `initial` - Seed data copied into the accumulated state
    pub fn new(job: JobRef, pipeline_id: Uuid, constraints: Constraints, initial: FieldMap) -> Self {
        Self {
            trace_id: Uuid::new_v4(),
            job,
            pipeline_id,
            state: initial,
            usage: Usage::default(),
            unsynced: Usage::default(),
            trace: Vec::new(),
            constraints,
        }
    }

    pub fn trace_id(&self) -> Uuid {
        self.trace_id
    }

    pub fn job(&self) -> JobRef {
        self.job
    }

    pub fn pipeline_id(&self) -> Uuid {
        self.pipeline_id
    }

    /// Accumulated state as seen by the current block
    pub fn state(&self) -> &FieldMap {
        &self.state
    }

    /// Reads a single state field
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.state.get(field)
    }

    /// Usage reported so far in this run
    pub fn usage(&self) -> &Usage {
        &self.usage
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    /// Trace entries of the blocks executed so far
    pub fn trace(&self) -> &[TraceEntry] {
        &self.trace
    }

    /// Reports usage consumed by the current block
    ///
    /// Blocks that call external providers call this with whatever figures
    /// the provider returned. The engine never inspects anything else.
    pub fn record_usage(&mut self, usage: Usage) {
        self.usage.add(&usage);
        self.unsynced.add(&usage);
    }

    /// Merges a validated block result (union, last write wins)
    pub(crate) fn merge(&mut self, output: &FieldMap) {
        for (key, value) in output {
            self.state.insert(key.clone(), value.clone());
        }
    }

    /// Sets `field` unless a value is already present
    pub(crate) fn insert_if_absent(&mut self, field: &str, value: Value) -> bool {
        if self.state.contains_key(field) {
            return false;
        }
        self.state.insert(field.to_string(), value);
        true
    }

    pub(crate) fn push_trace(&mut self, entry: TraceEntry) {
        self.trace.push(entry);
    }

    /// Takes the usage reported since the previous call
    pub(crate) fn drain_unsynced_usage(&mut self) -> Usage {
        std::mem::take(&mut self.unsynced)
    }

    /// Consumes the context into (state, trace, trace_id, usage)
    pub(crate) fn into_parts(self) -> (FieldMap, Vec<TraceEntry>, Uuid, Usage) {
        (self.state, self.trace, self.trace_id, self.usage)
    }
}
