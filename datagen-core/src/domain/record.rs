//! Record domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::FieldMap;

/// Persisted result of one complete run
///
/// Created by the engine (fan-out path, incrementally) or the scheduler
/// (plain path, after the run). Only review actions mutate it afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record {
    pub id: Uuid,
    /// Final output value of the run
    pub output: serde_json::Value,
    /// Seed data the run started from
    pub metadata: FieldMap,
    pub status: RecordStatus,
    pub trace: Vec<TraceEntry>,
    pub pipeline_id: Uuid,
    pub job_id: Option<Uuid>,
    /// Correlation id of the run that produced the record
    pub trace_id: Uuid,
    pub created_at: chrono::DateTime<chrono::Utc>,
}

/// Review status of a record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
}

/// One executed block within a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceEntry {
    pub block_type: String,
    /// State snapshot the block was invoked with
    pub input: FieldMap,
    /// Validated block result
    pub output: FieldMap,
    /// Full state after merging `output`
    pub accumulated_state: FieldMap,
    pub duration_ms: u64,
}
