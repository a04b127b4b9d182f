//! Record DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::FieldMap;
use crate::domain::record::{Record, RecordStatus, TraceEntry};

/// Record about to be inserted
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewRecord {
    pub output: serde_json::Value,
    pub metadata: FieldMap,
    pub status: RecordStatus,
    pub trace: Vec<TraceEntry>,
    pub pipeline_id: Uuid,
    pub job_id: Option<Uuid>,
    pub trace_id: Uuid,
}

impl NewRecord {
    /// Assigns an id and creation time
    pub fn into_record(self) -> Record {
        Record {
            id: Uuid::new_v4(),
            output: self.output,
            metadata: self.metadata,
            status: self.status,
            trace: self.trace,
            pipeline_id: self.pipeline_id,
            job_id: self.job_id,
            trace_id: self.trace_id,
            created_at: chrono::Utc::now(),
        }
    }
}
