//! Pipeline DTOs

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::pipeline::{BlockSpec, Pipeline};
use crate::domain::usage::Constraints;

/// Request to create a new pipeline
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePipeline {
    pub name: String,
    pub description: Option<String>,
    pub blocks: Vec<BlockSpec>,
    #[serde(default)]
    pub constraints: Constraints,
}

impl CreatePipeline {
    /// Builds the pipeline entity with a fresh id and timestamps
    pub fn into_pipeline(self) -> Pipeline {
        let now = chrono::Utc::now();
        Pipeline {
            id: Uuid::new_v4(),
            name: self.name,
            description: self.description,
            blocks: self.blocks,
            constraints: self.constraints,
            created_at: now,
            updated_at: now,
        }
    }
}
