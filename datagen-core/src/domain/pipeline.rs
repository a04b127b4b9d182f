//! Pipeline domain types

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::usage::Constraints;

/// Pipeline definition
///
/// An ordered list of block instances plus optional resource constraints.
/// Immutable for the duration of any job using it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pipeline {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub blocks: Vec<BlockSpec>,
    #[serde(default)]
    pub constraints: Constraints,
    pub created_at: chrono::DateTime<chrono::Utc>,
    pub updated_at: chrono::DateTime<chrono::Utc>,
}

/// One block instance inside a pipeline definition
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BlockSpec {
    /// Block type resolved through the registry
    #[serde(rename = "type")]
    pub type_name: String,
    /// Instance configuration handed to the block constructor
    #[serde(default)]
    pub config: serde_json::Value,
}

impl BlockSpec {
    pub fn new(type_name: impl Into<String>) -> Self {
        Self {
            type_name: type_name.into(),
            config: serde_json::Value::Null,
        }
    }

    pub fn with_config(mut self, config: serde_json::Value) -> Self {
        self.config = config;
        self
    }
}
