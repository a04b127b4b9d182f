//! Seed domain types

use serde::{Deserialize, Serialize};

use super::FieldMap;

/// One input configuration submitted to a job
///
/// Each seed is expanded into `repetitions` independent runs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Seed {
    #[serde(default = "default_repetitions")]
    pub repetitions: u32,
    #[serde(default)]
    pub metadata: FieldMap,
}

fn default_repetitions() -> u32 {
    1
}

impl Seed {
    pub fn new(metadata: FieldMap) -> Self {
        Self {
            repetitions: default_repetitions(),
            metadata,
        }
    }

    pub fn with_repetitions(mut self, repetitions: u32) -> Self {
        self.repetitions = repetitions;
        self
    }
}
