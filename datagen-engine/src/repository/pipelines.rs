//! Pipelines repository

use anyhow::Result;
use async_trait::async_trait;
use datagen_core::domain::pipeline::Pipeline;
use std::collections::HashMap;
use std::sync::Mutex;
use uuid::Uuid;

use super::lock;

/// Repository trait for pipeline definitions
#[async_trait]
pub trait PipelineRepository: Send + Sync {
    /// Finds a pipeline by ID
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Pipeline>>;

    /// Inserts or replaces a pipeline
    async fn save(&self, pipeline: Pipeline) -> Result<Pipeline>;
}

/// In-memory implementation of PipelineRepository
#[derive(Default)]
pub struct InMemoryPipelineRepository {
    pipelines: Mutex<HashMap<Uuid, Pipeline>>,
}

impl InMemoryPipelineRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PipelineRepository for InMemoryPipelineRepository {
    async fn find_by_id(&self, id: Uuid) -> Result<Option<Pipeline>> {
        let pipelines = lock(&self.pipelines, "pipelines")?;
        Ok(pipelines.get(&id).cloned())
    }

    async fn save(&self, mut pipeline: Pipeline) -> Result<Pipeline> {
        let mut pipelines = lock(&self.pipelines, "pipelines")?;
        if pipelines.contains_key(&pipeline.id) {
            pipeline.updated_at = chrono::Utc::now();
        }
        pipelines.insert(pipeline.id, pipeline.clone());
        Ok(pipeline)
    }
}
