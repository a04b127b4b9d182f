//! Prepared pipelines
//!
//! A pipeline definition resolved against the block registry. Structural
//! checks happen here, once, so the execution paths never re-inspect block
//! capabilities.

use datagen_core::domain::pipeline::Pipeline;
use datagen_core::domain::usage::Constraints;
use std::sync::Arc;
use tracing::debug;
use uuid::Uuid;

use crate::block::{Block, BlockKind, BlockRegistry, MultiplierBlock};
use crate::error::{EngineError, Result};

/// Pipeline ready for execution
#[derive(Clone)]
pub struct PreparedPipeline {
    id: Uuid,
    name: String,
    constraints: Constraints,
    /// First block, when it is a multiplier
    multiplier: Option<Arc<dyn MultiplierBlock>>,
    /// Standard blocks, in order (excluding the multiplier)
    blocks: Vec<Arc<dyn Block>>,
}

impl PreparedPipeline {
    /// Resolves every block of `pipeline` through `registry`
    ///
    /// # Errors
    /// * `BlockNotFound` / `BlockConfig` for unresolvable blocks
    /// * `InvalidPipeline` for structural errors
    pub fn prepare(pipeline: &Pipeline, registry: &BlockRegistry) -> Result<Self> {
        let kinds = pipeline
            .blocks
            .iter()
            .map(|spec| registry.lookup(&spec.type_name, &spec.config))
            .collect::<Result<Vec<_>>>()?;

        let prepared = Self::from_blocks(pipeline.id, &pipeline.name, pipeline.constraints, kinds)?;
        debug!(
            "Prepared pipeline '{}' ({} block(s), fan-out: {})",
            prepared.name,
            prepared.len(),
            prepared.is_fan_out()
        );
        Ok(prepared)
    }

    /// Builds a prepared pipeline from already constructed blocks
    ///
    /// A multiplier is only accepted at position zero, and a pipeline must
    /// contain at least one block.
    pub fn from_blocks(
        id: Uuid,
        name: &str,
        constraints: Constraints,
        kinds: Vec<BlockKind>,
    ) -> Result<Self> {
        if kinds.is_empty() {
            return Err(EngineError::InvalidPipeline(format!(
                "pipeline '{}' has no blocks",
                name
            )));
        }

        let mut multiplier = None;
        let mut blocks = Vec::with_capacity(kinds.len());

        for (position, kind) in kinds.into_iter().enumerate() {
            match kind {
                BlockKind::Multiplier(block) if position == 0 => multiplier = Some(block),
                BlockKind::Multiplier(block) => {
                    return Err(EngineError::InvalidPipeline(format!(
                        "multiplier block '{}' must be the first block, found at position {}",
                        block.schema().type_name,
                        position
                    )));
                }
                BlockKind::Standard(block) => blocks.push(block),
            }
        }

        Ok(Self {
            id,
            name: name.to_string(),
            constraints,
            multiplier,
            blocks,
        })
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn constraints(&self) -> &Constraints {
        &self.constraints
    }

    pub fn multiplier(&self) -> Option<&Arc<dyn MultiplierBlock>> {
        self.multiplier.as_ref()
    }

    /// Standard blocks, excluding a leading multiplier
    pub fn blocks(&self) -> &[Arc<dyn Block>] {
        &self.blocks
    }

    /// Total number of blocks, multiplier included
    pub fn len(&self) -> usize {
        self.blocks.len() + usize::from(self.multiplier.is_some())
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn is_fan_out(&self) -> bool {
        self.multiplier.is_some()
    }
}

impl std::fmt::Debug for PreparedPipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PreparedPipeline")
            .field("id", &self.id)
            .field("name", &self.name)
            .field(
                "multiplier",
                &self.multiplier.as_ref().map(|m| m.schema().type_name.clone()),
            )
            .field(
                "blocks",
                &self
                    .blocks
                    .iter()
                    .map(|b| b.schema().type_name.clone())
                    .collect::<Vec<_>>(),
            )
            .finish()
    }
}

/// Whether `pipeline` starts with a multiplier block
pub fn is_fan_out(pipeline: &PreparedPipeline) -> bool {
    pipeline.is_fan_out()
}
