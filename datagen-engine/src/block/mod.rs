//! Block contract
//!
//! A block declares the state fields it reads and writes and runs
//! asynchronously against an [`ExecutionContext`]. Multiplier blocks instead
//! expand one seed into many skeletons and must be first in a pipeline.
//!
//! Which of the two a block is gets decided once, when the registry builds
//! it, through the [`BlockKind`] variant.

mod registry;

pub use registry::BlockRegistry;

use async_trait::async_trait;
use datagen_core::FieldMap;
use datagen_core::domain::block::BlockSchema;
use serde_json::Value;
use std::sync::Arc;

use crate::context::ExecutionContext;

/// Standard block
///
/// # Example
///
/// ```rust
/// use async_trait::async_trait;
/// use datagen_core::FieldMap;
/// use datagen_core::domain::block::{BlockSchema, FieldSet};
/// use datagen_engine::block::Block;
/// use datagen_engine::context::ExecutionContext;
///
/// struct Upper {
///     schema: BlockSchema,
/// }
///
/// #[async_trait]
/// impl Block for Upper {
///     fn schema(&self) -> &BlockSchema {
///         &self.schema
///     }
///
///     async fn execute(&self, ctx: &mut ExecutionContext) -> anyhow::Result<FieldMap> {
///         let content = ctx.get("content").and_then(|v| v.as_str()).unwrap_or_default();
///         let mut out = FieldMap::new();
///         out.insert("upper".to_string(), content.to_uppercase().into());
///         Ok(out)
///     }
/// }
/// ```
#[async_trait]
pub trait Block: Send + Sync {
    /// Declared contract of this block
    fn schema(&self) -> &BlockSchema;

    /// Runs the block against the accumulated state
    ///
    /// Must only return fields listed in `schema().outputs`, unless outputs
    /// is the wildcard. Usage is reported through
    /// [`ExecutionContext::record_usage`].
    async fn execute(&self, ctx: &mut ExecutionContext) -> anyhow::Result<FieldMap>;
}

/// Block that fans one seed out into many skeletons
#[async_trait]
pub trait MultiplierBlock: Send + Sync {
    fn schema(&self) -> &BlockSchema;

    /// Produces the skeletons completed by the remaining blocks
    ///
    /// Every skeleton must respect `schema().outputs`.
    async fn expand(&self, ctx: &mut ExecutionContext) -> anyhow::Result<Vec<FieldMap>>;
}

/// Runnable block, tagged by capability
#[derive(Clone)]
pub enum BlockKind {
    Standard(Arc<dyn Block>),
    Multiplier(Arc<dyn MultiplierBlock>),
}

impl BlockKind {
    pub fn standard<B: Block + 'static>(block: B) -> Self {
        BlockKind::Standard(Arc::new(block))
    }

    pub fn multiplier<M: MultiplierBlock + 'static>(block: M) -> Self {
        BlockKind::Multiplier(Arc::new(block))
    }

    pub fn schema(&self) -> &BlockSchema {
        match self {
            BlockKind::Standard(block) => block.schema(),
            BlockKind::Multiplier(block) => block.schema(),
        }
    }

    pub fn is_multiplier(&self) -> bool {
        matches!(self, BlockKind::Multiplier(_))
    }
}

impl std::fmt::Debug for BlockKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let variant = if self.is_multiplier() {
            "Multiplier"
        } else {
            "Standard"
        };
        f.debug_tuple(variant).field(&self.schema().type_name).finish()
    }
}

/// Constructor for a block type
///
/// Registered once per type in the [`BlockRegistry`]; called once per block
/// instance in a pipeline with that instance's configuration.
pub trait BlockFactory: Send + Sync {
    /// Schema of the blocks this factory builds
    fn schema(&self) -> BlockSchema;

    /// Builds a block from its instance configuration
    ///
    /// # Errors
    /// Returns an error if the configuration is invalid for this block type
    fn create(&self, config: &Value) -> anyhow::Result<BlockKind>;
}
