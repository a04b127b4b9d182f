//! Block registry
//!
//! Resolves block type names from pipeline definitions to runnable blocks.

use datagen_core::domain::block::BlockSchema;
use serde_json::Value;
use std::collections::BTreeMap;

use super::{BlockFactory, BlockKind};
use crate::error::{EngineError, Result};

/// Registry of block constructors keyed by type name
pub struct BlockRegistry {
    factories: BTreeMap<String, Box<dyn BlockFactory>>,
}

impl BlockRegistry {
    /// Creates a new empty block registry
    pub fn new() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Registers a block factory
    ///
    /// # Panics
    /// Panics if a factory with the same type name is already registered
    pub fn register<F: BlockFactory + 'static>(&mut self, factory: F) {
        let type_name = factory.schema().type_name;
        if self.factories.contains_key(&type_name) {
            panic!("Block type '{}' is already registered", type_name);
        }
        self.factories.insert(type_name, Box::new(factory));
    }

    /// Registers a block type from a schema and a constructor closure
    ///
    /// # Panics
    /// Panics if the type name is already registered
    pub fn register_fn<F>(&mut self, schema: BlockSchema, create: F)
    where
        F: Fn(&Value) -> anyhow::Result<BlockKind> + Send + Sync + 'static,
    {
        self.register(FnFactory { schema, create });
    }

    /// Builds the block registered under `type_name`
    ///
    /// # Errors
    /// * `BlockNotFound` with the sorted list of known types if unresolved
    /// * `BlockConfig` if the constructor rejects `config`
    pub fn lookup(&self, type_name: &str, config: &Value) -> Result<BlockKind> {
        let factory = self
            .factories
            .get(type_name)
            .ok_or_else(|| EngineError::BlockNotFound {
                type_name: type_name.to_string(),
                available: self.type_names(),
            })?;

        factory
            .create(config)
            .map_err(|source| EngineError::BlockConfig {
                block_type: type_name.to_string(),
                source,
            })
    }

    pub fn contains(&self, type_name: &str) -> bool {
        self.factories.contains_key(type_name)
    }

    /// Registered type names, sorted
    pub fn type_names(&self) -> Vec<String> {
        self.factories.keys().cloned().collect()
    }

    /// Schemas of every registered block type, sorted by type name
    pub fn schemas(&self) -> Vec<BlockSchema> {
        self.factories.values().map(|f| f.schema()).collect()
    }
}

impl Default for BlockRegistry {
    fn default() -> Self {
        Self::new()
    }
}

struct FnFactory<F> {
    schema: BlockSchema,
    create: F,
}

impl<F> BlockFactory for FnFactory<F>
where
    F: Fn(&Value) -> anyhow::Result<BlockKind> + Send + Sync,
{
    fn schema(&self) -> BlockSchema {
        self.schema.clone()
    }

    fn create(&self, config: &Value) -> anyhow::Result<BlockKind> {
        (self.create)(config)
    }
}
