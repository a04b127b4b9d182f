//! Core domain types
//!
//! This module contains the core domain structures used across datagen.
//! These types are shared between the engine (which produces them) and any
//! outer layer that persists or serves them.

pub mod block;
pub mod job;
pub mod pipeline;
pub mod record;
pub mod seed;
pub mod usage;

/// Field name to value mapping used for seeds, block results and accumulated state
pub type FieldMap = serde_json::Map<String, serde_json::Value>;
