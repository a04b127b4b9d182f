//! Datagen Core
//!
//! Core types and abstractions for the datagen record generation system.
//!
//! This crate contains:
//! - Domain types: Core business entities (Pipeline, Job, Record, etc.)
//! - DTOs: Data transfer objects for requests and partial updates

pub mod domain;
pub mod dto;

pub use domain::FieldMap;
