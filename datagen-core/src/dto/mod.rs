//! Data Transfer Objects
//!
//! Requests accepted by the engine and partial updates written to storage.
//! DTOs are lightweight counterparts of the domain entities.

pub mod job;
pub mod pipeline;
pub mod record;
