//! Domain layer types and invariants.

pub mod entities;
pub mod error;
pub mod purge;
pub mod sources;
pub mod types;
pub mod urls;
