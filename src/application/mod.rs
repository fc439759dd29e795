//! Application services layer.

pub mod admin;
pub mod assets;
pub mod classifier;
pub mod error;
pub mod pagination;
pub mod purge;
pub mod reconciler;
pub mod registry;
pub mod repos;
pub mod services;
pub mod uploads;
