//! Asset cache points: classify local static asset URLs under CDN mirror
//! roots, track their sync state, and coordinate purges.

pub mod application;
pub mod config;
pub mod domain;
pub mod infra;
pub mod util;
