pub mod api;
pub(crate) mod middleware;
mod public;

pub use api::{ApiState, build_api_router};
pub use public::{HttpState, ReconcileRequest, ReconcileResponse, build_public_router};
