pub mod error;
pub mod handlers;
pub mod middleware;
pub mod models;
pub mod state;

pub use state::ApiState;

use axum::{
    Router, middleware as axum_middleware,
    routing::{get, post},
};

use crate::infra::http::middleware::{log_responses, set_request_context};

pub fn build_api_router(state: ApiState) -> Router {
    let auth_state = state.clone();

    Router::new()
        .route(
            "/api/v1/cache-points",
            get(handlers::list_cache_points).post(handlers::register_cache_point),
        )
        .route(
            "/api/v1/cache-points/{id}/status",
            post(handlers::update_cache_point_status),
        )
        .route("/api/v1/cache-points/{id}/assets", get(handlers::list_assets))
        .route("/api/v1/assets/state", post(handlers::set_asset_state))
        .route("/api/v1/purge", post(handlers::purge))
        .route("/api/v1/purge-all", post(handlers::purge_all))
        .route("/api/v1/purge/progress", get(handlers::purge_progress))
        .with_state(state)
        .layer(axum_middleware::from_fn_with_state(
            auth_state,
            middleware::api_auth,
        ))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}
