use std::{collections::HashMap, sync::Arc};

use axum::{
    Json, Router,
    extract::{Path, State},
    http::{HeaderValue, StatusCode, header},
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use serde::{Deserialize, Serialize};

use crate::application::{
    error::ErrorReport,
    reconciler::SyncReconciler,
    uploads::{UploadOutcome, UploadService},
};
use crate::infra::storage::Storage;

use super::api::error::ApiError;
use super::middleware::{log_responses, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub reconciler: SyncReconciler,
    pub uploads: Arc<UploadService>,
    pub storage: Storage,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReconcileRequest {
    pub urls: Vec<String>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ReconcileResponse {
    pub urls: HashMap<String, String>,
}

pub fn build_public_router(state: HttpState) -> Router {
    Router::new()
        .route("/reconcile", post(reconcile))
        .route("/upload/{key}", get(trigger_upload))
        .route("/health", get(health))
        .with_state(state)
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

async fn reconcile(
    State(state): State<HttpState>,
    Json(payload): Json<ReconcileRequest>,
) -> Json<ReconcileResponse> {
    let urls = state.reconciler.reconcile(&payload.urls).await;
    Json(ReconcileResponse { urls })
}

async fn trigger_upload(
    State(state): State<HttpState>,
    Path(key): Path<String>,
) -> Result<Response, ApiError> {
    let outcome = state.uploads.trigger(&key).await?;
    Ok(redirect(&outcome))
}

fn redirect(outcome: &UploadOutcome) -> Response {
    match HeaderValue::from_str(outcome.redirect_target()) {
        Ok(location) => (
            StatusCode::TEMPORARY_REDIRECT,
            [
                (header::LOCATION, location),
                (header::CACHE_CONTROL, HeaderValue::from_static("no-store")),
            ],
        )
            .into_response(),
        Err(err) => {
            let mut response = StatusCode::INTERNAL_SERVER_ERROR.into_response();
            ErrorReport::from_error(
                "infra::http::upload",
                StatusCode::INTERNAL_SERVER_ERROR,
                &err,
            )
            .attach(&mut response);
            response
        }
    }
}

async fn health(State(state): State<HttpState>) -> Response {
    match state.storage.health_check().await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(err) => {
            let mut response = StatusCode::SERVICE_UNAVAILABLE.into_response();
            ErrorReport::from_error("infra::http::health", StatusCode::SERVICE_UNAVAILABLE, &err)
                .attach(&mut response);
            response
        }
    }
}
