use axum::Json;
use axum::extract::{Extension, Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use crate::application::admin::Caller;
use crate::domain::types::{CachePointStatus, RequestedState};

use super::error::ApiError;
use super::models::*;
use super::state::ApiState;

pub async fn list_cache_points(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<CachePointListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let status = query.status.unwrap_or(CachePointStatus::Active);
    let points = state.admin.cache_points(caller, Some(status)).await?;
    Ok(Json(points))
}

pub async fn register_cache_point(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<CachePointCreateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let registered = state
        .admin
        .register_cache_point(caller, &payload.root_url, &payload.source_path)
        .await?;

    let status = if registered.was_created() {
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };
    let body = CachePointCreateResponse {
        created: registered.was_created(),
        cache_point: registered.record().clone(),
    };
    Ok((status, Json(body)))
}

pub async fn update_cache_point_status(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Json(payload): Json<CachePointStatusRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let record = state
        .admin
        .set_cache_point_status(caller, id, payload.status)
        .await?;
    Ok(Json(record))
}

pub async fn list_assets(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Path(id): Path<i64>,
    Query(query): Query<AssetListQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let page = state
        .admin
        .get_assets(caller, id, query.search.as_deref(), query.page.unwrap_or(1))
        .await?;
    Ok(Json(page))
}

pub async fn set_asset_state(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<AssetStateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let requested = RequestedState::try_from(payload.state.as_str())
        .map_err(|err| ApiError::bad_request("Unknown asset state", Some(err.to_string())))?;

    let updated = state.admin.set_state(caller, &payload.ids, requested).await?;
    Ok(Json(AssetStateResponse { updated }))
}

pub async fn purge(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<PurgeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let progress = state.admin.purge(caller, payload.cache_point_id).await?;
    Ok(Json(progress))
}

pub async fn purge_all(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Json(payload): Json<PurgeRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let progress = state
        .admin
        .purge_all(caller, payload.cache_point_id)
        .await?;
    Ok((StatusCode::ACCEPTED, Json(progress)))
}

pub async fn purge_progress(
    State(state): State<ApiState>,
    Extension(caller): Extension<Caller>,
    Query(query): Query<ProgressQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let progress = state.admin.progress(caller, query.cache_point_id).await?;
    Ok(Json(progress))
}
