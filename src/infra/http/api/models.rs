use serde::{Deserialize, Serialize};

use crate::domain::{entities::CachePointRecord, types::CachePointStatus};

#[derive(Debug, Deserialize, Serialize)]
pub struct CachePointCreateRequest {
    pub root_url: String,
    pub source_path: String,
}

#[derive(Debug, Serialize)]
pub struct CachePointCreateResponse {
    pub created: bool,
    pub cache_point: CachePointRecord,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CachePointStatusRequest {
    pub status: CachePointStatus,
}

#[derive(Debug, Deserialize)]
pub struct CachePointListQuery {
    pub status: Option<CachePointStatus>,
}

#[derive(Debug, Deserialize)]
pub struct AssetListQuery {
    pub search: Option<String>,
    pub page: Option<u32>,
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AssetStateRequest {
    pub ids: Vec<i64>,
    pub state: String,
}

#[derive(Debug, Serialize)]
pub struct AssetStateResponse {
    pub updated: Vec<i64>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct PurgeRequest {
    #[serde(default)]
    pub cache_point_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct ProgressQuery {
    pub cache_point_id: Option<i64>,
}
