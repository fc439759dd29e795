//! Operations exposed to the administrative surface.
//!
//! Authentication happens upstream; every call here only checks the
//! capability flag it is handed.

use std::sync::Arc;

use tracing::warn;

use crate::{
    application::{
        assets::AssetEntryService,
        error::CacheError,
        pagination::NumberedPage,
        purge::PurgeCoordinator,
        registry::{CachePointRegistry, Registered},
    },
    domain::{
        entities::{AssetEntryRecord, CachePointRecord},
        purge::{ProgressView, PurgeScope},
        types::{CachePointStatus, RequestedState},
    },
};

/// Who is calling, as established by the transport layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Caller {
    pub privileged: bool,
}

impl Caller {
    pub fn privileged() -> Self {
        Self { privileged: true }
    }

    pub fn anonymous() -> Self {
        Self { privileged: false }
    }

    fn require_privileged(&self, op: &'static str) -> Result<(), CacheError> {
        if self.privileged {
            Ok(())
        } else {
            warn!(op, "rejected unprivileged admin call");
            Err(CacheError::Forbidden)
        }
    }
}

#[derive(Clone)]
pub struct AdminCacheService {
    registry: Arc<CachePointRegistry>,
    assets: Arc<AssetEntryService>,
    purge: Arc<PurgeCoordinator>,
}

impl AdminCacheService {
    pub fn new(
        registry: Arc<CachePointRegistry>,
        assets: Arc<AssetEntryService>,
        purge: Arc<PurgeCoordinator>,
    ) -> Self {
        Self {
            registry,
            assets,
            purge,
        }
    }

    pub async fn get_assets(
        &self,
        caller: Caller,
        cache_point_id: i64,
        search: Option<&str>,
        page: u32,
    ) -> Result<NumberedPage<AssetEntryRecord>, CacheError> {
        caller.require_privileged("get_assets")?;
        self.assets.list(cache_point_id, search, page).await
    }

    pub async fn set_state(
        &self,
        caller: Caller,
        ids: &[i64],
        state: RequestedState,
    ) -> Result<Vec<i64>, CacheError> {
        caller.require_privileged("set_state")?;
        self.assets.set_state(ids, state).await
    }

    pub async fn purge(
        &self,
        caller: Caller,
        cache_point_id: Option<i64>,
    ) -> Result<ProgressView, CacheError> {
        caller.require_privileged("purge")?;
        self.purge.purge(PurgeScope::from_option(cache_point_id)).await
    }

    pub async fn purge_all(
        &self,
        caller: Caller,
        cache_point_id: Option<i64>,
    ) -> Result<ProgressView, CacheError> {
        caller.require_privileged("purge_all")?;
        self.purge
            .purge_all(PurgeScope::from_option(cache_point_id))
            .await
    }

    pub async fn progress(
        &self,
        caller: Caller,
        cache_point_id: Option<i64>,
    ) -> Result<ProgressView, CacheError> {
        caller.require_privileged("progress")?;
        self.purge
            .get_progress(PurgeScope::from_option(cache_point_id))
            .await
    }

    pub async fn cache_points(
        &self,
        caller: Caller,
        status: Option<CachePointStatus>,
    ) -> Result<Vec<CachePointRecord>, CacheError> {
        caller.require_privileged("cache_points")?;
        Ok(self.registry.list(status).await?)
    }

    pub async fn register_cache_point(
        &self,
        caller: Caller,
        root_url: &str,
        source_path: &str,
    ) -> Result<Registered, CacheError> {
        caller.require_privileged("register_cache_point")?;
        self.registry.register(root_url, source_path).await
    }

    pub async fn set_cache_point_status(
        &self,
        caller: Caller,
        id: i64,
        status: CachePointStatus,
    ) -> Result<CachePointRecord, CacheError> {
        caller.require_privileged("set_cache_point_status")?;
        self.registry.set_status(id, status).await
    }
}
