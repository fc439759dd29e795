//! Wiring of the cache services over a set of repositories.

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::Arc;

use time::Duration;

use crate::{
    application::{
        admin::AdminCacheService,
        assets::{AssetEntryService, AssetSettings},
        purge::{PurgeCoordinator, PurgeSettings},
        reconciler::SyncReconciler,
        registry::CachePointRegistry,
        repos::{AssetEntriesRepo, CachePointsRepo, ProgressStore},
        uploads::{UploadService, Uploader},
    },
    config::Settings,
    util::clock::Clock,
};

#[derive(Clone)]
pub struct Repositories {
    pub cache_points: Arc<dyn CachePointsRepo>,
    pub asset_entries: Arc<dyn AssetEntriesRepo>,
    pub progress: Arc<dyn ProgressStore>,
}

#[derive(Debug, Clone)]
pub struct ServiceConfig {
    pub assets: AssetSettings,
    pub purge: PurgeSettings,
    pub lookup_cache_size: NonZeroUsize,
    pub install_root: PathBuf,
}

impl ServiceConfig {
    pub fn from_settings(settings: &Settings) -> Self {
        let cache = &settings.cache;
        Self {
            assets: AssetSettings {
                freshness_window: to_time(cache.freshness_window),
                batch_limit: cache.batch_limit.get() as usize,
                page_size: cache.page_size.get(),
                upload_endpoint: settings.delivery.upload_endpoint.clone(),
            },
            purge: PurgeSettings {
                ttl: to_time(cache.purge_ttl),
                chunk_size: cache.purge_chunk_size.get(),
            },
            lookup_cache_size: cache.lookup_cache_size,
            install_root: settings.delivery.install_root.clone(),
        }
    }
}

fn to_time(duration: std::time::Duration) -> Duration {
    Duration::try_from(duration).unwrap_or(Duration::MAX)
}

#[derive(Clone)]
pub struct CacheServices {
    pub registry: Arc<CachePointRegistry>,
    pub assets: Arc<AssetEntryService>,
    pub reconciler: SyncReconciler,
    pub purge: Arc<PurgeCoordinator>,
    pub uploads: Arc<UploadService>,
    pub admin: AdminCacheService,
}

impl CacheServices {
    pub fn new(
        repos: Repositories,
        uploader: Option<Arc<dyn Uploader>>,
        clock: Arc<dyn Clock>,
        config: ServiceConfig,
    ) -> Self {
        let registry = Arc::new(CachePointRegistry::new(
            Arc::clone(&repos.cache_points),
            Arc::clone(&clock),
            config.lookup_cache_size,
        ));
        let assets = Arc::new(AssetEntryService::new(
            Arc::clone(&registry),
            Arc::clone(&repos.asset_entries),
            uploader.clone(),
            Arc::clone(&clock),
            config.assets,
        ));
        let purge = Arc::new(PurgeCoordinator::new(
            Arc::clone(&registry),
            Arc::clone(&assets),
            Arc::clone(&repos.asset_entries),
            Arc::clone(&repos.progress),
            clock,
            config.purge,
        ));
        let uploads = Arc::new(UploadService::new(
            Arc::clone(&registry),
            Arc::clone(&assets),
            uploader,
            config.install_root,
        ));

        Self {
            reconciler: SyncReconciler::new(Arc::clone(&assets)),
            admin: AdminCacheService::new(
                Arc::clone(&registry),
                Arc::clone(&assets),
                Arc::clone(&purge),
            ),
            registry,
            assets,
            purge,
            uploads,
        }
    }
}
