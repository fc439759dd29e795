//! Bulk re-evaluation of cache points with at most one run per point.
//!
//! A run holds a lease on `purge:{id}` in the progress store. The lease is
//! released when the walk ends; its TTL, refreshed on every progress update,
//! only matters when a run dies without releasing it.

use std::sync::Arc;

use metrics::counter;
use time::Duration;
use tracing::{Instrument, debug, info, instrument, warn};

use crate::{
    application::{
        assets::AssetEntryService,
        error::CacheError,
        registry::CachePointRegistry,
        repos::{AssetEntriesRepo, AssetQueryFilter, Lease, ProgressStore},
    },
    domain::purge::{ProgressView, PurgeProgress, PurgeScope, progress_key},
    util::clock::Clock,
};

const METRIC_PURGE_STARTED: &str = "cachepoint_purge_started_total";

#[derive(Debug, Clone, Copy)]
pub struct PurgeSettings {
    pub ttl: Duration,
    pub chunk_size: u32,
}

/// Outcome of trying to start a run for one cache point.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PurgeStart {
    Started(PurgeProgress),
    InFlight(PurgeProgress),
}

impl PurgeStart {
    pub fn progress(&self) -> &PurgeProgress {
        match self {
            PurgeStart::Started(progress) | PurgeStart::InFlight(progress) => progress,
        }
    }
}

/// How a walk ended without error.
enum Walk {
    Finished,
    Superseded,
}

pub struct PurgeCoordinator {
    registry: Arc<CachePointRegistry>,
    assets: Arc<AssetEntryService>,
    entries: Arc<dyn AssetEntriesRepo>,
    store: Arc<dyn ProgressStore>,
    clock: Arc<dyn Clock>,
    settings: PurgeSettings,
}

impl PurgeCoordinator {
    pub fn new(
        registry: Arc<CachePointRegistry>,
        assets: Arc<AssetEntryService>,
        entries: Arc<dyn AssetEntriesRepo>,
        store: Arc<dyn ProgressStore>,
        clock: Arc<dyn Clock>,
        settings: PurgeSettings,
    ) -> Self {
        Self {
            registry,
            assets,
            entries,
            store,
            clock,
            settings,
        }
    }

    /// Take the lease for `cache_point_id`, or report the run already holding it.
    #[instrument(skip(self))]
    pub async fn begin(&self, cache_point_id: i64) -> Result<PurgeStart, CacheError> {
        let key = progress_key(cache_point_id);
        let now = self.clock.now();

        if let Some(live) = self.store.load(&key, now).await? {
            debug!(cache_point_id, pending = live.pending, "purge already in flight");
            return Ok(PurgeStart::InFlight(live));
        }

        if self.registry.find(cache_point_id).await?.is_none() {
            return Err(CacheError::not_found("cache point"));
        }

        let total = self
            .entries
            .count_entries(cache_point_id, &AssetQueryFilter::default())
            .await?;
        let progress = PurgeProgress::new(total, now, cache_point_id);

        match self
            .store
            .acquire(&key, &progress, now, self.settings.ttl)
            .await?
        {
            Lease::Acquired => {
                counter!(METRIC_PURGE_STARTED).increment(1);
                info!(cache_point_id, total, "purge started");
                Ok(PurgeStart::Started(progress))
            }
            Lease::Held(live) => Ok(PurgeStart::InFlight(live)),
        }
    }

    /// Walk every entry under the cache point and release the lease.
    ///
    /// The lease is released on failure too, so a later request can retry.
    /// A run whose lease was taken over after expiry stops at the next
    /// progress update and leaves the newer run's record alone.
    #[instrument(skip(self, progress), fields(run_id = %progress.run_id))]
    pub async fn drive(
        &self,
        cache_point_id: i64,
        mut progress: PurgeProgress,
    ) -> Result<PurgeProgress, CacheError> {
        let key = progress_key(cache_point_id);
        let walked = self.walk(&key, cache_point_id, &mut progress).await;

        if let Ok(Walk::Superseded) = walked {
            warn!(
                cache_point_id,
                pending = progress.pending,
                "purge lease taken over by a newer run; stopping"
            );
            return Ok(progress);
        }

        if let Err(err) = self.store.release(&key, progress.run_id).await {
            warn!(cache_point_id, error = %err, "failed to release purge lease; it will expire");
        }

        walked?;
        progress.finish();
        info!(cache_point_id, total = progress.total, "purge completed");
        Ok(progress)
    }

    async fn walk(
        &self,
        key: &str,
        cache_point_id: i64,
        progress: &mut PurgeProgress,
    ) -> Result<Walk, CacheError> {
        let mut after_id = 0;
        loop {
            let chunk = self
                .entries
                .list_entries_after(cache_point_id, after_id, self.settings.chunk_size)
                .await?;
            let Some(last) = chunk.last() else {
                return Ok(Walk::Finished);
            };
            after_id = last.id;

            let now = self.clock.now();
            for entry in &chunk {
                self.assets.force_reevaluate(entry, now).await?;
            }

            progress.advance(chunk.len() as u64);
            if !self
                .store
                .store(key, progress, now, self.settings.ttl)
                .await?
            {
                return Ok(Walk::Superseded);
            }
            debug!(cache_point_id, pending = progress.pending, "purge progress");
        }
    }

    /// Run the purge to completion inside the calling task.
    #[instrument(skip(self))]
    pub async fn purge(&self, scope: PurgeScope) -> Result<ProgressView, CacheError> {
        let mut views = Vec::new();
        for cache_point_id in self.scope_ids(scope).await? {
            let view = match self.begin(cache_point_id).await? {
                PurgeStart::Started(progress) => self.drive(cache_point_id, progress).await?.view(),
                PurgeStart::InFlight(progress) => progress.view(),
            };
            views.push(view);
        }
        Ok(ProgressView::aggregate(views))
    }

    /// Start the purge and continue it in a background task.
    ///
    /// Returns the progress snapshot taken at start.
    #[instrument(skip(self))]
    pub async fn purge_all(self: &Arc<Self>, scope: PurgeScope) -> Result<ProgressView, CacheError> {
        let mut views = Vec::new();
        for cache_point_id in self.scope_ids(scope).await? {
            let start = self.begin(cache_point_id).await?;
            views.push(start.progress().view());

            if let PurgeStart::Started(progress) = start {
                let coordinator = Arc::clone(self);
                tokio::spawn(
                    async move {
                        if let Err(err) = coordinator.drive(cache_point_id, progress).await {
                            warn!(cache_point_id, error = %err, "background purge failed");
                        }
                    }
                    .in_current_span(),
                );
            }
        }
        Ok(ProgressView::aggregate(views))
    }

    /// Sum of live progress records under `scope`; idle when none are live.
    pub async fn get_progress(&self, scope: PurgeScope) -> Result<ProgressView, CacheError> {
        let now = self.clock.now();
        let mut views = Vec::new();
        for cache_point_id in self.scope_ids(scope).await? {
            if let Some(live) = self.store.load(&progress_key(cache_point_id), now).await? {
                views.push(live.view());
            }
        }

        if views.is_empty() {
            return Ok(ProgressView::idle());
        }
        Ok(ProgressView::aggregate(views))
    }

    async fn scope_ids(&self, scope: PurgeScope) -> Result<Vec<i64>, CacheError> {
        match scope {
            PurgeScope::CachePoint(id) => Ok(vec![id]),
            PurgeScope::All => Ok(self.registry.active_ids().await?),
        }
    }
}
