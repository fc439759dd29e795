//! Catalog of cache points with a rebuildable in-process lookup cache.

use std::collections::HashMap;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex, RwLock};

use lru::LruCache;
use tracing::{debug, info, instrument};

use crate::{
    application::{
        error::CacheError,
        repos::{CachePointsRepo, CreateCachePointParams, RepoError},
    },
    domain::{
        entities::CachePointRecord, error::DomainError, sources, types::CachePointStatus, urls,
    },
    util::{
        clock::Clock,
        lock::{mutex_lock, rw_read, rw_write},
    },
};

const SOURCE: &str = "application::registry";

/// Result of [`CachePointRegistry::register`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Registered {
    Created(CachePointRecord),
    Existing(CachePointRecord),
}

impl Registered {
    pub fn record(&self) -> &CachePointRecord {
        match self {
            Registered::Created(record) | Registered::Existing(record) => record,
        }
    }

    pub fn was_created(&self) -> bool {
        matches!(self, Registered::Created(_))
    }
}

/// Active cache points in registration order, indexed by root key and id.
#[derive(Debug, Default)]
struct Snapshot {
    points: Vec<Arc<CachePointRecord>>,
    by_key: HashMap<String, usize>,
    by_id: HashMap<i64, usize>,
}

impl Snapshot {
    fn build(mut records: Vec<CachePointRecord>) -> Self {
        records.sort_by_key(|record| record.id);
        let mut snapshot = Snapshot::default();
        for (idx, record) in records.into_iter().enumerate() {
            snapshot.by_key.insert(record.url_key.clone(), idx);
            snapshot.by_id.insert(record.id, idx);
            snapshot.points.push(Arc::new(record));
        }
        snapshot
    }

    fn get(&self, id: i64) -> Option<&Arc<CachePointRecord>> {
        self.by_id.get(&id).map(|idx| &self.points[*idx])
    }

    fn exact(&self, candidate: &str) -> Option<&Arc<CachePointRecord>> {
        let key = urls::root_key(candidate)?;
        self.by_key.get(&key).map(|idx| &self.points[*idx])
    }

    /// Longest matching root wins; on equal length the earlier id is kept.
    fn longest_prefix(&self, normalized: &str) -> Option<&Arc<CachePointRecord>> {
        let mut best: Option<(usize, &Arc<CachePointRecord>)> = None;
        for point in &self.points {
            if let Some(len) = point.prefix_match(normalized)
                && best.is_none_or(|(best_len, _)| len > best_len)
            {
                best = Some((len, point));
            }
        }
        best.map(|(_, point)| point)
    }

    fn resolve(&self, normalized: &str) -> Option<&Arc<CachePointRecord>> {
        if let Some(point) = self.exact(normalized) {
            return Some(point);
        }
        if let Some((parent, _)) = normalized.rsplit_once('/')
            && let Some(point) = self.exact(parent)
        {
            return Some(point);
        }
        self.longest_prefix(normalized)
    }
}

pub struct CachePointRegistry {
    repo: Arc<dyn CachePointsRepo>,
    clock: Arc<dyn Clock>,
    snapshot: RwLock<Option<Arc<Snapshot>>>,
    memo: Mutex<LruCache<String, Option<i64>>>,
}

impl CachePointRegistry {
    pub fn new(
        repo: Arc<dyn CachePointsRepo>,
        clock: Arc<dyn Clock>,
        lookup_cache_size: NonZeroUsize,
    ) -> Self {
        Self {
            repo,
            clock,
            snapshot: RwLock::new(None),
            memo: Mutex::new(LruCache::new(lookup_cache_size)),
        }
    }

    /// Create an active cache point unless one with the same normalized root exists.
    #[instrument(skip(self))]
    pub async fn register(
        &self,
        root_url: &str,
        source_path: &str,
    ) -> Result<Registered, CacheError> {
        let root = urls::normalize_root(root_url)
            .ok_or_else(|| DomainError::malformed_url(root_url))?;
        let url_key = urls::derive_key(urls::comparable(&root));
        let source_path = sources::normalize_source_path(source_path)?;

        if let Some(existing) = self.repo.find_cache_point_by_key(&url_key).await? {
            debug!(id = existing.id, root = %existing.root_url, "cache point already registered");
            return Ok(Registered::Existing(existing));
        }

        let params = CreateCachePointParams {
            url_key: url_key.clone(),
            root_url: root,
            source_path,
            created_at: self.clock.now(),
        };

        match self.repo.create_cache_point(params).await {
            Ok(record) => {
                info!(id = record.id, root = %record.root_url, "cache point registered");
                self.invalidate();
                Ok(Registered::Created(record))
            }
            Err(RepoError::Duplicate { .. }) => {
                let existing = self
                    .repo
                    .find_cache_point_by_key(&url_key)
                    .await?
                    .ok_or(CacheError::not_found("cache point"))?;
                Ok(Registered::Existing(existing))
            }
            Err(err) => Err(err.into()),
        }
    }

    #[instrument(skip(self))]
    pub async fn set_status(
        &self,
        id: i64,
        status: CachePointStatus,
    ) -> Result<CachePointRecord, CacheError> {
        let record = self
            .repo
            .update_cache_point_status(id, status)
            .await?
            .ok_or(CacheError::not_found("cache point"))?;
        info!(id, status = status.as_str(), "cache point status changed");
        self.invalidate();
        Ok(record)
    }

    pub async fn find(&self, id: i64) -> Result<Option<CachePointRecord>, RepoError> {
        self.repo.find_cache_point(id).await
    }

    pub async fn list(
        &self,
        status: Option<CachePointStatus>,
    ) -> Result<Vec<CachePointRecord>, RepoError> {
        self.repo.list_cache_points(status).await
    }

    /// Active cache points in registration order.
    pub async fn active_points(&self) -> Result<Vec<Arc<CachePointRecord>>, RepoError> {
        Ok(self.snapshot().await?.points.clone())
    }

    pub async fn active_ids(&self) -> Result<Vec<i64>, RepoError> {
        Ok(self
            .snapshot()
            .await?
            .points
            .iter()
            .map(|point| point.id)
            .collect())
    }

    /// Cache point covering `url`: exact root key first, then the longest prefix.
    pub async fn lookup(&self, url: &str) -> Result<Option<Arc<CachePointRecord>>, RepoError> {
        let Some(normalized) = urls::normalize(url) else {
            return Ok(None);
        };
        let memo_key = urls::comparable(&normalized).to_string();
        let snapshot = self.snapshot().await?;

        if let Some(hit) = mutex_lock(&self.memo, SOURCE, "memo_get")
            .get(&memo_key)
            .copied()
        {
            return Ok(hit.and_then(|id| snapshot.get(id).cloned()));
        }

        let found = snapshot.resolve(&normalized).cloned();
        mutex_lock(&self.memo, SOURCE, "memo_put")
            .put(memo_key, found.as_ref().map(|point| point.id));
        Ok(found)
    }

    /// Drop the lookup cache; the next read rebuilds it from storage.
    pub fn invalidate(&self) {
        *rw_write(&self.snapshot, SOURCE, "invalidate") = None;
        mutex_lock(&self.memo, SOURCE, "invalidate").clear();
    }

    async fn snapshot(&self) -> Result<Arc<Snapshot>, RepoError> {
        let cached = rw_read(&self.snapshot, SOURCE, "snapshot").clone();
        if let Some(snapshot) = cached {
            return Ok(snapshot);
        }

        let records = self
            .repo
            .list_cache_points(Some(CachePointStatus::Active))
            .await?;
        let snapshot = Arc::new(Snapshot::build(records));
        debug!(points = snapshot.points.len(), "cache point snapshot rebuilt");

        let mut slot = rw_write(&self.snapshot, SOURCE, "snapshot_fill");
        Ok(Arc::clone(slot.get_or_insert(snapshot)))
    }
}

#[cfg(test)]
mod tests {
    use time::macros::datetime;

    use super::*;

    fn point(id: i64, root: &str) -> CachePointRecord {
        CachePointRecord {
            id,
            url_key: urls::root_key(root).unwrap(),
            root_url: urls::normalize_root(root).unwrap(),
            source_path: "themes/demo".into(),
            status: CachePointStatus::Active,
            created_at: datetime!(2026-01-01 00:00 UTC),
        }
    }

    #[test]
    fn longest_prefix_prefers_deeper_root() {
        let snapshot = Snapshot::build(vec![
            point(2, "/wp-content/themes/demo/assets/"),
            point(1, "/wp-content/themes/"),
        ]);
        let hit = snapshot
            .resolve("/wp-content/themes/demo/assets/css/site.css")
            .unwrap();
        assert_eq!(hit.id, 2);

        let hit = snapshot.resolve("/wp-content/themes/other/style.css").unwrap();
        assert_eq!(hit.id, 1);
    }

    #[test]
    fn exact_parent_key_matches_before_scan() {
        let snapshot = Snapshot::build(vec![point(1, "https://cdn.example.com/static/")]);
        let hit = snapshot
            .resolve("http://cdn.example.com/static/app.js")
            .unwrap();
        assert_eq!(hit.id, 1);
    }

    #[test]
    fn unmatched_url_resolves_to_none() {
        let snapshot = Snapshot::build(vec![point(1, "/wp-content/themes/demo/")]);
        assert!(snapshot.resolve("/wp-content/plugins/x/y.js").is_none());
    }
}
