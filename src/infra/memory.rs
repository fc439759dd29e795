//! Process-local storage used when no database is configured, and in tests.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};
use time::{Duration, OffsetDateTime};
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::{
    application::repos::{
        AssetEntriesRepo, AssetQueryFilter, CachePointsRepo, CreateAssetEntryParams,
        CreateCachePointParams, Lease, ProgressStore, RepoError, UpdateAssetEntryParams,
    },
    domain::{
        entities::{AssetEntryRecord, CachePointRecord},
        purge::PurgeProgress,
        types::{AssetState, CachePointStatus},
    },
};

#[derive(Default)]
struct State {
    cache_points: BTreeMap<i64, CachePointRecord>,
    point_keys: HashMap<String, i64>,
    entries: BTreeMap<i64, AssetEntryRecord>,
    entry_keys: HashMap<String, i64>,
    next_point_id: i64,
    next_entry_id: i64,
}

impl State {
    fn matching<'a>(
        &'a self,
        cache_point_id: i64,
        filter: &'a AssetQueryFilter,
    ) -> impl Iterator<Item = &'a AssetEntryRecord> + 'a {
        let needle = filter.search.as_ref().map(|term| term.to_lowercase());
        self.entries.values().filter(move |entry| {
            entry.cache_point_id == cache_point_id
                && needle
                    .as_ref()
                    .is_none_or(|needle| entry.local_url.to_lowercase().contains(needle))
        })
    }
}

#[derive(Clone, Default)]
pub struct InMemoryRepositories {
    state: Arc<RwLock<State>>,
}

impl InMemoryRepositories {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn health_check(&self) -> Result<(), RepoError> {
        Ok(())
    }
}

#[async_trait]
impl CachePointsRepo for InMemoryRepositories {
    async fn create_cache_point(
        &self,
        params: CreateCachePointParams,
    ) -> Result<CachePointRecord, RepoError> {
        let mut state = self.state.write().await;
        if state.point_keys.contains_key(&params.url_key) {
            return Err(RepoError::Duplicate {
                constraint: "cache_points_url_key_key".to_string(),
            });
        }

        state.next_point_id += 1;
        let record = CachePointRecord {
            id: state.next_point_id,
            url_key: params.url_key,
            root_url: params.root_url,
            source_path: params.source_path,
            status: CachePointStatus::Active,
            created_at: params.created_at,
        };
        state.point_keys.insert(record.url_key.clone(), record.id);
        state.cache_points.insert(record.id, record.clone());
        Ok(record)
    }

    async fn find_cache_point(&self, id: i64) -> Result<Option<CachePointRecord>, RepoError> {
        Ok(self.state.read().await.cache_points.get(&id).cloned())
    }

    async fn find_cache_point_by_key(
        &self,
        url_key: &str,
    ) -> Result<Option<CachePointRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .point_keys
            .get(url_key)
            .and_then(|id| state.cache_points.get(id))
            .cloned())
    }

    async fn list_cache_points(
        &self,
        status: Option<CachePointStatus>,
    ) -> Result<Vec<CachePointRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .cache_points
            .values()
            .filter(|record| status.is_none_or(|status| record.status == status))
            .cloned()
            .collect())
    }

    async fn update_cache_point_status(
        &self,
        id: i64,
        status: CachePointStatus,
    ) -> Result<Option<CachePointRecord>, RepoError> {
        let mut state = self.state.write().await;
        Ok(state.cache_points.get_mut(&id).map(|record| {
            record.status = status;
            record.clone()
        }))
    }
}

#[async_trait]
impl AssetEntriesRepo for InMemoryRepositories {
    async fn create_entry_if_absent(
        &self,
        params: CreateAssetEntryParams,
    ) -> Result<Option<AssetEntryRecord>, RepoError> {
        let mut state = self.state.write().await;
        if state.entry_keys.contains_key(&params.entry_key) {
            return Ok(None);
        }
        if !state.cache_points.contains_key(&params.cache_point_id) {
            return Err(RepoError::InvalidInput {
                message: format!("cache point {} does not exist", params.cache_point_id),
            });
        }

        state.next_entry_id += 1;
        let record = AssetEntryRecord {
            id: state.next_entry_id,
            cache_point_id: params.cache_point_id,
            entry_key: params.entry_key,
            cached_url: params.local_url.clone(),
            local_url: params.local_url,
            state: AssetState::PendingUpload,
            created_at: params.created_at,
            updated_at: params.created_at,
        };
        state.entry_keys.insert(record.entry_key.clone(), record.id);
        state.entries.insert(record.id, record.clone());
        Ok(Some(record))
    }

    async fn find_entry_by_key(
        &self,
        entry_key: &str,
    ) -> Result<Option<AssetEntryRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .entry_keys
            .get(entry_key)
            .and_then(|id| state.entries.get(id))
            .cloned())
    }

    async fn find_entries_by_keys(
        &self,
        entry_keys: &[String],
    ) -> Result<Vec<AssetEntryRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(entry_keys
            .iter()
            .filter_map(|key| state.entry_keys.get(key))
            .filter_map(|id| state.entries.get(id))
            .cloned()
            .collect())
    }

    async fn reparent_entry(
        &self,
        id: i64,
        cache_point_id: i64,
    ) -> Result<Option<AssetEntryRecord>, RepoError> {
        let mut state = self.state.write().await;
        if !state.cache_points.contains_key(&cache_point_id) {
            return Err(RepoError::InvalidInput {
                message: format!("cache point {cache_point_id} does not exist"),
            });
        }
        Ok(state.entries.get_mut(&id).map(|entry| {
            entry.cache_point_id = cache_point_id;
            entry.clone()
        }))
    }

    async fn find_entries(&self, ids: &[i64]) -> Result<Vec<AssetEntryRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(ids
            .iter()
            .filter_map(|id| state.entries.get(id))
            .cloned()
            .collect())
    }

    async fn list_entries(
        &self,
        cache_point_id: i64,
        filter: &AssetQueryFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<AssetEntryRecord>, RepoError> {
        let state = self.state.read().await;
        let skip = usize::try_from(offset).unwrap_or(usize::MAX);
        Ok(state
            .matching(cache_point_id, filter)
            .skip(skip)
            .take(limit as usize)
            .cloned()
            .collect())
    }

    async fn count_entries(
        &self,
        cache_point_id: i64,
        filter: &AssetQueryFilter,
    ) -> Result<u64, RepoError> {
        let state = self.state.read().await;
        Ok(state.matching(cache_point_id, filter).count() as u64)
    }

    async fn list_entries_after(
        &self,
        cache_point_id: i64,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<AssetEntryRecord>, RepoError> {
        let state = self.state.read().await;
        Ok(state
            .entries
            .range(after_id.saturating_add(1)..)
            .map(|(_, entry)| entry)
            .filter(|entry| entry.cache_point_id == cache_point_id)
            .take(limit.max(1) as usize)
            .cloned()
            .collect())
    }

    async fn update_entry(
        &self,
        params: UpdateAssetEntryParams,
    ) -> Result<Option<AssetEntryRecord>, RepoError> {
        let mut state = self.state.write().await;
        Ok(state.entries.get_mut(&params.id).map(|entry| {
            entry.state = params.state;
            entry.cached_url = params.cached_url;
            entry.updated_at = params.updated_at;
            entry.clone()
        }))
    }

    async fn delete_entry(&self, id: i64) -> Result<bool, RepoError> {
        let mut state = self.state.write().await;
        match state.entries.remove(&id) {
            Some(entry) => {
                state.entry_keys.remove(&entry.entry_key);
                Ok(true)
            }
            None => Ok(false),
        }
    }
}

#[derive(Debug, Clone)]
struct StoredProgress {
    progress: PurgeProgress,
    expires_at: OffsetDateTime,
}

/// TTL'd progress records held in a concurrent map.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProgressStore {
    records: Arc<DashMap<String, StoredProgress>>,
}

impl InMemoryProgressStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProgressStore for InMemoryProgressStore {
    async fn acquire(
        &self,
        key: &str,
        progress: &PurgeProgress,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Result<Lease, RepoError> {
        let fresh = StoredProgress {
            progress: progress.clone(),
            expires_at: now + ttl,
        };
        match self.records.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().expires_at > now {
                    return Ok(Lease::Held(occupied.get().progress.clone()));
                }
                occupied.insert(fresh);
                Ok(Lease::Acquired)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(fresh);
                Ok(Lease::Acquired)
            }
        }
    }

    async fn load(
        &self,
        key: &str,
        now: OffsetDateTime,
    ) -> Result<Option<PurgeProgress>, RepoError> {
        Ok(self
            .records
            .get(key)
            .filter(|record| record.expires_at > now)
            .map(|record| record.progress.clone()))
    }

    async fn store(
        &self,
        key: &str,
        progress: &PurgeProgress,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Result<bool, RepoError> {
        match self.records.get_mut(key) {
            Some(mut record) if record.progress.run_id == progress.run_id => {
                record.progress = progress.clone();
                record.expires_at = now + ttl;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    async fn release(&self, key: &str, run_id: Uuid) -> Result<(), RepoError> {
        self.records
            .remove_if(key, |_, record| record.progress.run_id == run_id);
        Ok(())
    }
}
