//! Repository traits describing persistence adapters.

use async_trait::async_trait;
use thiserror::Error;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::domain::entities::{AssetEntryRecord, CachePointRecord};
use crate::domain::purge::PurgeProgress;
use crate::domain::types::{AssetState, CachePointStatus};

#[derive(Debug, Error)]
pub enum RepoError {
    #[error("persistence error: {0}")]
    Persistence(String),
    #[error("duplicate record violates unique constraint `{constraint}`")]
    Duplicate { constraint: String },
    #[error("resource not found")]
    NotFound,
    #[error("invalid input: {message}")]
    InvalidInput { message: String },
    #[error("database timeout")]
    Timeout,
}

impl RepoError {
    pub fn from_persistence(err: impl std::fmt::Display) -> Self {
        Self::Persistence(err.to_string())
    }
}

#[derive(Debug, Clone)]
pub struct CreateCachePointParams {
    pub url_key: String,
    pub root_url: String,
    pub source_path: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct CreateAssetEntryParams {
    pub cache_point_id: i64,
    pub entry_key: String,
    pub local_url: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct UpdateAssetEntryParams {
    pub id: i64,
    pub state: AssetState,
    pub cached_url: String,
    pub updated_at: OffsetDateTime,
}

#[derive(Debug, Clone, Default)]
pub struct AssetQueryFilter {
    /// Substring match on the stored local URL.
    pub search: Option<String>,
}

#[async_trait]
pub trait CachePointsRepo: Send + Sync {
    /// Fails with [`RepoError::Duplicate`] when `url_key` is taken.
    async fn create_cache_point(
        &self,
        params: CreateCachePointParams,
    ) -> Result<CachePointRecord, RepoError>;

    async fn find_cache_point(&self, id: i64) -> Result<Option<CachePointRecord>, RepoError>;

    async fn find_cache_point_by_key(
        &self,
        url_key: &str,
    ) -> Result<Option<CachePointRecord>, RepoError>;

    /// Ordered by id, i.e. registration order.
    async fn list_cache_points(
        &self,
        status: Option<CachePointStatus>,
    ) -> Result<Vec<CachePointRecord>, RepoError>;

    async fn update_cache_point_status(
        &self,
        id: i64,
        status: CachePointStatus,
    ) -> Result<Option<CachePointRecord>, RepoError>;
}

#[async_trait]
pub trait AssetEntriesRepo: Send + Sync {
    /// Insert unless an entry with the same key exists; `None` means it did.
    async fn create_entry_if_absent(
        &self,
        params: CreateAssetEntryParams,
    ) -> Result<Option<AssetEntryRecord>, RepoError>;

    async fn find_entry_by_key(&self, entry_key: &str)
    -> Result<Option<AssetEntryRecord>, RepoError>;

    /// Single round trip for a batch of keys, whatever cache point owns them.
    async fn find_entries_by_keys(
        &self,
        entry_keys: &[String],
    ) -> Result<Vec<AssetEntryRecord>, RepoError>;

    /// Move an entry under another cache point.
    async fn reparent_entry(
        &self,
        id: i64,
        cache_point_id: i64,
    ) -> Result<Option<AssetEntryRecord>, RepoError>;

    async fn find_entries(&self, ids: &[i64]) -> Result<Vec<AssetEntryRecord>, RepoError>;

    /// Ordered by id ascending.
    async fn list_entries(
        &self,
        cache_point_id: i64,
        filter: &AssetQueryFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<AssetEntryRecord>, RepoError>;

    async fn count_entries(
        &self,
        cache_point_id: i64,
        filter: &AssetQueryFilter,
    ) -> Result<u64, RepoError>;

    /// Keyset walk: entries with `id > after_id`, ordered by id.
    async fn list_entries_after(
        &self,
        cache_point_id: i64,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<AssetEntryRecord>, RepoError>;

    async fn update_entry(
        &self,
        params: UpdateAssetEntryParams,
    ) -> Result<Option<AssetEntryRecord>, RepoError>;

    /// Returns whether a row was removed.
    async fn delete_entry(&self, id: i64) -> Result<bool, RepoError>;
}

/// Outcome of trying to take the purge lease for a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lease {
    Acquired,
    Held(PurgeProgress),
}

/// Ephemeral keyed storage with expiry, used for purge progress.
#[async_trait]
pub trait ProgressStore: Send + Sync {
    /// Atomically store `progress` unless a live record exists for `key`.
    async fn acquire(
        &self,
        key: &str,
        progress: &PurgeProgress,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Result<Lease, RepoError>;

    /// Live record for `key`; expired records read as absent.
    async fn load(&self, key: &str, now: OffsetDateTime)
    -> Result<Option<PurgeProgress>, RepoError>;

    /// Overwrite the record and push its expiry to `now + ttl`, provided
    /// the live record still belongs to `progress.run_id`. Returns `false`
    /// when another run holds the key.
    async fn store(
        &self,
        key: &str,
        progress: &PurgeProgress,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Result<bool, RepoError>;

    /// Drop the record if it still belongs to `run_id`.
    async fn release(&self, key: &str, run_id: Uuid) -> Result<(), RepoError>;
}
