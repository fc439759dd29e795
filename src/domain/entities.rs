//! Domain entities mirrored from persistent storage.

use serde::Serialize;
use time::{Duration, OffsetDateTime};

use crate::domain::{
    types::{AssetState, CachePointStatus},
    urls,
};

/// A registered remote mirror root for one local source directory.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CachePointRecord {
    pub id: i64,
    #[serde(skip)]
    pub url_key: String,
    pub root_url: String,
    pub source_path: String,
    pub status: CachePointStatus,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
}

impl CachePointRecord {
    pub fn is_active(&self) -> bool {
        self.status == CachePointStatus::Active
    }

    /// Length of the matched root when this point covers `normalized_url`.
    pub fn prefix_match(&self, normalized_url: &str) -> Option<usize> {
        let root = urls::comparable(&self.root_url);
        urls::comparable(normalized_url)
            .starts_with(root)
            .then_some(root.len())
    }
}

/// Sync record for one file under a cache point.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AssetEntryRecord {
    pub id: i64,
    pub cache_point_id: i64,
    pub entry_key: String,
    pub local_url: String,
    pub cached_url: String,
    pub state: AssetState,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339")]
    pub updated_at: OffsetDateTime,
}

impl AssetEntryRecord {
    /// `cached_url` diverges from `local_url` once a remote copy exists.
    pub fn is_uploaded(&self) -> bool {
        self.local_url != self.cached_url
    }

    /// A pending entry that has waited out the freshness window is treated
    /// as abandoned and handed back for upload.
    pub fn is_stale(&self, now: OffsetDateTime, window: Duration) -> bool {
        self.state == AssetState::PendingUpload
            && !self.is_uploaded()
            && now - self.updated_at >= window
    }
}
