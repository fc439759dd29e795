//! Purge scope and progress bookkeeping.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

/// What a purge covers: one cache point, or every active one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PurgeScope {
    All,
    CachePoint(i64),
}

impl PurgeScope {
    pub fn from_option(cache_point_id: Option<i64>) -> Self {
        match cache_point_id {
            Some(id) => PurgeScope::CachePoint(id),
            None => PurgeScope::All,
        }
    }
}

/// Key under which a cache point's progress record is stored.
pub fn progress_key(cache_point_id: i64) -> String {
    format!("purge:{cache_point_id}")
}

/// Live progress of one purge run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PurgeProgress {
    /// Owner of the lease; only this run may update or release it.
    pub run_id: Uuid,
    pub total: u64,
    pub pending: u64,
    #[serde(with = "time::serde::rfc3339")]
    pub started_at: OffsetDateTime,
    pub current_parent: i64,
}

impl PurgeProgress {
    pub fn new(total: u64, started_at: OffsetDateTime, current_parent: i64) -> Self {
        Self {
            run_id: Uuid::new_v4(),
            total,
            pending: total,
            started_at,
            current_parent,
        }
    }

    /// Record `processed` entries. `pending` never increases within a run.
    pub fn advance(&mut self, processed: u64) {
        self.pending = self.pending.saturating_sub(processed);
    }

    pub fn finish(&mut self) {
        self.pending = 0;
    }

    pub fn view(&self) -> ProgressView {
        ProgressView::new(self.total, self.pending)
    }
}

/// Poller-facing summary: `{total, pending, percent}`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ProgressView {
    pub total: u64,
    pub pending: u64,
    pub percent: f64,
}

impl ProgressView {
    pub fn new(total: u64, pending: u64) -> Self {
        Self {
            total,
            pending,
            percent: percent_complete(total, pending),
        }
    }

    /// Nothing in flight.
    pub fn idle() -> Self {
        Self::new(0, 0)
    }

    /// Sum several per-point views into one.
    pub fn aggregate(views: impl IntoIterator<Item = ProgressView>) -> Self {
        let (total, pending) = views
            .into_iter()
            .fold((0u64, 0u64), |(total, pending), view| {
                (total + view.total, pending + view.pending)
            });
        Self::new(total, pending)
    }
}

/// `(total - pending) / total * 100`; an empty run counts as complete.
pub fn percent_complete(total: u64, pending: u64) -> f64 {
    if total == 0 {
        return 100.0;
    }
    let done = total.saturating_sub(pending) as f64;
    done / total as f64 * 100.0
}
