use async_trait::async_trait;
use time::{Duration, OffsetDateTime};
use uuid::Uuid;

use crate::{
    application::repos::{Lease, ProgressStore, RepoError},
    domain::purge::PurgeProgress,
};

use super::{PostgresRepositories, map_sqlx_error};

/// Attempts before giving up when a lease is released between the
/// failed insert and the follow-up read.
const ACQUIRE_ATTEMPTS: usize = 3;

#[derive(sqlx::FromRow)]
struct ProgressRow {
    run_id: Uuid,
    total: i64,
    pending: i64,
    started_at: OffsetDateTime,
    current_parent: i64,
}

impl TryFrom<ProgressRow> for PurgeProgress {
    type Error = RepoError;

    fn try_from(row: ProgressRow) -> Result<Self, Self::Error> {
        Ok(Self {
            run_id: row.run_id,
            total: PostgresRepositories::convert_count(row.total)?,
            pending: PostgresRepositories::convert_count(row.pending)?,
            started_at: row.started_at,
            current_parent: row.current_parent,
        })
    }
}

fn count_param(value: u64) -> Result<i64, RepoError> {
    i64::try_from(value).map_err(|_| RepoError::InvalidInput {
        message: "progress count exceeds supported range".to_string(),
    })
}

#[async_trait]
impl ProgressStore for PostgresRepositories {
    async fn acquire(
        &self,
        key: &str,
        progress: &PurgeProgress,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Result<Lease, RepoError> {
        for _ in 0..ACQUIRE_ATTEMPTS {
            let inserted: Option<String> = sqlx::query_scalar(
                "INSERT INTO purge_progress \
                     (scope, run_id, total, pending, started_at, current_parent, expires_at) \
                 VALUES ($1, $8, $2, $3, $4, $5, $6) \
                 ON CONFLICT (scope) DO UPDATE SET \
                     run_id = EXCLUDED.run_id, \
                     total = EXCLUDED.total, \
                     pending = EXCLUDED.pending, \
                     started_at = EXCLUDED.started_at, \
                     current_parent = EXCLUDED.current_parent, \
                     expires_at = EXCLUDED.expires_at \
                 WHERE purge_progress.expires_at <= $7 \
                 RETURNING scope",
            )
            .bind(key)
            .bind(count_param(progress.total)?)
            .bind(count_param(progress.pending)?)
            .bind(progress.started_at)
            .bind(progress.current_parent)
            .bind(now + ttl)
            .bind(now)
            .bind(progress.run_id)
            .fetch_optional(self.pool())
            .await
            .map_err(map_sqlx_error)?;

            if inserted.is_some() {
                return Ok(Lease::Acquired);
            }
            if let Some(live) = self.load(key, now).await? {
                return Ok(Lease::Held(live));
            }
        }

        Err(RepoError::from_persistence(format!(
            "could not settle lease for `{key}`"
        )))
    }

    async fn load(
        &self,
        key: &str,
        now: OffsetDateTime,
    ) -> Result<Option<PurgeProgress>, RepoError> {
        let row = sqlx::query_as::<_, ProgressRow>(
            "SELECT run_id, total, pending, started_at, current_parent FROM purge_progress \
             WHERE scope = $1 AND expires_at > $2",
        )
        .bind(key)
        .bind(now)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        row.map(PurgeProgress::try_from).transpose()
    }

    async fn store(
        &self,
        key: &str,
        progress: &PurgeProgress,
        now: OffsetDateTime,
        ttl: Duration,
    ) -> Result<bool, RepoError> {
        let result = sqlx::query(
            "UPDATE purge_progress SET \
                 total = $3, pending = $4, started_at = $5, current_parent = $6, expires_at = $7 \
             WHERE scope = $1 AND run_id = $2",
        )
        .bind(key)
        .bind(progress.run_id)
        .bind(count_param(progress.total)?)
        .bind(count_param(progress.pending)?)
        .bind(progress.started_at)
        .bind(progress.current_parent)
        .bind(now + ttl)
        .execute(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }

    async fn release(&self, key: &str, run_id: Uuid) -> Result<(), RepoError> {
        sqlx::query("DELETE FROM purge_progress WHERE scope = $1 AND run_id = $2")
            .bind(key)
            .bind(run_id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(())
    }
}
