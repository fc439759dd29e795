use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::repos::{
        AssetEntriesRepo, AssetQueryFilter, CreateAssetEntryParams, RepoError,
        UpdateAssetEntryParams,
    },
    domain::{entities::AssetEntryRecord, types::AssetState},
};

use super::{PostgresRepositories, map_sqlx_error};

const ENTRY_COLUMNS: &str =
    "id, cache_point_id, entry_key, local_url, cached_url, state, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct AssetEntryRow {
    id: i64,
    cache_point_id: i64,
    entry_key: String,
    local_url: String,
    cached_url: String,
    state: AssetState,
    created_at: OffsetDateTime,
    updated_at: OffsetDateTime,
}

impl From<AssetEntryRow> for AssetEntryRecord {
    fn from(row: AssetEntryRow) -> Self {
        Self {
            id: row.id,
            cache_point_id: row.cache_point_id,
            entry_key: row.entry_key,
            local_url: row.local_url,
            cached_url: row.cached_url,
            state: row.state,
            created_at: row.created_at,
            updated_at: row.updated_at,
        }
    }
}

fn to_i64(value: u64, what: &str) -> Result<i64, RepoError> {
    i64::try_from(value).map_err(|_| RepoError::InvalidInput {
        message: format!("{what} exceeds supported range"),
    })
}

#[async_trait]
impl AssetEntriesRepo for PostgresRepositories {
    async fn create_entry_if_absent(
        &self,
        params: CreateAssetEntryParams,
    ) -> Result<Option<AssetEntryRecord>, RepoError> {
        let row = sqlx::query_as::<_, AssetEntryRow>(&format!(
            "INSERT INTO asset_entries \
                 (cache_point_id, entry_key, local_url, cached_url, state, created_at, updated_at) \
             VALUES ($1, $2, $3, $3, $4, $5, $5) \
             ON CONFLICT (entry_key) DO NOTHING \
             RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(params.cache_point_id)
        .bind(&params.entry_key)
        .bind(&params.local_url)
        .bind(AssetState::PendingUpload)
        .bind(params.created_at)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(AssetEntryRecord::from))
    }

    async fn find_entry_by_key(
        &self,
        entry_key: &str,
    ) -> Result<Option<AssetEntryRecord>, RepoError> {
        let row = sqlx::query_as::<_, AssetEntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM asset_entries WHERE entry_key = $1"
        ))
        .bind(entry_key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(AssetEntryRecord::from))
    }

    async fn find_entries_by_keys(
        &self,
        entry_keys: &[String],
    ) -> Result<Vec<AssetEntryRecord>, RepoError> {
        if entry_keys.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, AssetEntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM asset_entries WHERE entry_key = ANY($1)"
        ))
        .bind(entry_keys)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(AssetEntryRecord::from).collect())
    }

    async fn reparent_entry(
        &self,
        id: i64,
        cache_point_id: i64,
    ) -> Result<Option<AssetEntryRecord>, RepoError> {
        let row = sqlx::query_as::<_, AssetEntryRow>(&format!(
            "UPDATE asset_entries SET cache_point_id = $2 \
             WHERE id = $1 RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(id)
        .bind(cache_point_id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(AssetEntryRecord::from))
    }

    async fn find_entries(&self, ids: &[i64]) -> Result<Vec<AssetEntryRecord>, RepoError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let rows = sqlx::query_as::<_, AssetEntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM asset_entries WHERE id = ANY($1) ORDER BY id ASC"
        ))
        .bind(ids)
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(AssetEntryRecord::from).collect())
    }

    async fn list_entries(
        &self,
        cache_point_id: i64,
        filter: &AssetQueryFilter,
        offset: u64,
        limit: u32,
    ) -> Result<Vec<AssetEntryRecord>, RepoError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {ENTRY_COLUMNS} FROM asset_entries WHERE cache_point_id = "
        ));
        qb.push_bind(cache_point_id);
        PostgresRepositories::apply_asset_filter(&mut qb, filter);
        qb.push(" ORDER BY id ASC LIMIT ");
        qb.push_bind(i64::from(limit.clamp(1, 200)));
        qb.push(" OFFSET ");
        qb.push_bind(to_i64(offset, "offset")?);

        let rows = qb
            .build_query_as::<AssetEntryRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(AssetEntryRecord::from).collect())
    }

    async fn count_entries(
        &self,
        cache_point_id: i64,
        filter: &AssetQueryFilter,
    ) -> Result<u64, RepoError> {
        let mut qb: QueryBuilder<'_, Postgres> =
            QueryBuilder::new("SELECT COUNT(*) FROM asset_entries WHERE cache_point_id = ");
        qb.push_bind(cache_point_id);
        PostgresRepositories::apply_asset_filter(&mut qb, filter);

        let count: i64 = qb
            .build_query_scalar()
            .fetch_one(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        PostgresRepositories::convert_count(count)
    }

    async fn list_entries_after(
        &self,
        cache_point_id: i64,
        after_id: i64,
        limit: u32,
    ) -> Result<Vec<AssetEntryRecord>, RepoError> {
        let rows = sqlx::query_as::<_, AssetEntryRow>(&format!(
            "SELECT {ENTRY_COLUMNS} FROM asset_entries \
             WHERE cache_point_id = $1 AND id > $2 \
             ORDER BY id ASC LIMIT $3"
        ))
        .bind(cache_point_id)
        .bind(after_id)
        .bind(i64::from(limit.max(1)))
        .fetch_all(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(AssetEntryRecord::from).collect())
    }

    async fn update_entry(
        &self,
        params: UpdateAssetEntryParams,
    ) -> Result<Option<AssetEntryRecord>, RepoError> {
        let row = sqlx::query_as::<_, AssetEntryRow>(&format!(
            "UPDATE asset_entries SET state = $2, cached_url = $3, updated_at = $4 \
             WHERE id = $1 RETURNING {ENTRY_COLUMNS}"
        ))
        .bind(params.id)
        .bind(params.state)
        .bind(&params.cached_url)
        .bind(params.updated_at)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(AssetEntryRecord::from))
    }

    async fn delete_entry(&self, id: i64) -> Result<bool, RepoError> {
        let result = sqlx::query("DELETE FROM asset_entries WHERE id = $1")
            .bind(id)
            .execute(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(result.rows_affected() > 0)
    }
}
