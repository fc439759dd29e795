use async_trait::async_trait;
use sqlx::{Postgres, QueryBuilder};
use time::OffsetDateTime;

use crate::{
    application::repos::{CachePointsRepo, CreateCachePointParams, RepoError},
    domain::{entities::CachePointRecord, types::CachePointStatus},
};

use super::{PostgresRepositories, map_sqlx_error};

const CACHE_POINT_COLUMNS: &str = "id, url_key, root_url, source_path, status, created_at";

#[derive(sqlx::FromRow)]
struct CachePointRow {
    id: i64,
    url_key: String,
    root_url: String,
    source_path: String,
    status: CachePointStatus,
    created_at: OffsetDateTime,
}

impl From<CachePointRow> for CachePointRecord {
    fn from(row: CachePointRow) -> Self {
        Self {
            id: row.id,
            url_key: row.url_key,
            root_url: row.root_url,
            source_path: row.source_path,
            status: row.status,
            created_at: row.created_at,
        }
    }
}

#[async_trait]
impl CachePointsRepo for PostgresRepositories {
    async fn create_cache_point(
        &self,
        params: CreateCachePointParams,
    ) -> Result<CachePointRecord, RepoError> {
        let row = sqlx::query_as::<_, CachePointRow>(&format!(
            "INSERT INTO cache_points (url_key, root_url, source_path, status, created_at) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {CACHE_POINT_COLUMNS}"
        ))
        .bind(&params.url_key)
        .bind(&params.root_url)
        .bind(&params.source_path)
        .bind(CachePointStatus::Active)
        .bind(params.created_at)
        .fetch_one(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.into())
    }

    async fn find_cache_point(&self, id: i64) -> Result<Option<CachePointRecord>, RepoError> {
        let row = sqlx::query_as::<_, CachePointRow>(&format!(
            "SELECT {CACHE_POINT_COLUMNS} FROM cache_points WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CachePointRecord::from))
    }

    async fn find_cache_point_by_key(
        &self,
        url_key: &str,
    ) -> Result<Option<CachePointRecord>, RepoError> {
        let row = sqlx::query_as::<_, CachePointRow>(&format!(
            "SELECT {CACHE_POINT_COLUMNS} FROM cache_points WHERE url_key = $1"
        ))
        .bind(url_key)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CachePointRecord::from))
    }

    async fn list_cache_points(
        &self,
        status: Option<CachePointStatus>,
    ) -> Result<Vec<CachePointRecord>, RepoError> {
        let mut qb: QueryBuilder<'_, Postgres> = QueryBuilder::new(format!(
            "SELECT {CACHE_POINT_COLUMNS} FROM cache_points WHERE 1=1"
        ));
        if let Some(status) = status {
            qb.push(" AND status = ");
            qb.push_bind(status);
        }
        qb.push(" ORDER BY id ASC");

        let rows = qb
            .build_query_as::<CachePointRow>()
            .fetch_all(self.pool())
            .await
            .map_err(map_sqlx_error)?;

        Ok(rows.into_iter().map(CachePointRecord::from).collect())
    }

    async fn update_cache_point_status(
        &self,
        id: i64,
        status: CachePointStatus,
    ) -> Result<Option<CachePointRecord>, RepoError> {
        let row = sqlx::query_as::<_, CachePointRow>(&format!(
            "UPDATE cache_points SET status = $2 WHERE id = $1 RETURNING {CACHE_POINT_COLUMNS}"
        ))
        .bind(id)
        .bind(status)
        .fetch_optional(self.pool())
        .await
        .map_err(map_sqlx_error)?;

        Ok(row.map(CachePointRecord::from))
    }
}
