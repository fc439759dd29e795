//! Storage backend selection.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    application::{
        repos::{AssetEntriesRepo, CachePointsRepo, ProgressStore, RepoError},
        services::Repositories,
    },
    config::DatabaseSettings,
    infra::{
        db::{PostgresRepositories, map_sqlx_error},
        error::InfraError,
        memory::{InMemoryProgressStore, InMemoryRepositories},
    },
};

#[derive(Clone)]
pub enum Storage {
    Postgres(PostgresRepositories),
    Memory {
        repos: InMemoryRepositories,
        progress: InMemoryProgressStore,
    },
}

impl Storage {
    /// Connect and migrate when a database URL is configured; otherwise
    /// fall back to process-local maps.
    pub async fn connect(settings: &DatabaseSettings) -> Result<Self, InfraError> {
        let Some(url) = settings.url.as_deref() else {
            warn!("no database configured; cache state lives in memory and is lost on restart");
            return Ok(Self::memory());
        };

        let pool = PostgresRepositories::connect(url, settings.max_connections.get())
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;
        PostgresRepositories::run_migrations(&pool)
            .await
            .map_err(|err| InfraError::database(err.to_string()))?;
        info!(max_connections = settings.max_connections.get(), "database ready");

        Ok(Self::Postgres(PostgresRepositories::new(pool)))
    }

    pub fn memory() -> Self {
        Self::Memory {
            repos: InMemoryRepositories::new(),
            progress: InMemoryProgressStore::new(),
        }
    }

    pub fn cache_points(&self) -> Arc<dyn CachePointsRepo> {
        match self {
            Storage::Postgres(repos) => Arc::new(repos.clone()),
            Storage::Memory { repos, .. } => Arc::new(repos.clone()),
        }
    }

    pub fn asset_entries(&self) -> Arc<dyn AssetEntriesRepo> {
        match self {
            Storage::Postgres(repos) => Arc::new(repos.clone()),
            Storage::Memory { repos, .. } => Arc::new(repos.clone()),
        }
    }

    pub fn progress(&self) -> Arc<dyn ProgressStore> {
        match self {
            Storage::Postgres(repos) => Arc::new(repos.clone()),
            Storage::Memory { progress, .. } => Arc::new(progress.clone()),
        }
    }

    pub fn repositories(&self) -> Repositories {
        Repositories {
            cache_points: self.cache_points(),
            asset_entries: self.asset_entries(),
            progress: self.progress(),
        }
    }

    pub async fn health_check(&self) -> Result<(), RepoError> {
        match self {
            Storage::Postgres(repos) => repos.health_check().await.map_err(map_sqlx_error),
            Storage::Memory { repos, .. } => repos.health_check().await,
        }
    }
}
