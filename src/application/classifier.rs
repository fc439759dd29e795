//! Maps arbitrary asset URLs onto registered cache points.

use std::sync::Arc;

use crate::{
    application::{registry::CachePointRegistry, repos::RepoError},
    domain::{entities::CachePointRecord, urls},
};

/// A URL that belongs to a cache point, with its derived identity.
#[derive(Debug, Clone)]
pub struct Classified {
    pub point: Arc<CachePointRecord>,
    pub normalized: String,
    pub entry_key: String,
}

#[derive(Debug, Clone)]
pub enum Classification {
    Cacheable(Classified),
    NotCacheable,
}

impl Classification {
    pub fn is_cacheable(&self) -> bool {
        matches!(self, Classification::Cacheable(_))
    }
}

#[derive(Clone)]
pub struct PathClassifier {
    registry: Arc<CachePointRegistry>,
}

impl PathClassifier {
    pub fn new(registry: Arc<CachePointRegistry>) -> Self {
        Self { registry }
    }

    /// Malformed or uncovered URLs are `NotCacheable`; only storage failures error.
    pub async fn classify(&self, url: &str) -> Result<Classification, RepoError> {
        let Some(normalized) = urls::normalize(url) else {
            return Ok(Classification::NotCacheable);
        };

        match self.registry.lookup(&normalized).await? {
            Some(point) => Ok(Classification::Cacheable(Classified {
                entry_key: urls::entry_key(&normalized),
                point,
                normalized,
            })),
            None => Ok(Classification::NotCacheable),
        }
    }
}
