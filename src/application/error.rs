use std::error::Error as StdError;

use axum::{http::StatusCode, response::Response};
use thiserror::Error;

use crate::{application::repos::RepoError, domain::error::DomainError, infra::error::InfraError};

/// Diagnostic chain attached to failed responses for the logging middleware.
#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = vec![error.to_string()];
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Failures surfaced by admin-path cache operations.
///
/// Render-path reads never produce these; they fall back to the local URL.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("storage unavailable")]
    StorageUnavailable(#[source] RepoError),
    #[error("caller lacks the required capability")]
    Forbidden,
    #[error("{entity} not found")]
    NotFound { entity: &'static str },
    #[error(transparent)]
    Domain(#[from] DomainError),
}

impl CacheError {
    pub fn not_found(entity: &'static str) -> Self {
        Self::NotFound { entity }
    }

    /// Stable identifier of the failure class for structured responses.
    pub fn kind(&self) -> &'static str {
        match self {
            CacheError::StorageUnavailable(_) => "storage_unavailable",
            CacheError::Forbidden => "forbidden",
            CacheError::NotFound { .. } => "not_found",
            CacheError::Domain(_) => "invalid_input",
        }
    }
}

impl From<RepoError> for CacheError {
    fn from(err: RepoError) -> Self {
        match err {
            RepoError::NotFound => CacheError::not_found("record"),
            other => CacheError::StorageUnavailable(other),
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Cache(#[from] CacheError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn report_collects_source_chain() {
        let error = CacheError::StorageUnavailable(RepoError::Timeout);
        let report =
            ErrorReport::from_error("tests", StatusCode::SERVICE_UNAVAILABLE, &error);
        assert_eq!(
            report.messages,
            vec!["storage unavailable".to_string(), "database timeout".to_string()]
        );
    }

    #[test]
    fn repo_errors_map_to_taxonomy() {
        assert_eq!(
            CacheError::from(RepoError::from_persistence("connection reset")).kind(),
            "storage_unavailable"
        );
        assert_eq!(CacheError::from(RepoError::NotFound).kind(), "not_found");
    }
}
