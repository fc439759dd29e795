//! Upload collaborator contract and the upload trigger flow.

use std::path::PathBuf;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use metrics::counter;
use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::{
    application::{assets::AssetEntryService, error::CacheError, registry::CachePointRegistry},
    domain::{entities::AssetEntryRecord, sources, types::AssetState, urls},
};

const METRIC_UPLOAD_FAILED: &str = "cachepoint_upload_failed_total";

#[derive(Debug, Error)]
pub enum UploadError {
    #[error("upload transport failed: {0}")]
    Transport(String),
    #[error("remote rejected the request with status {status}")]
    Rejected { status: u16 },
    #[error("source file unavailable: {0}")]
    Source(#[from] std::io::Error),
    #[error("asset path `{0}` is not below its cache point")]
    OutsideRoot(String),
}

/// Bytes of one asset plus where it lives relative to its cache point.
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub entry_key: String,
    pub source_path: String,
    pub relative_path: String,
    pub body: Bytes,
}

/// Transfers asset bytes to the remote CDN. The core only records outcomes.
#[async_trait]
pub trait Uploader: Send + Sync {
    /// Returns the remote URL of the stored object.
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError>;

    async fn remove(&self, remote_url: &str) -> Result<(), UploadError>;
}

/// What the trigger endpoint should redirect to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadOutcome {
    Uploaded { remote_url: String },
    AlreadyCached { remote_url: String },
    Disabled { local_url: String },
    Failed { local_url: String },
}

impl UploadOutcome {
    pub fn redirect_target(&self) -> &str {
        match self {
            UploadOutcome::Uploaded { remote_url } | UploadOutcome::AlreadyCached { remote_url } => {
                remote_url
            }
            UploadOutcome::Disabled { local_url } | UploadOutcome::Failed { local_url } => {
                local_url
            }
        }
    }
}

pub struct UploadService {
    registry: Arc<CachePointRegistry>,
    assets: Arc<AssetEntryService>,
    uploader: Option<Arc<dyn Uploader>>,
    install_root: PathBuf,
}

impl UploadService {
    pub fn new(
        registry: Arc<CachePointRegistry>,
        assets: Arc<AssetEntryService>,
        uploader: Option<Arc<dyn Uploader>>,
        install_root: PathBuf,
    ) -> Self {
        Self {
            registry,
            assets,
            uploader,
            install_root,
        }
    }

    /// Upload the entry behind `entry_key` and record the remote URL.
    ///
    /// Transfer failures fall back to the local URL; storage failures error.
    #[instrument(skip(self))]
    pub async fn trigger(&self, entry_key: &str) -> Result<UploadOutcome, CacheError> {
        let entry = self
            .assets
            .find_by_key(entry_key)
            .await?
            .ok_or(CacheError::not_found("asset entry"))?;

        match entry.state {
            AssetState::Disabled => {
                return Ok(UploadOutcome::Disabled {
                    local_url: entry.local_url,
                });
            }
            AssetState::Active if entry.is_uploaded() => {
                return Ok(UploadOutcome::AlreadyCached {
                    remote_url: entry.cached_url,
                });
            }
            _ => {}
        }

        let Some(uploader) = &self.uploader else {
            warn!(entry_id = entry.id, "no uploader configured; serving local copy");
            return Ok(UploadOutcome::Failed {
                local_url: entry.local_url,
            });
        };

        let request = match self.read_source(&entry).await {
            Ok(request) => request,
            Err(err) => return Ok(self.failed(entry, &err)),
        };

        match uploader.upload(request).await {
            Ok(remote_url) => {
                self.assets.record_upload(entry.id, &remote_url).await?;
                info!(entry_id = entry.id, remote = %remote_url, "asset uploaded");
                Ok(UploadOutcome::Uploaded { remote_url })
            }
            Err(err) => Ok(self.failed(entry, &err)),
        }
    }

    async fn read_source(&self, entry: &AssetEntryRecord) -> Result<UploadRequest, UploadError> {
        let point = self
            .registry
            .find(entry.cache_point_id)
            .await
            .map_err(|err| UploadError::Transport(err.to_string()))?
            .ok_or_else(|| UploadError::OutsideRoot(entry.local_url.clone()))?;

        let relative = urls::relative_to(&point.root_url, &entry.local_url)
            .ok_or_else(|| UploadError::OutsideRoot(entry.local_url.clone()))?;
        let relative_file = sources::safe_relative(relative)
            .ok_or_else(|| UploadError::OutsideRoot(entry.local_url.clone()))?;

        let path = self
            .install_root
            .join(&point.source_path)
            .join(relative_file);
        let body = tokio::fs::read(&path).await?;

        Ok(UploadRequest {
            entry_key: entry.entry_key.clone(),
            source_path: point.source_path.clone(),
            relative_path: relative.to_string(),
            body: Bytes::from(body),
        })
    }

    fn failed(&self, entry: AssetEntryRecord, err: &UploadError) -> UploadOutcome {
        counter!(METRIC_UPLOAD_FAILED).increment(1);
        warn!(entry_id = entry.id, error = %err, "asset upload failed; serving local copy");
        UploadOutcome::Failed {
            local_url: entry.local_url,
        }
    }
}
