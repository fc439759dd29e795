//! HTTP upload collaborator: PUTs asset bytes below a CDN base URL.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, StatusCode, Url};
use tracing::debug;

use crate::application::uploads::{UploadError, UploadRequest, Uploader};

use super::error::InfraError;

const ENTRY_KEY_HEADER: &str = "x-cachepoint-entry";

#[derive(Clone, Debug)]
pub struct HttpUploader {
    client: Client,
    base: Url,
}

impl HttpUploader {
    pub fn new(base: Url, timeout: Duration) -> Result<Self, InfraError> {
        let base = if base.path().ends_with('/') {
            base
        } else {
            let path = format!("{}/", base.path());
            let mut base = base;
            base.set_path(&path);
            base
        };
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::HttpClient(err.to_string()))?;
        Ok(Self { client, base })
    }

    pub fn user_agent() -> &'static str {
        concat!("cachepoint/", env!("CARGO_PKG_VERSION"))
    }

    /// Remote location of `relative_path` under `source_path`.
    pub fn object_url(&self, source_path: &str, relative_path: &str) -> Result<Url, UploadError> {
        let joined = format!(
            "{}/{}",
            source_path.trim_matches('/'),
            relative_path.trim_start_matches('/')
        );
        self.base
            .join(&joined)
            .map_err(|err| UploadError::Transport(err.to_string()))
    }
}

#[async_trait]
impl Uploader for HttpUploader {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        let url = self.object_url(&request.source_path, &request.relative_path)?;
        debug!(%url, bytes = request.body.len(), "uploading asset");

        let response = self
            .client
            .put(url.clone())
            .header(ENTRY_KEY_HEADER, &request.entry_key)
            .body(request.body)
            .send()
            .await
            .map_err(|err| UploadError::Transport(err.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UploadError::Rejected {
                status: status.as_u16(),
            });
        }
        Ok(url.to_string())
    }

    async fn remove(&self, remote_url: &str) -> Result<(), UploadError> {
        let url = Url::parse(remote_url).map_err(|err| UploadError::Transport(err.to_string()))?;
        let response = self
            .client
            .delete(url)
            .send()
            .await
            .map_err(|err| UploadError::Transport(err.to_string()))?;

        let status = response.status();
        if status.is_success() || status == StatusCode::NOT_FOUND {
            return Ok(());
        }
        Err(UploadError::Rejected {
            status: status.as_u16(),
        })
    }
}
