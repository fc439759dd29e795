#![allow(dead_code)]

use std::num::NonZeroUsize;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use cachepoint::application::assets::AssetSettings;
use cachepoint::application::purge::PurgeSettings;
use cachepoint::application::services::{CacheServices, Repositories, ServiceConfig};
use cachepoint::application::uploads::{UploadError, UploadRequest, Uploader};
use cachepoint::infra::storage::Storage;
use cachepoint::util::clock::{Clock, FixedClock};
use time::macros::datetime;
use time::{Duration, OffsetDateTime};

pub const THEME_ROOT: &str = "/wp-content/themes/demo/";
pub const UPLOAD_ENDPOINT: &str = "https://site.test/upload";
pub const CDN_BASE: &str = "https://cdn.test";

pub fn started_at() -> OffsetDateTime {
    datetime!(2026-03-01 09:00 UTC)
}

pub fn freshness_window() -> Duration {
    Duration::seconds(120)
}

pub fn service_config(install_root: PathBuf) -> ServiceConfig {
    ServiceConfig {
        assets: AssetSettings {
            freshness_window: freshness_window(),
            batch_limit: 5,
            page_size: 2,
            upload_endpoint: UPLOAD_ENDPOINT.to_string(),
        },
        purge: PurgeSettings {
            ttl: Duration::seconds(60),
            chunk_size: 2,
        },
        lookup_cache_size: NonZeroUsize::new(64).expect("non-zero"),
        install_root,
    }
}

pub struct Harness {
    pub services: CacheServices,
    pub storage: Storage,
    pub clock: Arc<FixedClock>,
    pub uploader: Arc<RecordingUploader>,
}

pub fn harness() -> Harness {
    harness_in(PathBuf::from("."))
}

pub fn harness_in(install_root: PathBuf) -> Harness {
    let storage = Storage::memory();
    let repos = storage.repositories();
    harness_over(storage, repos, install_root)
}

pub fn harness_over(storage: Storage, repos: Repositories, install_root: PathBuf) -> Harness {
    harness_with(storage, repos, service_config(install_root))
}

/// In-memory harness with a tweaked service configuration.
pub fn harness_configured(tweak: impl FnOnce(&mut ServiceConfig)) -> Harness {
    let mut config = service_config(PathBuf::from("."));
    tweak(&mut config);
    let storage = Storage::memory();
    let repos = storage.repositories();
    harness_with(storage, repos, config)
}

fn harness_with(storage: Storage, repos: Repositories, config: ServiceConfig) -> Harness {
    let clock = Arc::new(FixedClock::new(started_at()));
    let uploader = Arc::new(RecordingUploader::default());
    let services = CacheServices::new(
        repos,
        Some(Arc::clone(&uploader) as Arc<dyn Uploader>),
        Arc::clone(&clock) as Arc<dyn Clock>,
        config,
    );
    Harness {
        services,
        storage,
        clock,
        uploader,
    }
}

impl Harness {
    pub async fn theme_point(&self) -> i64 {
        self.services
            .registry
            .register(THEME_ROOT, "themes/demo")
            .await
            .expect("register theme")
            .record()
            .id
    }

    pub fn upload_url(&self, url: &str) -> String {
        let key = cachepoint::domain::urls::entry_key(url);
        format!("{UPLOAD_ENDPOINT}/{key}")
    }
}

pub fn theme_url(file: &str) -> String {
    format!("{THEME_ROOT}{file}")
}

/// Stores uploads in memory and hands back CDN URLs.
#[derive(Default)]
pub struct RecordingUploader {
    pub uploaded: Mutex<Vec<UploadRequest>>,
    pub removed: Mutex<Vec<String>>,
}

impl RecordingUploader {
    pub fn uploaded_paths(&self) -> Vec<String> {
        self.uploaded
            .lock()
            .expect("uploads lock")
            .iter()
            .map(|request| format!("{}/{}", request.source_path, request.relative_path))
            .collect()
    }

    pub fn removed(&self) -> Vec<String> {
        self.removed.lock().expect("removals lock").clone()
    }
}

#[async_trait]
impl Uploader for RecordingUploader {
    async fn upload(&self, request: UploadRequest) -> Result<String, UploadError> {
        let remote = format!(
            "{CDN_BASE}/{}/{}",
            request.source_path, request.relative_path
        );
        self.uploaded.lock().expect("uploads lock").push(request);
        Ok(remote)
    }

    async fn remove(&self, remote_url: &str) -> Result<(), UploadError> {
        self.removed
            .lock()
            .expect("removals lock")
            .push(remote_url.to_string());
        Ok(())
    }
}
