//! Per-file sync records: resolution, batch creation, listing and admin mutations.

use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Arc;

use futures::future::try_join_all;
use metrics::counter;
use time::{Duration, OffsetDateTime};
use tracing::{debug, info, instrument, warn};

use crate::{
    application::{
        classifier::{Classification, Classified, PathClassifier},
        error::CacheError,
        pagination::{NumberedPage, PageRequest},
        registry::CachePointRegistry,
        repos::{
            AssetEntriesRepo, AssetQueryFilter, CreateAssetEntryParams, RepoError,
            UpdateAssetEntryParams,
        },
        uploads::Uploader,
    },
    domain::{
        entities::AssetEntryRecord,
        types::{AssetState, RequestedState, Transition},
    },
    util::clock::Clock,
};

const METRIC_ENTRIES_CREATED: &str = "cachepoint_entries_created_total";

#[derive(Debug, Clone)]
pub struct AssetSettings {
    pub freshness_window: Duration,
    pub batch_limit: usize,
    pub page_size: u32,
    /// Base URL that upload references are built on.
    pub upload_endpoint: String,
}

/// Best available delivery URL for one asset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Delivery {
    /// Uploaded and active: serve the CDN copy.
    Remote(String),
    /// Needs an upload: hand out the trigger URL.
    Upload(String),
    /// Serve the original URL.
    Local(String),
}

impl Delivery {
    pub fn url(&self) -> &str {
        match self {
            Delivery::Remote(url) | Delivery::Upload(url) | Delivery::Local(url) => url,
        }
    }
}

pub struct AssetEntryService {
    classifier: PathClassifier,
    registry: Arc<CachePointRegistry>,
    repo: Arc<dyn AssetEntriesRepo>,
    uploader: Option<Arc<dyn Uploader>>,
    clock: Arc<dyn Clock>,
    settings: AssetSettings,
}

impl AssetEntryService {
    pub fn new(
        registry: Arc<CachePointRegistry>,
        repo: Arc<dyn AssetEntriesRepo>,
        uploader: Option<Arc<dyn Uploader>>,
        clock: Arc<dyn Clock>,
        settings: AssetSettings,
    ) -> Self {
        Self {
            classifier: PathClassifier::new(Arc::clone(&registry)),
            registry,
            repo,
            uploader,
            clock,
            settings,
        }
    }

    pub fn upload_url(&self, entry_key: &str) -> String {
        format!(
            "{}/{}",
            self.settings.upload_endpoint.trim_end_matches('/'),
            entry_key
        )
    }

    /// Resolve cacheable URLs to their delivery target.
    ///
    /// Issues one entry query per cache point touched. Entries are matched
    /// by key alone; one recorded under a point that no longer owns its URL
    /// is moved to the owning point first. URLs with no entry are passed to
    /// [`Self::prepare_batch`]; those beyond the batch limit resolve to their
    /// local URL until a later call. Non-cacheable inputs are absent from the
    /// result.
    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn resolve_many(
        &self,
        urls: &[String],
    ) -> Result<HashMap<String, Delivery>, RepoError> {
        let mut seen = HashSet::new();
        let mut ordered: Vec<(&String, Classified)> = Vec::new();
        for url in urls {
            if !seen.insert(url.as_str()) {
                continue;
            }
            if let Classification::Cacheable(classified) = self.classifier.classify(url).await? {
                ordered.push((url, classified));
            }
        }

        let mut groups: BTreeMap<i64, Vec<String>> = BTreeMap::new();
        for (_, classified) in &ordered {
            groups
                .entry(classified.point.id)
                .or_default()
                .push(classified.entry_key.clone());
        }

        let lookups = groups.into_values().map(|keys| {
            let repo = Arc::clone(&self.repo);
            async move { repo.find_entries_by_keys(&keys).await }
        });
        let mut existing: HashMap<String, AssetEntryRecord> = try_join_all(lookups)
            .await?
            .into_iter()
            .flatten()
            .map(|entry| (entry.entry_key.clone(), entry))
            .collect();

        let now = self.clock.now();
        let mut resolved = HashMap::with_capacity(ordered.len());
        let mut missing = Vec::new();
        for (url, classified) in ordered {
            match existing.remove(&classified.entry_key) {
                Some(entry) => {
                    let entry = self.adopt(entry, classified.point.id).await?;
                    resolved.insert(url.clone(), self.delivery_for(url, &entry, now));
                }
                None => missing.push(url.clone()),
            }
        }

        if !missing.is_empty() {
            let mut prepared = self
                .prepare_batch(&missing, self.settings.batch_limit)
                .await?;
            for url in missing {
                let delivery = prepared
                    .remove(&url)
                    .unwrap_or_else(|| Delivery::Local(url.clone()));
                resolved.insert(url, delivery);
            }
        }

        Ok(resolved)
    }

    /// Move `entry` under `owner` when another cache point now claims its
    /// URL, e.g. a deeper root registered after the entry was created.
    async fn adopt(
        &self,
        entry: AssetEntryRecord,
        owner: i64,
    ) -> Result<AssetEntryRecord, RepoError> {
        if entry.cache_point_id == owner {
            return Ok(entry);
        }

        match self.repo.reparent_entry(entry.id, owner).await? {
            Some(moved) => {
                info!(
                    entry_id = moved.id,
                    from = entry.cache_point_id,
                    to = owner,
                    "asset entry moved to owning cache point"
                );
                Ok(moved)
            }
            None => Ok(entry),
        }
    }

    fn delivery_for(&self, url: &str, entry: &AssetEntryRecord, now: OffsetDateTime) -> Delivery {
        match entry.state {
            AssetState::Active if entry.is_uploaded() => Delivery::Remote(entry.cached_url.clone()),
            AssetState::PendingUpload if entry.is_stale(now, self.settings.freshness_window) => {
                Delivery::Upload(self.upload_url(&entry.entry_key))
            }
            _ => Delivery::Local(url.to_string()),
        }
    }

    /// Create pending entries for at most `limit` URLs, in input order.
    ///
    /// Each created entry maps to its upload reference. URLs without an
    /// owning cache point are skipped but still count toward the limit. An
    /// entry created concurrently by another request counts as success;
    /// one that already existed resolves as it would in
    /// [`Self::resolve_many`].
    #[instrument(skip_all, fields(urls = urls.len(), limit))]
    pub async fn prepare_batch(
        &self,
        urls: &[String],
        limit: usize,
    ) -> Result<HashMap<String, Delivery>, RepoError> {
        let now = self.clock.now();
        let mut prepared = HashMap::new();
        let mut created = 0u64;

        for url in urls.iter().take(limit) {
            let Classification::Cacheable(classified) = self.classifier.classify(url).await? else {
                debug!(%url, "skipping url outside every cache point");
                continue;
            };

            let params = CreateAssetEntryParams {
                cache_point_id: classified.point.id,
                entry_key: classified.entry_key.clone(),
                local_url: classified.normalized.clone(),
                created_at: now,
            };

            let delivery = match self.repo.create_entry_if_absent(params).await? {
                Some(entry) => {
                    created += 1;
                    Delivery::Upload(self.upload_url(&entry.entry_key))
                }
                None => match self.repo.find_entry_by_key(&classified.entry_key).await? {
                    Some(existing) if existing.state == AssetState::PendingUpload => {
                        let existing = self.adopt(existing, classified.point.id).await?;
                        Delivery::Upload(self.upload_url(&existing.entry_key))
                    }
                    Some(existing) => {
                        let existing = self.adopt(existing, classified.point.id).await?;
                        self.delivery_for(url, &existing, now)
                    }
                    None => continue,
                },
            };

            prepared.insert(url.clone(), delivery);
        }

        if created > 0 {
            counter!(METRIC_ENTRIES_CREATED).increment(created);
            debug!(created, "asset entries created");
        }
        Ok(prepared)
    }

    /// One page of entries under a cache point, optionally filtered by URL substring.
    #[instrument(skip(self))]
    pub async fn list(
        &self,
        cache_point_id: i64,
        search: Option<&str>,
        page: u32,
    ) -> Result<NumberedPage<AssetEntryRecord>, CacheError> {
        if self.registry.find(cache_point_id).await?.is_none() {
            return Err(CacheError::not_found("cache point"));
        }

        let filter = AssetQueryFilter {
            search: search
                .map(str::trim)
                .filter(|term| !term.is_empty())
                .map(str::to_string),
        };
        let request = PageRequest::new(page, self.settings.page_size);

        let total = self.repo.count_entries(cache_point_id, &filter).await?;
        let items = if request.offset() < total {
            self.repo
                .list_entries(cache_point_id, &filter, request.offset(), request.per_page)
                .await?
        } else {
            Vec::new()
        };

        Ok(NumberedPage::new(
            items,
            request,
            total,
            filter.search.is_some(),
        ))
    }

    /// Apply an admin bulk action. Returns the ids whose state actually changed.
    ///
    /// Unknown ids are skipped. Storage failures abort the remainder of the batch.
    #[instrument(skip(self, ids), fields(ids = ids.len()))]
    pub async fn set_state(
        &self,
        ids: &[i64],
        requested: RequestedState,
    ) -> Result<Vec<i64>, CacheError> {
        let mut unique = Vec::with_capacity(ids.len());
        let mut seen = HashSet::new();
        for id in ids {
            if seen.insert(*id) {
                unique.push(*id);
            }
        }

        let entries: HashMap<i64, AssetEntryRecord> = self
            .repo
            .find_entries(&unique)
            .await?
            .into_iter()
            .map(|entry| (entry.id, entry))
            .collect();

        let now = self.clock.now();
        let mut changed = Vec::new();
        for id in unique {
            let Some(entry) = entries.get(&id) else {
                debug!(id, "skipping unknown asset entry");
                continue;
            };

            match entry.state.transition(requested, entry.is_uploaded()) {
                Transition::Unchanged => {}
                Transition::Remove => {
                    if self.repo.delete_entry(id).await? {
                        self.remove_remote(entry).await;
                        changed.push(id);
                    }
                }
                Transition::To(state) => {
                    let updated_at = if state == AssetState::PendingUpload {
                        now - self.settings.freshness_window
                    } else {
                        now
                    };
                    let params = UpdateAssetEntryParams {
                        id,
                        state,
                        cached_url: entry.cached_url.clone(),
                        updated_at,
                    };
                    if self.repo.update_entry(params).await?.is_some() {
                        changed.push(id);
                    }
                }
            }
        }

        info!(
            requested = ?requested,
            changed = changed.len(),
            "asset entry states updated"
        );
        Ok(changed)
    }

    async fn remove_remote(&self, entry: &AssetEntryRecord) {
        if !entry.is_uploaded() {
            return;
        }
        let Some(uploader) = &self.uploader else {
            return;
        };
        if let Err(err) = uploader.remove(&entry.cached_url).await {
            warn!(
                entry_id = entry.id,
                remote = %entry.cached_url,
                error = %err,
                "failed to remove remote copy of deleted entry"
            );
        }
    }

    pub async fn find_by_key(&self, entry_key: &str) -> Result<Option<AssetEntryRecord>, RepoError> {
        self.repo.find_entry_by_key(entry_key).await
    }

    /// Record a completed upload. A disabled entry keeps its state.
    pub async fn record_upload(
        &self,
        id: i64,
        remote_url: &str,
    ) -> Result<Option<AssetEntryRecord>, RepoError> {
        let Some(entry) = self.repo.find_entries(&[id]).await?.into_iter().next() else {
            return Ok(None);
        };

        let state = match entry.state {
            AssetState::Disabled => AssetState::Disabled,
            _ => AssetState::Active,
        };
        self.repo
            .update_entry(UpdateAssetEntryParams {
                id,
                state,
                cached_url: remote_url.to_string(),
                updated_at: self.clock.now(),
            })
            .await
    }

    /// Reset an active entry so the next render hands out an upload URL.
    ///
    /// Pending and disabled entries are left untouched. Returns whether the
    /// entry was modified.
    pub async fn force_reevaluate(
        &self,
        entry: &AssetEntryRecord,
        now: OffsetDateTime,
    ) -> Result<bool, RepoError> {
        if entry.state != AssetState::Active {
            return Ok(false);
        }

        let updated = self
            .repo
            .update_entry(UpdateAssetEntryParams {
                id: entry.id,
                state: AssetState::PendingUpload,
                cached_url: entry.local_url.clone(),
                updated_at: now - self.settings.freshness_window,
            })
            .await?;
        Ok(updated.is_some())
    }
}
