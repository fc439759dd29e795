//! Render-path entry point turning local asset URLs into delivery URLs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{instrument, warn};

use crate::application::assets::AssetEntryService;

const METRIC_FAIL_OPEN: &str = "cachepoint_reconcile_fail_open_total";
const METRIC_RECONCILE_MS: &str = "cachepoint_reconcile_ms";

#[derive(Clone)]
pub struct SyncReconciler {
    assets: Arc<AssetEntryService>,
}

impl SyncReconciler {
    pub fn new(assets: Arc<AssetEntryService>) -> Self {
        Self { assets }
    }

    /// Map every input URL to its best delivery URL.
    ///
    /// Never fails: when storage is unreachable each URL maps to itself.
    #[instrument(skip_all, fields(urls = urls.len()))]
    pub async fn reconcile(&self, urls: &[String]) -> HashMap<String, String> {
        let started_at = Instant::now();

        let resolved = match self.assets.resolve_many(urls).await {
            Ok(resolved) => resolved,
            Err(err) => {
                counter!(METRIC_FAIL_OPEN).increment(1);
                warn!(error = %err, "asset store unavailable; serving local urls");
                HashMap::new()
            }
        };

        let mut out = HashMap::with_capacity(urls.len());
        for url in urls {
            let target = resolved
                .get(url)
                .map(|delivery| delivery.url().to_string())
                .unwrap_or_else(|| url.clone());
            out.insert(url.clone(), target);
        }

        histogram!(METRIC_RECONCILE_MS).record(started_at.elapsed().as_secs_f64() * 1000.0);
        out
    }
}
