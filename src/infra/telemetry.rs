use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "cachepoint_reconcile_fail_open_total",
            Unit::Count,
            "Reconcile calls that fell back to local URLs because storage failed."
        );
        describe_counter!(
            "cachepoint_entries_created_total",
            Unit::Count,
            "Asset entries created by batch preparation."
        );
        describe_counter!(
            "cachepoint_upload_failed_total",
            Unit::Count,
            "Upload attempts that fell back to the local URL."
        );
        describe_counter!(
            "cachepoint_purge_started_total",
            Unit::Count,
            "Purge runs that acquired a cache point lease."
        );
        describe_histogram!(
            "cachepoint_reconcile_ms",
            Unit::Milliseconds,
            "Reconcile latency in milliseconds."
        );
    });
}
