use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::rate_limit::METRIC_RATE_LIMIT_REJECTED;
use crate::application::views::METRIC_VIEW_INCREMENT;
use crate::cache::{
    METRIC_CACHE_HIT, METRIC_CACHE_INVALIDATE_MS, METRIC_CACHE_MISS, METRIC_CACHE_WRITE_FAILED,
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
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of content cache hits."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of content cache misses."
        );
        describe_counter!(
            METRIC_CACHE_WRITE_FAILED,
            Unit::Count,
            "Total number of cache writes that left the previous entry in place."
        );
        describe_counter!(
            METRIC_RATE_LIMIT_REJECTED,
            Unit::Count,
            "Total number of requests rejected by the sliding-window limiter."
        );
        describe_counter!(
            METRIC_VIEW_INCREMENT,
            Unit::Count,
            "View increment attempts, labelled counted, deduplicated or failed."
        );
        describe_histogram!(
            METRIC_CACHE_INVALIDATE_MS,
            Unit::Milliseconds,
            "Time spent applying one cache invalidation plan."
        );
    });
}
