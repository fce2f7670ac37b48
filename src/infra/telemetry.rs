use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::metric_names;
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

/// Register descriptions for the cache counters with the installed recorder.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            metric_names::HIT_TOTAL,
            Unit::Count,
            "Lookups served from a live cache entry."
        );
        describe_counter!(
            metric_names::MISS_TOTAL,
            Unit::Count,
            "Lookups that started a new computation."
        );
        describe_counter!(
            metric_names::COALESCED_TOTAL,
            Unit::Count,
            "Lookups that joined a computation already in flight."
        );
        describe_counter!(
            metric_names::COMPUTE_FAILURE_TOTAL,
            Unit::Count,
            "Computations that failed or panicked; their results were not stored."
        );
        describe_counter!(
            metric_names::EVICT_TOTAL,
            Unit::Count,
            "Cache slots removed by invalidation."
        );
    });
}
