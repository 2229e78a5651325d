use std::sync::Once;

use metrics::{Unit, describe_counter};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

pub const RENDER_CACHE_HIT_TOTAL: &str = "toolgate_render_cache_hit_total";
pub const RENDER_CACHE_MISS_TOTAL: &str = "toolgate_render_cache_miss_total";
pub const TOOL_FAILURE_TOTAL: &str = "toolgate_tool_failure_total";
pub const SNIPPET_SAVED_TOTAL: &str = "toolgate_snippet_saved_total";

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
            RENDER_CACHE_HIT_TOTAL,
            Unit::Count,
            "Renders served from a stored artifact without running the tool."
        );
        describe_counter!(
            RENDER_CACHE_MISS_TOTAL,
            Unit::Count,
            "Renders by id that had to run the tool."
        );
        describe_counter!(
            TOOL_FAILURE_TOTAL,
            Unit::Count,
            "External tool invocations that failed to spawn or exited non-zero."
        );
        describe_counter!(
            SNIPPET_SAVED_TOTAL,
            Unit::Count,
            "Snippets written to the snippet directory."
        );
    });
}
