use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge};
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
            "pixfeed_comment_index_hit_total",
            Unit::Count,
            "Comment thread lookups served from the index."
        );
        describe_counter!(
            "pixfeed_comment_index_miss_total",
            Unit::Count,
            "Comment thread lookups that queried storage."
        );
        describe_counter!(
            "pixfeed_feed_render_total",
            Unit::Count,
            "Feed fragments rendered and published."
        );
        describe_counter!(
            "pixfeed_feed_refresh_skipped_total",
            Unit::Count,
            "Feed refreshes skipped because a later recompute already covered them."
        );
        describe_counter!(
            "pixfeed_session_minted_total",
            Unit::Count,
            "Session tokens issued."
        );
        describe_gauge!(
            "pixfeed_user_directory_size",
            Unit::Count,
            "Users held in the in-process directory."
        );
    });
}
