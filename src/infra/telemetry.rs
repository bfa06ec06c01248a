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
///
/// Logs go to stderr so rendered documents can be written to stdout.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .with_writer(std::io::stderr)
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .with_writer(std::io::stderr)
            .compact()
            .with_target(true)
            .boxed(),
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
            "kmlmap_requests_total",
            Unit::Count,
            "Total number of map requests rendered, labelled by output format."
        );
        describe_counter!(
            "kmlmap_placemarks_total",
            Unit::Count,
            "Total number of placemarks written."
        );
        describe_counter!(
            "kmlmap_overlays_total",
            Unit::Count,
            "Total number of ground overlays written."
        );
        describe_counter!(
            "kmlmap_layer_fallbacks_total",
            Unit::Count,
            "Total number of per-layer failures absorbed by a fallback."
        );
        describe_histogram!(
            "kmlmap_render_ms",
            Unit::Milliseconds,
            "Map rendering latency in milliseconds."
        );
    });
}
