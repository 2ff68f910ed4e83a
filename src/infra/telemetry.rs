use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing::debug;
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings
/// and register metric descriptions.
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
        })?;

    debug!(
        level = %logging.level,
        format = ?logging.format,
        "Telemetry initialised"
    );
    Ok(())
}

/// Register descriptions for the crate's metrics with the installed
/// recorder. Only the first call has an effect.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "mvcore_compiler_cache_hit_total",
            Unit::Count,
            "Total number of compiler cache hits."
        );
        describe_counter!(
            "mvcore_compiler_cache_miss_total",
            Unit::Count,
            "Total number of compiler cache lookups without an entry."
        );
        describe_counter!(
            "mvcore_compiler_cache_recompile_total",
            Unit::Count,
            "Total number of stale compiler cache entries recompiled, by reason."
        );
        describe_histogram!(
            "mvcore_compile_ms",
            Unit::Milliseconds,
            "View compilation latency in milliseconds."
        );
        describe_histogram!(
            "mvcore_model_binding_ms",
            Unit::Milliseconds,
            "Model binding and validation latency in milliseconds."
        );
    });
}

#[cfg(test)]
mod tests {
    use tracing::level_filters::LevelFilter;

    use super::*;

    #[test]
    fn second_install_is_reported() {
        let logging = LoggingSettings {
            level: LevelFilter::WARN,
            format: LogFormat::Json,
        };

        init(&logging).expect("first install");
        let err = init(&logging).expect_err("subscriber already installed");
        assert!(matches!(err, InfraError::Telemetry(_)));
    }
}
