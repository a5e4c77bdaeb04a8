use crate::config::{LogFormat, ObservabilityConfig};
use crate::errors::{AppError, Result};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

// Connection chatter from the store client drowns out per-request decisions
const QUIET_DEPENDENCIES: &str = "redis=warn,hyper=warn";

/// Filter built from `RUST_LOG` when set, otherwise from the configured
/// level with noisy dependencies held at `warn`
pub fn build_filter(log_level: &str) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    EnvFilter::try_new(format!("{},{}", log_level, QUIET_DEPENDENCIES)).map_err(|e| {
        AppError::Configuration(format!(
            "observability.log_level '{}' is not a valid filter: {}",
            log_level, e
        ))
    })
}

/// Install the global subscriber. Fails if the filter does not parse or a
/// subscriber is already installed.
pub fn init_tracing(config: &ObservabilityConfig) -> Result<()> {
    let filter = build_filter(&config.log_level)?;
    let registry = tracing_subscriber::registry().with(filter);

    let installed = match config.log_format {
        LogFormat::Json => registry
            .with(fmt::layer().json().flatten_event(true).with_current_span(true))
            .try_init(),
        LogFormat::Compact => registry.with(fmt::layer().compact().with_target(false)).try_init(),
        LogFormat::Pretty => registry.with(fmt::layer().pretty()).try_init(),
    };
    installed.map_err(|e| AppError::Internal(format!("tracing already initialized: {}", e)))?;

    tracing::info!(
        level = %config.log_level,
        format = ?config.log_format,
        metrics_enabled = %config.metrics_enabled,
        "Tracing initialized"
    );

    Ok(())
}
