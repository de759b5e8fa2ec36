//! Tracing Initialization
//!
//! Installs a `tracing-subscriber` registry with an env filter and either
//! human-readable or JSON output. Library code only emits events; calling
//! [`init_tracing`] is left to the embedding application.

use prism_core::ConfigError;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

/// Logging configuration from environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    /// Filter directives, e.g. `"prism_client=debug,info"`
    pub log_filter: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            log_filter: std::env::var("PRISM_LOG").unwrap_or_else(|_| "info".to_string()),
            json: std::env::var("PRISM_LOG_FORMAT")
                .map(|s| s.eq_ignore_ascii_case("json"))
                .unwrap_or(false),
        }
    }
}

/// Install the global tracing subscriber.
///
/// Fails if the filter does not parse or a global subscriber is already set.
pub fn init_tracing(config: &TelemetryConfig) -> Result<(), ConfigError> {
    let env_filter =
        EnvFilter::try_new(&config.log_filter).map_err(|e| ConfigError::InvalidValue {
            field: "PRISM_LOG".to_string(),
            value: config.log_filter.clone(),
            reason: e.to_string(),
        })?;

    let fmt_layer = if config.json {
        tracing_subscriber::fmt::layer().json().boxed()
    } else {
        tracing_subscriber::fmt::layer().boxed()
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .try_init()
        .map_err(|e| ConfigError::InvalidValue {
            field: "tracing_subscriber".to_string(),
            value: config.log_filter.clone(),
            reason: format!("failed to init subscriber: {}", e),
        })?;

    tracing::info!(filter = %config.log_filter, json = config.json, "Tracing initialized");
    Ok(())
}
