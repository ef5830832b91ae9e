//! Tracing subscriber setup

use crate::AlertError;
use crate::config::LoggingConfig;
use anyhow::Result;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

/// Install the global subscriber described by `config`.
///
/// `RUST_LOG` takes precedence over the configured level. Fails if a global
/// subscriber is already installed.
pub fn init_tracing(config: &LoggingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("meteoalert={}", config.level)));

    let registry = tracing_subscriber::registry().with(env_filter);
    let initialized = match config.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json().with_current_span(true))
            .try_init(),
        _ => registry
            .with(tracing_subscriber::fmt::layer().with_target(true))
            .try_init(),
    };

    initialized.map_err(|e| {
        anyhow::Error::from(AlertError::config(format!(
            "Failed to initialize tracing: {e}"
        )))
    })
}
