//! # Logging backend setup.
//!
//! Installs the global `tracing` subscriber from [`LogConfig`]: the level
//! becomes the default filter (overridable per-module via `RUST_LOG`), the
//! format picks the json or plain-text fmt layer. Called exactly once,
//! right after configuration load.

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LogConfig;
use crate::error::SetupError;

/// Installs the global subscriber. Fails if one is already set.
pub fn init(cfg: &LogConfig) -> Result<(), SetupError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(cfg.level.clone()));

    let registry = tracing_subscriber::registry().with(filter);
    let installed = match cfg.format.as_str() {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        _ => registry.with(tracing_subscriber::fmt::layer()).try_init(),
    };

    installed.map_err(|e| SetupError::Logging {
        reason: e.to_string(),
    })
}
