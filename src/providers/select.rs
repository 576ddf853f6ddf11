//! # Provider selection.
//!
//! The supervisor builds the full provider list explicitly and hands it
//! here together with the detection config. Two modes:
//!
//! - **Explicit** (`provider.name` set): strict. The operator asserted a
//!   provider; an unknown tag or an unsupported environment must be loud,
//!   so both are fatal.
//! - **Auto-detect**: probe in construction order, first supported wins.
//!   The dummy provider is skipped here: it reports supported
//!   unconditionally and would mask "no provider detected".
//!
//! Neither mode configured is itself fatal (also caught at config
//! validation; kept here so the selector is safe standalone).

use tracing::{info, warn};

use crate::config::ProviderConfig;
use crate::error::SetupError;
use crate::providers::{ProviderName, ProviderRef};

/// Picks the active provider or fails the startup.
pub async fn select_provider(
    cfg: &ProviderConfig,
    providers: &[ProviderRef],
) -> Result<ProviderRef, SetupError> {
    if !cfg.name.is_empty() {
        let wanted: ProviderName =
            cfg.name
                .parse()
                .map_err(|_| SetupError::ProviderNotFound {
                    name: cfg.name.clone(),
                })?;

        let provider = providers
            .iter()
            .find(|p| p.name() == wanted)
            .ok_or_else(|| SetupError::ProviderNotFound {
                name: cfg.name.clone(),
            })?;

        if !provider.is_supported().await {
            warn!(provider = %wanted, "configured provider not supported in this environment");
            return Err(SetupError::ProviderNotSupported {
                name: wanted.as_str().to_string(),
            });
        }

        info!(provider = %wanted, "configured provider detected and supported");
        return Ok(provider.clone());
    }

    if !cfg.auto_detect {
        return Err(SetupError::NoProviderConfigured);
    }

    info!("auto-detecting cloud provider");
    for provider in providers {
        if provider.name() == ProviderName::Dummy {
            continue;
        }
        if provider.is_supported().await {
            info!(provider = %provider.name(), "provider auto-detected");
            return Ok(provider.clone());
        }
    }

    Err(SetupError::NoProviderDetected)
}
