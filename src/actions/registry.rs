//! # Action registry.
//!
//! Walks the handler config and instantiates exactly the enabled actions,
//! in a fixed order: log echo (dummy provider only), kubernetes, nomad,
//! telegram. Construction failures are collected rather than short-
//! circuiting, so the operator sees every broken action at once; an empty
//! resulting list is fatal because an agent with nothing to run on
//! termination is a misconfiguration.
//!
//! Mutual exclusion of kubernetes and nomad is a config-load invariant and
//! is not re-checked here.

use tracing::{error, info};

use crate::actions::{ActionRef, KubernetesAction, LogAction, NomadAction, TelegramAction};
use crate::config::HandlerConfig;
use crate::error::SetupError;
use crate::providers::ProviderName;

/// Builds the ordered action list for the selected provider.
pub async fn build_actions(
    cfg: &HandlerConfig,
    provider: ProviderName,
) -> Result<Vec<ActionRef>, SetupError> {
    let mut actions: Vec<ActionRef> = Vec::new();
    let mut failures: Vec<String> = Vec::new();

    // the dummy provider always gets the log echo so integration runs are
    // observable from the log stream alone
    if provider == ProviderName::Dummy {
        actions.push(std::sync::Arc::new(LogAction));
    }

    if cfg.kubernetes.enabled {
        match KubernetesAction::new(&cfg.kubernetes).await {
            Ok(action) => actions.push(std::sync::Arc::new(action)),
            Err(e) => {
                error!(error = %e, "kubernetes action failed to initialise");
                failures.push(e.to_string());
            }
        }
    }

    if cfg.nomad.enabled {
        match NomadAction::new(&cfg.nomad) {
            Ok(action) => actions.push(std::sync::Arc::new(action)),
            Err(e) => {
                error!(error = %e, "nomad action failed to initialise");
                failures.push(e.to_string());
            }
        }
    }

    if cfg.telegram.enabled {
        match TelegramAction::new(&cfg.telegram) {
            Ok(action) => actions.push(std::sync::Arc::new(action)),
            Err(e) => {
                error!(error = %e, "telegram action failed to initialise");
                failures.push(e.to_string());
            }
        }
    }

    if actions.is_empty() {
        return Err(SetupError::NoActions { reasons: failures });
    }

    let names: Vec<&str> = actions.iter().map(|a| a.name()).collect();
    info!(actions = ?names, "evacuation actions registered");
    Ok(actions)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TelegramConfig;

    #[tokio::test]
    async fn nothing_enabled_is_fatal() {
        let err = match build_actions(&HandlerConfig::default(), ProviderName::Aws).await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        assert!(matches!(err, SetupError::NoActions { .. }));
    }

    #[tokio::test]
    async fn dummy_provider_implies_log_action() {
        let actions = build_actions(&HandlerConfig::default(), ProviderName::Dummy)
            .await
            .unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].name(), "log");
    }

    #[tokio::test]
    async fn broken_telegram_credentials_surface_in_the_failure() {
        let cfg = HandlerConfig {
            telegram: TelegramConfig {
                enabled: true,
                bot_token: "123:abc".to_string(),
                chat_id: "not-a-chat".to_string(),
            },
            ..HandlerConfig::default()
        };
        let err = match build_actions(&cfg, ProviderName::Aws).await {
            Err(e) => e,
            Ok(_) => panic!("expected error"),
        };
        match err {
            SetupError::NoActions { reasons } => {
                assert_eq!(reasons.len(), 1);
                assert!(reasons[0].contains("telegram"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn valid_telegram_config_registers_the_action() {
        let cfg = HandlerConfig {
            telegram: TelegramConfig {
                enabled: true,
                bot_token: "123:abc".to_string(),
                chat_id: "-1001234567890".to_string(),
            },
            ..HandlerConfig::default()
        };
        let actions = build_actions(&cfg, ProviderName::Aws).await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].name(), "telegram");
    }
}
