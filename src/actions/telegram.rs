//! # Telegram notification action.
//!
//! Posts one HTML-formatted message per termination event through the Bot
//! API. Credentials are validated at construction: a bad chat id should
//! fail the agent at startup, not eat grace-period seconds at event time.
//! Transport errors and non-`ok` API answers are plain action failures.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::actions::Action;
use crate::config::TelegramConfig;
use crate::error::{ActionError, SetupError};
use crate::event::TerminationEvent;

/// Bot API base; overridable for tests.
const TELEGRAM_API_BASE_URL: &str = "https://api.telegram.org";

/// Outbound request timeout. Generous against the per-action deadline but
/// small against the grace period.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// `sendMessage` payload.
#[derive(Debug, Serialize)]
struct SendMessage<'a> {
    chat_id: &'a str,
    text: String,
    parse_mode: &'static str,
}

/// Bot API response envelope.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    ok: bool,
    #[serde(default)]
    description: Option<String>,
    #[serde(default)]
    error_code: Option<i64>,
}

/// Sends a chat notification for the termination event.
pub struct TelegramAction {
    http: reqwest::Client,
    base_url: String,
    bot_token: String,
    chat_id: String,
}

impl TelegramAction {
    pub fn new(cfg: &TelegramConfig) -> Result<Self, SetupError> {
        Self::with_base_url(cfg, TELEGRAM_API_BASE_URL)
    }

    /// Same action against a different API base; lets tests point it at a
    /// stub server.
    pub fn with_base_url(
        cfg: &TelegramConfig,
        base_url: impl Into<String>,
    ) -> Result<Self, SetupError> {
        let init_err = |reason: String| SetupError::ActionInit {
            name: "telegram",
            reason,
        };

        if cfg.bot_token.is_empty() {
            return Err(init_err("bot token is required".to_string()));
        }
        if !valid_chat_id(&cfg.chat_id) {
            return Err(init_err(format!(
                "chat id must be numeric or @-prefixed, got '{}'",
                cfg.chat_id
            )));
        }

        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| init_err(e.to_string()))?;

        Ok(Self {
            http,
            base_url: base_url.into(),
            bot_token: cfg.bot_token.clone(),
            chat_id: cfg.chat_id.clone(),
        })
    }

    fn format_message(event: &TerminationEvent) -> String {
        format!(
            "<b>Instance termination notice</b>\n\
             Hostname: <code>{}</code>\n\
             Private IP: <code>{}</code>\n\
             Instance ID: <code>{}</code>\n\
             Reason: <code>{}</code>",
            event.hostname, event.private_ip, event.instance_id, event.reason
        )
    }
}

#[async_trait]
impl Action for TelegramAction {
    fn name(&self) -> &'static str {
        "telegram"
    }

    async fn handle(
        &self,
        ctx: CancellationToken,
        event: &TerminationEvent,
    ) -> Result<(), ActionError> {
        let url = format!("{}/bot{}/sendMessage", self.base_url, self.bot_token);
        let payload = SendMessage {
            chat_id: &self.chat_id,
            text: Self::format_message(event),
            parse_mode: "HTML",
        };

        debug!(chat_id = %self.chat_id, "sending termination notification");

        let request = self.http.post(&url).json(&payload).send();
        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(ActionError::Canceled),
            res = request => res.map_err(|e| ActionError::Fail {
                reason: format!("telegram request failed: {e}"),
            })?,
        };

        let api: ApiResponse = response.json().await.map_err(|e| ActionError::Fail {
            reason: format!("unparseable telegram response: {e}"),
        })?;

        if !api.ok {
            return Err(ActionError::Fail {
                reason: format!(
                    "telegram api rejected the message: code={:?} description={:?}",
                    api.error_code, api.description
                ),
            });
        }

        info!(chat_id = %self.chat_id, "termination notification sent");
        Ok(())
    }
}

fn valid_chat_id(chat_id: &str) -> bool {
    if chat_id.is_empty() {
        return false;
    }
    if let Some(channel) = chat_id.strip_prefix('@') {
        return !channel.is_empty();
    }
    chat_id.strip_prefix('-').unwrap_or(chat_id).parse::<i64>().is_ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TerminationReason;

    fn cfg(token: &str, chat: &str) -> TelegramConfig {
        TelegramConfig {
            enabled: true,
            bot_token: token.to_string(),
            chat_id: chat.to_string(),
        }
    }

    #[test]
    fn construction_validates_credentials() {
        assert!(TelegramAction::new(&cfg("", "-100123")).is_err());
        assert!(TelegramAction::new(&cfg("123:abc", "")).is_err());
        assert!(TelegramAction::new(&cfg("123:abc", "not-a-chat")).is_err());

        assert!(TelegramAction::new(&cfg("123:abc", "-1001234567890")).is_ok());
        assert!(TelegramAction::new(&cfg("123:abc", "42")).is_ok());
        assert!(TelegramAction::new(&cfg("123:abc", "@ops-alerts")).is_ok());
    }

    #[test]
    fn message_carries_every_field() {
        let event = TerminationEvent {
            hostname: "worker-17".into(),
            private_ip: "10.0.0.5".into(),
            instance_id: "i-0abc123".into(),
            reason: TerminationReason::Spot,
        };
        let text = TelegramAction::format_message(&event);
        assert!(text.contains("worker-17"));
        assert!(text.contains("10.0.0.5"));
        assert!(text.contains("i-0abc123"));
        assert!(text.contains("spot"));
    }
}
