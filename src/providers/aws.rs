//! # AWS provider: EC2 spot interruption via IMDSv2.
//!
//! The spot endpoint answers 404 until an interruption notice exists; once
//! it answers 200 the JSON body names the pending `action`. Only `stop` and
//! `terminate` commit the node to evacuation.

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::MetadataError;
use crate::event::{TerminationEvent, TerminationReason};
use crate::metadata::{MetadataAuth, MetadataClient, TokenAuth};
use crate::providers::poll::{self, SpotCheck};
use crate::providers::{MonitorHandle, Provider, ProviderName};

/// Link-local IMDS base.
pub const AWS_METADATA_BASE_URL: &str = "http://169.254.169.254/latest";

/// Spot interruption notice: `{"action": "...", "time": "..."}`.
#[derive(Debug, Deserialize)]
struct SpotInstanceAction {
    action: String,
}

/// EC2 spot detection over IMDSv2.
#[derive(Debug, Clone)]
pub struct AwsProvider {
    client: MetadataClient,
    poll_interval: Duration,
    base_url: String,
}

impl AwsProvider {
    pub fn new(client: MetadataClient, poll_interval: Duration) -> Self {
        Self::with_base_url(client, poll_interval, AWS_METADATA_BASE_URL)
    }

    /// Same provider against a different metadata base; lets tests point it
    /// at a stub server.
    pub fn with_base_url(
        client: MetadataClient,
        poll_interval: Duration,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            client,
            poll_interval,
            base_url: base_url.into(),
        }
    }

    fn auth(&self) -> MetadataAuth {
        MetadataAuth::Token(TokenAuth {
            token_url: format!("{}/api/token", self.base_url),
            ttl_header: "X-aws-ec2-metadata-token-ttl-seconds",
            token_header: "X-aws-ec2-metadata-token",
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl Provider for AwsProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Aws
    }

    async fn is_supported(&self) -> bool {
        match self
            .client
            .fetch(&self.url("/meta-data/hostname"), &self.auth())
            .await
        {
            Ok(_) => {
                info!("aws provider detected");
                true
            }
            Err(e) => {
                debug!(error = %e, "aws provider not detected");
                false
            }
        }
    }

    fn start_monitoring(
        &self,
        ctx: CancellationToken,
        out: mpsc::Sender<TerminationEvent>,
    ) -> MonitorHandle {
        let handle = poll::spawn(self.clone(), self.poll_interval, ctx, out);
        info!("aws provider monitoring started");
        handle
    }
}

#[async_trait]
impl SpotCheck for AwsProvider {
    fn provider(&self) -> ProviderName {
        ProviderName::Aws
    }

    async fn termination_pending(&self) -> Result<bool, MetadataError> {
        let body = match self
            .client
            .fetch(&self.url("/meta-data/spot/instance-action"), &self.auth())
            .await
        {
            Ok(body) => body,
            // 404 until a notice exists; any non-200 means "no notice yet"
            Err(MetadataError::Status { status, .. }) => {
                debug!(%status, "no spot interruption notice");
                return Ok(false);
            }
            Err(e) => return Err(e),
        };

        match serde_json::from_str::<SpotInstanceAction>(&body) {
            Ok(notice) if matches!(notice.action.as_str(), "stop" | "terminate") => Ok(true),
            Ok(notice) => {
                debug!(action = %notice.action, "spot endpoint answered without a termination action");
                Ok(false)
            }
            Err(e) => {
                debug!(error = %e, "unparseable spot instance-action body");
                Ok(false)
            }
        }
    }

    async fn collect_event(&self) -> TerminationEvent {
        let auth = self.auth();
        TerminationEvent {
            hostname: self
                .client
                .fetch_or_unknown(&self.url("/meta-data/hostname"), &auth, "hostname")
                .await,
            private_ip: self
                .client
                .fetch_or_unknown(&self.url("/meta-data/local-ipv4"), &auth, "private_ip")
                .await,
            instance_id: self
                .client
                .fetch_or_unknown(&self.url("/meta-data/instance-id"), &auth, "instance_id")
                .await,
            reason: TerminationReason::Spot,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn spot_body_parses_action() {
        let notice: SpotInstanceAction =
            serde_json::from_str(r#"{"action":"stop","time":"2024-01-01T00:00:00Z"}"#).unwrap();
        assert_eq!(notice.action, "stop");
    }
}
