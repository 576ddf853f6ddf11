//! # Huawei provider: ECS spot reclaim via the OpenStack-style endpoint.
//!
//! Presence rule like AliCloud/Tencent, token auth like IMDSv2. The
//! metadata service exposes no instance-ID path, so the event always
//! carries `"unknown"` there; a partially populated termination is far
//! more useful than none.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::MetadataError;
use crate::event::{TerminationEvent, TerminationReason, UNKNOWN_FIELD};
use crate::metadata::{MetadataAuth, MetadataClient, TokenAuth};
use crate::providers::poll::{self, SpotCheck};
use crate::providers::{MonitorHandle, Provider, ProviderName};

/// Huawei metadata base (no `/latest` suffix; paths differ per endpoint).
pub const HUAWEI_METADATA_BASE_URL: &str = "http://169.254.169.254";

/// Huawei ECS spot detection.
#[derive(Debug, Clone)]
pub struct HuaweiProvider {
    client: MetadataClient,
    poll_interval: Duration,
    base_url: String,
}

impl HuaweiProvider {
    pub fn new(client: MetadataClient, poll_interval: Duration) -> Self {
        Self::with_base_url(client, poll_interval, HUAWEI_METADATA_BASE_URL)
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
            token_url: format!("{}/meta-data/latest/api/token", self.base_url),
            ttl_header: "X-Metadata-Token-Ttl-Seconds",
            token_header: "X-Metadata-Token",
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl Provider for HuaweiProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Huawei
    }

    async fn is_supported(&self) -> bool {
        match self
            .client
            .fetch(&self.url("/latest/meta-data/hostname"), &self.auth())
            .await
        {
            Ok(_) => {
                info!("huawei provider detected");
                true
            }
            Err(e) => {
                debug!(error = %e, "huawei provider not detected");
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
        info!("huawei provider monitoring started");
        handle
    }
}

#[async_trait]
impl SpotCheck for HuaweiProvider {
    fn provider(&self) -> ProviderName {
        ProviderName::Huawei
    }

    async fn termination_pending(&self) -> Result<bool, MetadataError> {
        match self
            .client
            .fetch(&self.url("/openstack/latest/spot/instance-action"), &self.auth())
            .await
        {
            Ok(_) => Ok(true),
            Err(MetadataError::Status { status, .. }) if status == StatusCode::NOT_FOUND => {
                debug!("no spot termination notice");
                Ok(false)
            }
            Err(e) => Err(e),
        }
    }

    async fn collect_event(&self) -> TerminationEvent {
        let auth = self.auth();
        TerminationEvent {
            hostname: self
                .client
                .fetch_or_unknown(&self.url("/latest/meta-data/hostname"), &auth, "hostname")
                .await,
            private_ip: self
                .client
                .fetch_or_unknown(&self.url("/latest/meta-data/local-ipv4"), &auth, "private_ip")
                .await,
            // no instance-ID endpoint on this metadata service
            instance_id: UNKNOWN_FIELD.to_string(),
            reason: TerminationReason::Spot,
        }
    }
}
