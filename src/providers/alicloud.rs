//! # AliCloud provider: ECS spot reclaim.
//!
//! The termination-time endpoint exists only once a reclaim is scheduled:
//! 404 means "no notice", 200 means "notice present". The body (a UTC
//! timestamp) is not parsed; its presence is the whole signal.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::MetadataError;
use crate::event::{TerminationEvent, TerminationReason};
use crate::metadata::{MetadataAuth, MetadataClient, TokenAuth};
use crate::providers::poll::{self, SpotCheck};
use crate::providers::{MonitorHandle, Provider, ProviderName};

/// ECS metadata base.
pub const ALICLOUD_METADATA_BASE_URL: &str = "http://100.100.100.200/latest";

/// ECS spot detection with per-request token auth.
#[derive(Debug, Clone)]
pub struct AlicloudProvider {
    client: MetadataClient,
    poll_interval: Duration,
    base_url: String,
}

impl AlicloudProvider {
    pub fn new(client: MetadataClient, poll_interval: Duration) -> Self {
        Self::with_base_url(client, poll_interval, ALICLOUD_METADATA_BASE_URL)
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
            ttl_header: "X-aliyun-ecs-metadata-token-ttl-seconds",
            token_header: "X-aliyun-ecs-metadata-token",
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl Provider for AlicloudProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Alicloud
    }

    async fn is_supported(&self) -> bool {
        match self
            .client
            .fetch(&self.url("/meta-data/hostname"), &self.auth())
            .await
        {
            Ok(_) => {
                info!("alicloud provider detected");
                true
            }
            Err(e) => {
                debug!(error = %e, "alicloud provider not detected");
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
        info!("alicloud provider monitoring started");
        handle
    }
}

#[async_trait]
impl SpotCheck for AlicloudProvider {
    fn provider(&self) -> ProviderName {
        ProviderName::Alicloud
    }

    async fn termination_pending(&self) -> Result<bool, MetadataError> {
        match self
            .client
            .fetch(
                &self.url("/meta-data/instance/spot/termination-time"),
                &self.auth(),
            )
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
                .fetch_or_unknown(&self.url("/meta-data/hostname"), &auth, "hostname")
                .await,
            private_ip: self
                .client
                .fetch_or_unknown(&self.url("/meta-data/private-ipv4"), &auth, "private_ip")
                .await,
            instance_id: self
                .client
                .fetch_or_unknown(&self.url("/meta-data/instance-id"), &auth, "instance_id")
                .await,
            reason: TerminationReason::Spot,
        }
    }
}
