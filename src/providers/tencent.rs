//! # Tencent provider: CVM spot reclaim.
//!
//! Same presence rule as AliCloud (200 = notice, 404 = none), but the
//! metadata service takes no authentication at all.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::StatusCode;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::MetadataError;
use crate::event::{TerminationEvent, TerminationReason};
use crate::metadata::{MetadataAuth, MetadataClient};
use crate::providers::poll::{self, SpotCheck};
use crate::providers::{MonitorHandle, Provider, ProviderName};

/// CVM metadata base.
pub const TENCENT_METADATA_BASE_URL: &str = "http://metadata.tencentyun.com/latest";

const AUTH: MetadataAuth = MetadataAuth::None;

/// CVM spot detection, unauthenticated metadata.
#[derive(Debug, Clone)]
pub struct TencentProvider {
    client: MetadataClient,
    poll_interval: Duration,
    base_url: String,
}

impl TencentProvider {
    pub fn new(client: MetadataClient, poll_interval: Duration) -> Self {
        Self::with_base_url(client, poll_interval, TENCENT_METADATA_BASE_URL)
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

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

#[async_trait]
impl Provider for TencentProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Tencent
    }

    async fn is_supported(&self) -> bool {
        match self
            .client
            .fetch(&self.url("/meta-data/hostname"), &AUTH)
            .await
        {
            Ok(_) => {
                info!("tencent provider detected");
                true
            }
            Err(e) => {
                debug!(error = %e, "tencent provider not detected");
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
        info!("tencent provider monitoring started");
        handle
    }
}

#[async_trait]
impl SpotCheck for TencentProvider {
    fn provider(&self) -> ProviderName {
        ProviderName::Tencent
    }

    async fn termination_pending(&self) -> Result<bool, MetadataError> {
        match self
            .client
            .fetch(&self.url("/meta-data/instance/spot/termination-time"), &AUTH)
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
        TerminationEvent {
            hostname: self
                .client
                .fetch_or_unknown(&self.url("/meta-data/hostname"), &AUTH, "hostname")
                .await,
            private_ip: self
                .client
                .fetch_or_unknown(&self.url("/meta-data/local-ipv4"), &AUTH, "private_ip")
                .await,
            instance_id: self
                .client
                .fetch_or_unknown(&self.url("/meta-data/instance-id"), &AUTH, "instance_id")
                .await,
            reason: TerminationReason::Spot,
        }
    }
}
