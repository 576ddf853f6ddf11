//! # GCP provider: preemptible VM reclaim.
//!
//! GCP's endpoint always answers 200; the body is the signal. It reads
//! `"TRUE"` once the VM has been marked for preemption and `"FALSE"`
//! before that, so the probe compares against the literal.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::MetadataError;
use crate::event::{TerminationEvent, TerminationReason};
use crate::metadata::{MetadataAuth, MetadataClient};
use crate::providers::poll::{self, SpotCheck};
use crate::providers::{MonitorHandle, Provider, ProviderName};

/// GCE instance metadata base.
pub const GCP_METADATA_BASE_URL: &str =
    "http://metadata.google.internal/computeMetadata/v1/instance";

const AUTH: MetadataAuth = MetadataAuth::Header {
    name: "Metadata-Flavor",
    value: "Google",
};

/// Preemptible-VM detection over the GCE metadata service.
#[derive(Debug, Clone)]
pub struct GcpProvider {
    client: MetadataClient,
    poll_interval: Duration,
    base_url: String,
}

impl GcpProvider {
    pub fn new(client: MetadataClient, poll_interval: Duration) -> Self {
        Self::with_base_url(client, poll_interval, GCP_METADATA_BASE_URL)
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
impl Provider for GcpProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Gcp
    }

    async fn is_supported(&self) -> bool {
        match self.client.fetch(&self.url("/hostname"), &AUTH).await {
            Ok(_) => {
                info!("gcp provider detected");
                true
            }
            Err(e) => {
                debug!(error = %e, "gcp provider not detected");
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
        info!("gcp provider monitoring started");
        handle
    }
}

#[async_trait]
impl SpotCheck for GcpProvider {
    fn provider(&self) -> ProviderName {
        ProviderName::Gcp
    }

    async fn termination_pending(&self) -> Result<bool, MetadataError> {
        let body = self
            .client
            .fetch(&self.url("/meta-data/spot/instance-action"), &AUTH)
            .await?;
        if body.trim() == "TRUE" {
            return Ok(true);
        }
        debug!("no preemption notice");
        Ok(false)
    }

    async fn collect_event(&self) -> TerminationEvent {
        TerminationEvent {
            hostname: self
                .client
                .fetch_or_unknown(&self.url("/hostname"), &AUTH, "hostname")
                .await,
            private_ip: self
                .client
                .fetch_or_unknown(&self.url("/network-interfaces/0/ip"), &AUTH, "private_ip")
                .await,
            instance_id: self
                .client
                .fetch_or_unknown(&self.url("/id"), &AUTH, "instance_id")
                .await,
            reason: TerminationReason::Spot,
        }
    }
}
