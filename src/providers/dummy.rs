//! # Dummy provider: synthetic termination for integration tests.
//!
//! Always reports supported and fires one fixed event after
//! `provider.dummy.detection_wait`. It never touches the network, which
//! makes end-to-end runs self-contained; the registry pairs it with the
//! log-echo action so the whole pipeline is observable from the log
//! stream alone.

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::event::{TerminationEvent, TerminationReason};
use crate::providers::{MonitorHandle, Provider, ProviderName};

/// Synthetic provider; the emitted event is fixed.
#[derive(Debug, Clone)]
pub struct DummyProvider {
    detection_wait: Duration,
}

impl DummyProvider {
    pub fn new(detection_wait: Duration) -> Self {
        Self { detection_wait }
    }

    fn synthetic_event() -> TerminationEvent {
        TerminationEvent {
            hostname: "dummy".to_string(),
            private_ip: "172.16.1.1".to_string(),
            instance_id: "dummy-instance-id".to_string(),
            reason: TerminationReason::Spot,
        }
    }
}

#[async_trait]
impl Provider for DummyProvider {
    fn name(&self) -> ProviderName {
        ProviderName::Dummy
    }

    async fn is_supported(&self) -> bool {
        info!("dummy provider detected");
        true
    }

    fn start_monitoring(
        &self,
        ctx: CancellationToken,
        out: mpsc::Sender<TerminationEvent>,
    ) -> MonitorHandle {
        let (ready_tx, ready_rx) = watch::channel(false);
        let wait = self.detection_wait;

        let join = tokio::spawn(async move {
            let _ = ready_tx.send(true);
            tokio::select! {
                _ = ctx.cancelled() => {
                    debug!("dummy monitoring cancelled");
                    return;
                }
                _ = tokio::time::sleep(wait) => {}
            }

            info!("termination notice detected");
            info!("monitoring stopped, handing off to dispatcher");
            if out.send(Self::synthetic_event()).await.is_err() {
                debug!("dispatcher already gone, event dropped");
            }
        });

        info!("dummy provider monitoring started");
        MonitorHandle {
            ready: ready_rx,
            join,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test(start_paused = true)]
    async fn fires_the_synthetic_event_after_the_wait() {
        let provider = DummyProvider::new(Duration::from_secs(2));
        let ctx = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);

        let handle = provider.start_monitoring(ctx, tx);
        let event = rx.recv().await.expect("synthetic event");
        assert_eq!(event.hostname, "dummy");
        assert_eq!(event.private_ip, "172.16.1.1");
        assert_eq!(event.instance_id, "dummy-instance-id");
        assert_eq!(event.reason, TerminationReason::Spot);
        assert!(event.is_well_formed());
        handle.join.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_beats_the_wait() {
        let provider = DummyProvider::new(Duration::from_secs(60));
        let ctx = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(1);

        let handle = provider.start_monitoring(ctx.clone(), tx);
        ctx.cancel();
        handle.join.await.unwrap();
        assert!(rx.recv().await.is_none());
    }
}
