//! # Supervisor: wires the pipeline and drives graceful shutdown.
//!
//! The [`Supervisor`] owns the root cancellation scope, the termination
//! channel, and the monitoring + dispatcher tasks, and orchestrates the
//! run from provider selection to bounded shutdown.
//!
//! ## Architecture
//! ```text
//! Config ──► Supervisor::run()
//!                 │
//!                 ├──► MetadataClient (shared, request_timeout bound)
//!                 ├──► provider list (explicit construction order)
//!                 ├──► select_provider()         — fatal on none
//!                 ├──► build_actions()           — fatal on empty
//!                 │
//!                 ├──► provider.start_monitoring(child_token, tx)
//!                 ├──► dispatcher.run(child_token, rx)
//!                 │
//!                 └──► wait for:
//!                       ├──► OS signal            → cancel + grace wait
//!                       └──► dispatcher finished  → cancel + grace wait
//! ```
//!
//! ## Rules
//! - Errors cross into the supervisor only at startup; once monitoring is
//!   armed the process runs to its deadline.
//! - The termination channel is owned here; the provider borrows the
//!   sender, the dispatcher the receiver.
//! - Shutdown waits **at most** [`SHUTDOWN_GRACE`] for the spawned tasks;
//!   on timeout it logs a warning and returns anyway, since by then the
//!   platform clock has almost run out.

use std::time::Duration;

use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::timeout;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::actions::build_actions;
use crate::config::Config;
use crate::core::dispatch::Dispatcher;
use crate::core::shutdown;
use crate::error::SetupError;
use crate::event::TerminationEvent;
use crate::metadata::MetadataClient;
use crate::providers::{
    select_provider, AlicloudProvider, AwsProvider, DummyProvider, GcpProvider, HuaweiProvider,
    ProviderRef, TencentProvider,
};

/// Final cleanup budget after cancellation. Kept short: the actions have
/// already had their processing window by the time this starts.
const SHUTDOWN_GRACE: Duration = Duration::from_secs(10);

/// Owns the pipeline for one process lifetime.
pub struct Supervisor {
    config: Config,
}

impl Supervisor {
    /// Takes the validated configuration snapshot.
    pub fn new(config: Config) -> Self {
        Self { config }
    }

    /// Builds the provider list in auto-detection probe order.
    fn build_providers(&self, client: &MetadataClient) -> Vec<ProviderRef> {
        let poll = self.config.provider.poll_interval;
        vec![
            std::sync::Arc::new(AwsProvider::new(client.clone(), poll)),
            std::sync::Arc::new(GcpProvider::new(client.clone(), poll)),
            std::sync::Arc::new(AlicloudProvider::new(client.clone(), poll)),
            std::sync::Arc::new(TencentProvider::new(client.clone(), poll)),
            std::sync::Arc::new(HuaweiProvider::new(client.clone(), poll)),
            std::sync::Arc::new(DummyProvider::new(self.config.provider.dummy.detection_wait)),
        ]
    }

    /// Runs the agent until a shutdown signal or the dispatcher finishes.
    ///
    /// ### Exit conditions
    /// - **Startup failure** → `Err(SetupError)`; the caller exits non-zero.
    /// - **OS signal** → cancel everything, bounded wait, `Ok(())`.
    /// - **Dispatcher finished** (the single event was handled and the
    ///   channel closed) → same cancel + bounded wait, `Ok(())`.
    pub async fn run(&self) -> Result<(), SetupError> {
        let client = MetadataClient::new(self.config.provider.request_timeout)?;
        let providers = self.build_providers(&client);

        let root = CancellationToken::new();

        let provider = select_provider(&self.config.provider, &providers).await?;
        let actions = build_actions(&self.config.handler, provider.name()).await?;

        let (tx, rx) = mpsc::channel::<TerminationEvent>(1);

        let monitor = provider.start_monitoring(root.child_token(), tx);

        let dispatcher = Dispatcher::new(
            actions,
            self.config.handler.processing_timeout,
            self.config.node_name.clone(),
        );
        let dispatcher_task = tokio::spawn(dispatcher.run(root.child_token(), rx));

        info!(provider = %provider.name(), "evacuator running");
        self.drive_shutdown(&root, monitor.join, dispatcher_task)
            .await;
        Ok(())
    }

    /// Blocks until a signal arrives or the dispatcher finishes, then
    /// cancels the scope and drains both tasks under the grace budget.
    async fn drive_shutdown(
        &self,
        root: &CancellationToken,
        monitor: JoinHandle<()>,
        mut dispatcher: JoinHandle<()>,
    ) {
        let dispatcher_done = tokio::select! {
            _ = shutdown::wait_for_shutdown_signal() => {
                info!("shutdown signal received, stopping gracefully");
                false
            }
            _ = &mut dispatcher => {
                info!("dispatcher finished, stopping");
                true
            }
        };

        root.cancel();

        let drain = async {
            let _ = monitor.await;
            if !dispatcher_done {
                let _ = dispatcher.await;
            }
        };
        match timeout(SHUTDOWN_GRACE, drain).await {
            Ok(()) => info!("all tasks stopped"),
            Err(_) => warn!(grace = ?SHUTDOWN_GRACE, "timeout waiting for tasks to stop"),
        }

        info!("shutdown complete");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::DummyConfig;

    /// Scenario: dummy provider, implicit log action; the dispatcher
    /// finishes after the single synthetic event and run() returns.
    #[tokio::test(start_paused = true)]
    async fn dummy_pipeline_runs_to_completion() {
        let mut config = Config::default();
        config.provider.name = "dummy".to_string();
        config.provider.dummy = DummyConfig {
            detection_wait: Duration::from_secs(2),
        };
        config.validate().unwrap();

        Supervisor::new(config).run().await.unwrap();
    }

    #[tokio::test]
    async fn strict_selection_against_wrong_environment_is_fatal() {
        // no metadata service answers in the test environment
        let mut config = Config::default();
        config.provider.name = "gcp".to_string();
        config.provider.auto_detect = false;

        let err = Supervisor::new(config).run().await.unwrap_err();
        match err {
            SetupError::ProviderNotSupported { name } => assert_eq!(name, "gcp"),
            other => panic!("unexpected error: {other}"),
        }
    }
}
