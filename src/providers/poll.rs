//! # Shared polling state machine.
//!
//! Every HTTP provider drives the same loop; only the probe interpretation
//! differs, so the loop lives here once, parameterised over [`SpotCheck`].
//!
//! States: `Idle → Probing → (Idle | Announcing) → Terminal`.
//!
//! ```text
//! loop {
//!   ├─► wait for tick (cancellable)
//!   ├─► try to take the probe gate
//!   │     └─► already held → drop the tick silently (debug)
//!   ├─► termination_pending()
//!   │     ├─► Err       → error log, release gate, next tick
//!   │     ├─► Ok(false) → release gate, next tick
//!   │     └─► Ok(true)  → spawn detached emission task (gate moves in),
//!   │                     loop returns immediately → Terminal
//!   └─► emission task: collect identity fields (best effort),
//!                      send the single event, release gate
//! }
//! ```
//!
//! ## Rules
//! - The gate bounds concurrency at one probe per provider with zero
//!   queueing: metadata endpoints occasionally stall for seconds, and a
//!   naïve ticker would overlap probes and amplify load.
//! - Missed ticks are skipped, never bursted.
//! - The first probe happens one full interval after start.
//! - The event sender is owned by the loop, so the channel closes as soon
//!   as monitoring ends, emission or not.
//! - Cancellation at any await exits without emitting.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch, Mutex};
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::error::MetadataError;
use crate::event::TerminationEvent;
use crate::providers::{MonitorHandle, ProviderName};

/// Provider-specific probe: what the loop asks on every tick.
#[async_trait]
pub(crate) trait SpotCheck: Clone + Send + Sync + 'static {
    /// Tag for log fields.
    fn provider(&self) -> ProviderName;

    /// Asks the spot endpoint whether a termination notice exists.
    ///
    /// `Ok(false)` is the quiet steady state; `Err` is a probe failure the
    /// loop logs and absorbs.
    async fn termination_pending(&self) -> Result<bool, MetadataError>;

    /// Fetches the identity fields for the event. Best effort: fields the
    /// metadata service will not give up are filled with `"unknown"`.
    async fn collect_event(&self) -> TerminationEvent;
}

/// Spawns the polling loop for `check` and returns its handle.
pub(crate) fn spawn<C: SpotCheck>(
    check: C,
    poll_interval: Duration,
    ctx: CancellationToken,
    out: mpsc::Sender<TerminationEvent>,
) -> MonitorHandle {
    let (ready_tx, ready_rx) = watch::channel(false);
    let join = tokio::spawn(run(check, poll_interval, ctx, out, ready_tx));
    MonitorHandle {
        ready: ready_rx,
        join,
    }
}

async fn run<C: SpotCheck>(
    check: C,
    poll_interval: Duration,
    ctx: CancellationToken,
    out: mpsc::Sender<TerminationEvent>,
    ready: watch::Sender<bool>,
) {
    let provider = check.provider();
    let gate = Arc::new(Mutex::new(()));

    let mut ticker = time::interval_at(Instant::now() + poll_interval, poll_interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let _ = ready.send(true);
    debug!(%provider, interval = ?poll_interval, "polling armed");

    loop {
        tokio::select! {
            _ = ctx.cancelled() => {
                debug!(%provider, "monitoring cancelled");
                return;
            }
            _ = ticker.tick() => {}
        }

        let guard = match Arc::clone(&gate).try_lock_owned() {
            Ok(guard) => guard,
            Err(_) => {
                debug!(%provider, "probe already in flight, tick dropped");
                continue;
            }
        };

        match check.termination_pending().await {
            Err(e) => {
                error!(%provider, error = %e, "failed to probe spot endpoint");
                drop(guard);
            }
            Ok(false) => drop(guard),
            Ok(true) => {
                info!(%provider, "termination notice detected");

                // The gate travels into the emission task so that any late
                // tick racing this handoff is still dropped.
                let check = check.clone();
                let emit_ctx = ctx.clone();
                tokio::spawn(async move {
                    let _guard = guard;
                    info!(%provider, "monitoring stopped, handing off to dispatcher");

                    let event = check.collect_event().await;
                    tokio::select! {
                        _ = emit_ctx.cancelled() => {
                            debug!(%provider, "cancelled before the event could be delivered");
                        }
                        sent = out.send(event) => {
                            if sent.is_err() {
                                debug!(%provider, "dispatcher already gone, event dropped");
                            }
                        }
                    }
                });
                return;
            }
        }
    }
}
