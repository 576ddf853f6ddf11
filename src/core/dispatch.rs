//! # Evacuation dispatcher.
//!
//! Consumes the termination channel and fans each event out to every
//! configured action under a shared deadline.
//!
//! ```text
//! rx.recv() ──► well-formed? ──► apply node-name override
//!                    │                   │ (fan-out, JoinSet)
//!                    │ no                ├──► action A ── timeout ──► outcome
//!                    ▼                   ├──► action B ── timeout ──► outcome
//!                 warn, drop             └──► action N ── timeout ──► outcome
//!                                                 │
//!                                     await all ──► one summary log
//! ```
//!
//! ## Rules
//! - There will be at most one event per process life; the loop shape is
//!   for symmetry and testability.
//! - Exactly N outcome records per dispatched event, one per action.
//! - No short-circuit on first error: every action gets its chance.
//! - A panicking action is caught and recorded as its own failure.
//! - A timed-out action has its child token cancelled and is recorded as
//!   [`ActionError::Timeout`].
//! - The dispatcher itself never returns an error: the cloud clock is
//!   authoritative and a partial drain is better than none.

use std::time::{Duration, SystemTime};

use futures::FutureExt;
use tokio::sync::mpsc;
use tokio::task::JoinSet;
use tokio::time;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::actions::ActionRef;
use crate::error::ActionError;
use crate::event::TerminationEvent;

/// Result record for one action's run against one event.
#[derive(Debug)]
pub struct ActionOutcome {
    /// Which action produced this record.
    pub action: &'static str,
    /// How the action ended.
    pub result: Result<(), ActionError>,
    /// Wall-clock completion time, for the summary log.
    pub finished_at: SystemTime,
}

/// Fans termination events out to the action list.
pub struct Dispatcher {
    actions: Vec<ActionRef>,
    processing_timeout: Duration,
    node_name_override: String,
}

impl Dispatcher {
    /// `node_name_override` empty means "keep the provider's hostname".
    pub fn new(
        actions: Vec<ActionRef>,
        processing_timeout: Duration,
        node_name_override: String,
    ) -> Self {
        Self {
            actions,
            processing_timeout,
            node_name_override,
        }
    }

    /// Runs until the channel closes or the scope is cancelled.
    pub async fn run(self, ctx: CancellationToken, mut rx: mpsc::Receiver<TerminationEvent>) {
        loop {
            let event = tokio::select! {
                _ = ctx.cancelled() => {
                    debug!("dispatcher cancelled");
                    return;
                }
                received = rx.recv() => match received {
                    Some(event) => event,
                    None => {
                        debug!("termination channel closed, dispatcher done");
                        return;
                    }
                },
            };
            self.dispatch(&ctx, event).await;
        }
    }

    /// Fans one event out and aggregates the outcomes.
    ///
    /// Exposed at crate level so tests can drive a single dispatch without
    /// a channel.
    pub(crate) async fn dispatch(
        &self,
        ctx: &CancellationToken,
        mut event: TerminationEvent,
    ) -> Vec<ActionOutcome> {
        if !event.is_well_formed() {
            warn!(?event, "rejecting ill-formed termination event");
            return Vec::new();
        }

        if !self.node_name_override.is_empty() {
            debug!(
                from = %event.hostname,
                to = %self.node_name_override,
                "applying node name override"
            );
            event.hostname = self.node_name_override.clone();
        }

        info!(
            hostname = %event.hostname,
            reason = %event.reason,
            actions = self.actions.len(),
            "termination event received, dispatching to all actions"
        );

        let mut set = JoinSet::new();
        for action in &self.actions {
            let action = action.clone();
            let event = event.clone();
            let child = ctx.child_token();
            let timeout = self.processing_timeout;

            set.spawn(async move {
                let name = action.name();
                let work = action.handle(child.clone(), &event);
                let result = match time::timeout(timeout, std::panic::AssertUnwindSafe(work).catch_unwind()).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(panic)) => Err(ActionError::Fail {
                        reason: format!("action panicked: {panic:?}"),
                    }),
                    Err(_elapsed) => {
                        child.cancel();
                        Err(ActionError::Timeout { timeout })
                    }
                };
                ActionOutcome {
                    action: name,
                    result,
                    finished_at: SystemTime::now(),
                }
            });
        }

        let mut outcomes = Vec::with_capacity(self.actions.len());
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(outcome) => outcomes.push(outcome),
                // catch_unwind leaves only external aborts here; still
                // account for the record so totality holds
                Err(join_err) => outcomes.push(ActionOutcome {
                    action: "unknown",
                    result: Err(ActionError::Fail {
                        reason: format!("action task aborted: {join_err}"),
                    }),
                    finished_at: SystemTime::now(),
                }),
            }
        }

        let mut succeeded = 0usize;
        for outcome in &outcomes {
            match &outcome.result {
                Ok(()) => {
                    info!(action = outcome.action, "action processed termination event");
                    succeeded += 1;
                }
                Err(e) => {
                    error!(
                        action = outcome.action,
                        error = %e,
                        label = e.as_label(),
                        "action failed to process termination event"
                    );
                }
            }
        }

        info!(
            total = outcomes.len(),
            succeeded,
            failed = outcomes.len() - succeeded,
            "termination event processing completed"
        );
        outcomes
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    use async_trait::async_trait;
    use tokio::sync::Mutex;

    use super::*;
    use crate::actions::Action;
    use crate::event::TerminationReason;

    fn event(hostname: &str) -> TerminationEvent {
        TerminationEvent {
            hostname: hostname.to_string(),
            private_ip: "10.0.0.5".to_string(),
            instance_id: "i-0abc123".to_string(),
            reason: TerminationReason::Spot,
        }
    }

    /// Sleeps for `delay`, then succeeds; remembers the hostname it saw.
    struct RecordingAction {
        name: &'static str,
        delay: Duration,
        seen_hostnames: Arc<Mutex<Vec<String>>>,
        calls: Arc<AtomicUsize>,
    }

    impl RecordingAction {
        fn arc(name: &'static str, delay: Duration) -> Arc<Self> {
            Arc::new(Self {
                name,
                delay,
                seen_hostnames: Arc::new(Mutex::new(Vec::new())),
                calls: Arc::new(AtomicUsize::new(0)),
            })
        }
    }

    #[async_trait]
    impl Action for RecordingAction {
        fn name(&self) -> &'static str {
            self.name
        }

        async fn handle(
            &self,
            ctx: CancellationToken,
            event: &TerminationEvent,
        ) -> Result<(), ActionError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen_hostnames.lock().await.push(event.hostname.clone());
            tokio::select! {
                _ = ctx.cancelled() => Err(ActionError::Canceled),
                _ = time::sleep(self.delay) => Ok(()),
            }
        }
    }

    struct FailingAction;

    #[async_trait]
    impl Action for FailingAction {
        fn name(&self) -> &'static str {
            "failing"
        }

        async fn handle(
            &self,
            _ctx: CancellationToken,
            _event: &TerminationEvent,
        ) -> Result<(), ActionError> {
            Err(ActionError::Fail {
                reason: "boom".to_string(),
            })
        }
    }

    struct PanickingAction;

    #[async_trait]
    impl Action for PanickingAction {
        fn name(&self) -> &'static str {
            "panicking"
        }

        async fn handle(
            &self,
            _ctx: CancellationToken,
            _event: &TerminationEvent,
        ) -> Result<(), ActionError> {
            panic!("unexpected");
        }
    }

    #[tokio::test(start_paused = true)]
    async fn produces_exactly_one_outcome_per_action() {
        let actions: Vec<ActionRef> = vec![
            RecordingAction::arc("a", Duration::ZERO),
            Arc::new(FailingAction),
            RecordingAction::arc("c", Duration::ZERO),
        ];
        let dispatcher = Dispatcher::new(actions, Duration::from_secs(5), String::new());

        let outcomes = dispatcher
            .dispatch(&CancellationToken::new(), event("worker-1"))
            .await;
        assert_eq!(outcomes.len(), 3);
        assert_eq!(outcomes.iter().filter(|o| o.result.is_ok()).count(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn slow_action_times_out_while_fast_one_succeeds() {
        let fast = RecordingAction::arc("fast", Duration::from_secs(2));
        let slow = RecordingAction::arc("slow", Duration::from_secs(90));
        let dispatcher = Dispatcher::new(
            vec![fast.clone(), slow.clone()],
            Duration::from_secs(5),
            String::new(),
        );

        let outcomes = dispatcher
            .dispatch(&CancellationToken::new(), event("worker-1"))
            .await;

        assert_eq!(outcomes.len(), 2);
        for outcome in &outcomes {
            match outcome.action {
                "fast" => assert!(outcome.result.is_ok()),
                "slow" => assert!(matches!(
                    outcome.result,
                    Err(ActionError::Timeout { .. }) | Err(ActionError::Canceled)
                )),
                other => panic!("unexpected action {other}"),
            }
        }
    }

    #[tokio::test(start_paused = true)]
    async fn node_name_override_reaches_every_action() {
        let a = RecordingAction::arc("a", Duration::ZERO);
        let b = RecordingAction::arc("b", Duration::ZERO);
        let dispatcher = Dispatcher::new(
            vec![a.clone(), b.clone()],
            Duration::from_secs(5),
            "worker-17".to_string(),
        );

        dispatcher
            .dispatch(
                &CancellationToken::new(),
                event("ip-10-0-0-5.ec2.internal"),
            )
            .await;

        assert_eq!(a.seen_hostnames.lock().await.as_slice(), ["worker-17"]);
        assert_eq!(b.seen_hostnames.lock().await.as_slice(), ["worker-17"]);
    }

    #[tokio::test(start_paused = true)]
    async fn ill_formed_events_are_rejected_before_fan_out() {
        let a = RecordingAction::arc("a", Duration::ZERO);
        let dispatcher =
            Dispatcher::new(vec![a.clone()], Duration::from_secs(5), String::new());

        let mut bad = event("worker-1");
        bad.instance_id.clear();
        let outcomes = dispatcher.dispatch(&CancellationToken::new(), bad).await;

        assert!(outcomes.is_empty());
        assert_eq!(a.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn panicking_action_is_a_recorded_failure() {
        let a = RecordingAction::arc("a", Duration::ZERO);
        let dispatcher = Dispatcher::new(
            vec![Arc::new(PanickingAction), a],
            Duration::from_secs(5),
            String::new(),
        );

        let outcomes = dispatcher
            .dispatch(&CancellationToken::new(), event("worker-1"))
            .await;
        assert_eq!(outcomes.len(), 2);
        let panicked = outcomes.iter().find(|o| o.action == "panicking").unwrap();
        assert!(matches!(panicked.result, Err(ActionError::Fail { .. })));
    }

    #[tokio::test(start_paused = true)]
    async fn run_exits_when_the_channel_closes() {
        let a = RecordingAction::arc("a", Duration::ZERO);
        let dispatcher =
            Dispatcher::new(vec![a.clone()], Duration::from_secs(5), String::new());
        let (tx, rx) = mpsc::channel(1);
        let ctx = CancellationToken::new();

        let handle = tokio::spawn(dispatcher.run(ctx, rx));
        tx.send(event("worker-1")).await.unwrap();
        drop(tx);

        handle.await.unwrap();
        assert_eq!(a.calls.load(Ordering::SeqCst), 1);
    }
}
