//! # Evacuation actions.
//!
//! An [`Action`] is a named unit of evacuation work. Actions are
//! independent: the dispatcher runs every one of them concurrently under
//! the shared processing deadline and applies no ordering semantics
//! between them.
//!
//! ## Files & responsibilities
//! - **registry.rs**: builds the action list from `HandlerConfig`,
//!   enforcing prerequisites at construction time.
//! - **log.rs**: log-echo action (always on for the dummy provider).
//! - **kubernetes.rs**: cordon + drain of the local Kubernetes node.
//! - **nomad.rs**: drain of the local Nomad node over the HTTP API.
//! - **telegram.rs**: chat notification.
//!
//! ## Rules
//! - Prerequisites (cluster credentials, chat id) are resolved when the
//!   action is constructed. Deferring those checks to event time would
//!   waste the grace period.
//! - `handle` implementations own their clients; nothing is shared across
//!   actions through the dispatcher.
//! - Implementations should watch `ctx` at their own await points and
//!   return [`ActionError::Canceled`](crate::error::ActionError::Canceled)
//!   when it fires; the dispatcher cancels `ctx` when the per-action
//!   deadline expires.

mod kubernetes;
mod log;
mod nomad;
mod registry;
mod telegram;

use std::sync::Arc;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use crate::error::ActionError;
use crate::event::TerminationEvent;

pub use kubernetes::KubernetesAction;
pub use log::LogAction;
pub use nomad::NomadAction;
pub use registry::build_actions;
pub use telegram::TelegramAction;

/// A named unit of evacuation work.
#[async_trait]
pub trait Action: Send + Sync + 'static {
    /// Stable action name for logs and the dispatch summary.
    fn name(&self) -> &'static str;

    /// Processes one termination event.
    ///
    /// Runs under the dispatcher's per-action deadline; `ctx` is cancelled
    /// when that deadline expires or the agent shuts down.
    async fn handle(
        &self,
        ctx: CancellationToken,
        event: &TerminationEvent,
    ) -> Result<(), ActionError>;
}

/// Shared handle to an action object.
pub type ActionRef = Arc<dyn Action>;
