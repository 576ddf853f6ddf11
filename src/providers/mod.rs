//! # Cloud providers: detection protocols for instance reclamation.
//!
//! One type per cloud, all honouring the same contract:
//! - [`Provider::name`] — pure, constant tag.
//! - [`Provider::is_supported`] — cheap environment probe (the hostname
//!   metadata path), bounded by the configured request timeout.
//! - [`Provider::start_monitoring`] — spawns the polling task and returns
//!   immediately with a [`MonitorHandle`].
//!
//! ## Files & responsibilities
//! - **poll.rs**: the shared polling state machine — tick cadence,
//!   single-holder probe gate with silent tick drop, detached event
//!   emission, readiness signal.
//! - **select.rs**: picks the active provider, strictly by name or by
//!   auto-probe in construction order.
//! - **aws.rs / gcp.rs / alicloud.rs / tencent.rs / huawei.rs**: endpoint
//!   constants, auth scheme, and the provider-specific interpretation of
//!   the spot endpoint's answer.
//! - **dummy.rs**: synthetic provider for integration tests.
//!
//! ## Monitoring flow
//! ```text
//! Supervisor ──► provider.start_monitoring(ctx, out)
//!                      │ spawn
//!                      ▼
//!                poll::run() ── tick ──► probe spot endpoint
//!                      │                   ├─► no notice  → next tick
//!                      │                   └─► notice     → detached task:
//!                      │                           fetch identity fields,
//!                      ▼                           send event, close out
//!                  Terminal
//! ```
//!
//! ## Rules
//! - At most one in-flight probe per provider (gate, not queue).
//! - At most one emitted event per process lifetime.
//! - Cancellation at any point exits without emitting.

mod alicloud;
mod aws;
mod dummy;
mod gcp;
mod huawei;
mod poll;
mod select;
mod tencent;

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::event::TerminationEvent;

pub use alicloud::AlicloudProvider;
pub use aws::AwsProvider;
pub use dummy::DummyProvider;
pub use gcp::GcpProvider;
pub use huawei::HuaweiProvider;
pub use select::select_provider;
pub use tencent::TencentProvider;

/// Closed set of provider tags.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderName {
    Aws,
    Gcp,
    Alicloud,
    Tencent,
    Huawei,
    /// Integration testing only: unconditionally supported, fires a
    /// synthetic event after a configured delay.
    Dummy,
}

impl ProviderName {
    /// Stable lowercase tag.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderName::Aws => "aws",
            ProviderName::Gcp => "gcp",
            ProviderName::Alicloud => "alicloud",
            ProviderName::Tencent => "tencent",
            ProviderName::Huawei => "huawei",
            ProviderName::Dummy => "dummy",
        }
    }
}

impl fmt::Display for ProviderName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderName {
    type Err = ();

    /// Case-insensitive tag match.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "aws" => Ok(ProviderName::Aws),
            "gcp" => Ok(ProviderName::Gcp),
            "alicloud" => Ok(ProviderName::Alicloud),
            "tencent" => Ok(ProviderName::Tencent),
            "huawei" => Ok(ProviderName::Huawei),
            "dummy" => Ok(ProviderName::Dummy),
            _ => Err(()),
        }
    }
}

/// Handle to a spawned monitoring task.
///
/// `ready` flips to `true` once the polling loop is armed; tests join on it
/// instead of sleeping. `join` lets the supervisor await the task during
/// shutdown.
pub struct MonitorHandle {
    /// Readiness signal: `true` once the first tick is scheduled.
    pub ready: watch::Receiver<bool>,
    /// The monitoring task itself.
    pub join: JoinHandle<()>,
}

/// Detection protocol for one cloud.
///
/// Implementations are cheap to clone (they hold a shared
/// [`MetadataClient`](crate::metadata::MetadataClient) and a few
/// durations); `start_monitoring` clones the provider into its task.
#[async_trait]
pub trait Provider: Send + Sync + 'static {
    /// The provider's tag.
    fn name(&self) -> ProviderName;

    /// Probes a cheap, always-available metadata path (the hostname).
    ///
    /// Bounded by the metadata client's request timeout; never blocks
    /// longer. Logs at debug on failure, info on success.
    async fn is_supported(&self) -> bool;

    /// Spawns the polling task and returns immediately.
    ///
    /// The task emits at most one [`TerminationEvent`] on `out` and then
    /// goes terminal; `out` is moved into the task so the channel closes
    /// once the emission (or cancellation) is done.
    fn start_monitoring(
        &self,
        ctx: CancellationToken,
        out: mpsc::Sender<TerminationEvent>,
    ) -> MonitorHandle;
}

/// Shared handle to a provider object.
pub type ProviderRef = std::sync::Arc<dyn Provider>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn provider_names_round_trip() {
        for name in [
            ProviderName::Aws,
            ProviderName::Gcp,
            ProviderName::Alicloud,
            ProviderName::Tencent,
            ProviderName::Huawei,
            ProviderName::Dummy,
        ] {
            assert_eq!(name.as_str().parse::<ProviderName>(), Ok(name));
        }
    }

    #[test]
    fn provider_name_parse_is_case_insensitive() {
        assert_eq!("AWS".parse::<ProviderName>(), Ok(ProviderName::Aws));
        assert_eq!("Gcp".parse::<ProviderName>(), Ok(ProviderName::Gcp));
        assert!("azure".parse::<ProviderName>().is_err());
    }
}
