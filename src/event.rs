//! # Termination event emitted by a provider.
//!
//! A [`TerminationEvent`] is created at most once per process lifetime.
//! Receiving one commits the process to shutdown: the polling loop has
//! already gone terminal by the time the event is on the channel, and the
//! dispatcher fans it out to every configured action.
//!
//! ## Rules
//! - The value is immutable once emitted; the dispatcher's node-name
//!   override happens on its own clone before fan-out.
//! - Fields the provider could not fetch carry the literal `"unknown"`.
//!   A partially populated termination is vastly more useful than none.
//! - `reason` is a closed enum, so "reason present" holds by construction;
//!   well-formedness only needs to check hostname and instance id.

use std::fmt;

/// Why the platform is reclaiming the instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TerminationReason {
    /// Spot/preemptible capacity reclaim.
    Spot,
    /// Scheduled host maintenance.
    Maintenance,
}

impl TerminationReason {
    /// Stable lowercase tag for logs and notifications.
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Spot => "spot",
            TerminationReason::Maintenance => "maintenance",
        }
    }
}

impl fmt::Display for TerminationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Placeholder for metadata fields the provider could not fetch.
pub const UNKNOWN_FIELD: &str = "unknown";

/// A single instance-reclamation notice, resolved to node identity.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerminationEvent {
    /// Cloud hostname of the instance (or the node-name override).
    pub hostname: String,
    /// Primary private IP of the instance.
    pub private_ip: String,
    /// Cloud instance identifier.
    pub instance_id: String,
    /// Why the instance is going away.
    pub reason: TerminationReason,
}

impl TerminationEvent {
    /// True when the event carries enough identity for actions to address
    /// the right node. The dispatcher drops events that fail this.
    pub fn is_well_formed(&self) -> bool {
        !self.hostname.is_empty() && !self.instance_id.is_empty()
    }
}
