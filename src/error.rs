//! # Error types used by the evacuator runtime and actions.
//!
//! This module defines three error enums:
//!
//! - [`SetupError`] errors raised while bringing the agent up. These are
//!   fatal: once monitoring has started the process is committed to running
//!   to the grace-period deadline and nothing below this layer can abort it.
//! - [`ActionError`] errors raised by individual evacuation actions. These
//!   are never fatal; the dispatcher aggregates them into its summary.
//! - [`MetadataError`] errors raised by the instance metadata client. The
//!   HTTP status is preserved so that callers can tell "no notice yet"
//!   (404 on the spot endpoints) apart from real failures.

use std::time::Duration;

use reqwest::StatusCode;
use thiserror::Error;

/// # Errors that abort startup.
///
/// Everything here is raised before the polling loop is armed. After that
/// point failures are logged and absorbed, never propagated.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum SetupError {
    /// Configuration file exists but could not be read or parsed.
    #[error("failed to load config file '{path}': {reason}")]
    ConfigLoad {
        /// Path that was attempted.
        path: String,
        /// Parse or I/O detail.
        reason: String,
    },

    /// A configuration value failed validation.
    #[error("invalid configuration: {reason}")]
    ConfigInvalid {
        /// Which invariant was violated.
        reason: String,
    },

    /// The logging backend could not be installed.
    #[error("failed to initialise logging: {reason}")]
    Logging { reason: String },

    /// The HTTP client for the metadata service could not be built.
    #[error("failed to build metadata client: {0}")]
    MetadataClient(#[source] reqwest::Error),

    /// `provider.name` named a tag that is not in the provider list.
    #[error("configured provider '{name}' not found")]
    ProviderNotFound {
        /// The unknown tag.
        name: String,
    },

    /// Explicit selection is strict: the operator asserted a provider and
    /// the environment disagreed.
    #[error("configured provider '{name}' is not supported in this environment")]
    ProviderNotSupported {
        /// The asserted provider tag.
        name: String,
    },

    /// Auto-detection probed every provider and none answered.
    #[error("no supported provider detected")]
    NoProviderDetected,

    /// Neither an explicit provider nor auto-detection was configured.
    #[error("no provider specified and auto-detect disabled")]
    NoProviderConfigured,

    /// An enabled action could not initialise (bad credentials, unreachable
    /// cluster, malformed chat id).
    #[error("action '{name}' failed to initialise: {reason}")]
    ActionInit {
        /// The action that failed.
        name: &'static str,
        /// Construction detail.
        reason: String,
    },

    /// The registry produced an empty action list; an agent with nothing to
    /// run on termination is a misconfiguration.
    #[error("no evacuation actions could be constructed: {reasons:?}")]
    NoActions {
        /// Collected per-action construction failures.
        reasons: Vec<String>,
    },
}

impl SetupError {
    /// Returns a short stable label (snake_case) for logs.
    pub fn as_label(&self) -> &'static str {
        match self {
            SetupError::ConfigLoad { .. } => "setup_config_load",
            SetupError::ConfigInvalid { .. } => "setup_config_invalid",
            SetupError::Logging { .. } => "setup_logging",
            SetupError::MetadataClient(_) => "setup_metadata_client",
            SetupError::ProviderNotFound { .. } => "setup_provider_not_found",
            SetupError::ProviderNotSupported { .. } => "setup_provider_not_supported",
            SetupError::NoProviderDetected => "setup_no_provider_detected",
            SetupError::NoProviderConfigured => "setup_no_provider_configured",
            SetupError::ActionInit { .. } => "setup_action_init",
            SetupError::NoActions { .. } => "setup_no_actions",
        }
    }
}

/// # Errors produced by evacuation actions.
///
/// One of these per failed action per event. The dispatcher records them in
/// its outcome list and keeps going; a partial drain is better than none.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum ActionError {
    /// The action did not finish inside the shared processing deadline.
    #[error("timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    /// The action observed cancellation and gave up cooperatively.
    ///
    /// Reported like any other failure in the aggregate; the cloud clock
    /// does not care why an action stopped.
    #[error("context canceled")]
    Canceled,

    /// The action ran and failed.
    #[error("execution failed: {reason}")]
    Fail { reason: String },
}

impl ActionError {
    /// Returns a short stable label.
    pub fn as_label(&self) -> &'static str {
        match self {
            ActionError::Timeout { .. } => "action_timeout",
            ActionError::Canceled => "action_canceled",
            ActionError::Fail { .. } => "action_failed",
        }
    }
}

/// # Errors produced by the instance metadata client.
#[non_exhaustive]
#[derive(Error, Debug)]
pub enum MetadataError {
    /// Transport-level failure (connect, timeout, body read).
    #[error("metadata request failed: {0}")]
    Transport(#[from] reqwest::Error),

    /// The endpoint answered with something other than 200.
    #[error("metadata endpoint {url} answered {status}")]
    Status {
        /// The non-200 status.
        status: StatusCode,
        /// The endpoint that produced it.
        url: String,
    },
}

impl MetadataError {
    /// The HTTP status carried by this error, if any.
    ///
    /// Spot endpoints on AliCloud and Tencent answer 404 until a notice
    /// exists; providers use this to tell that apart from real failures.
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            MetadataError::Status { status, .. } => Some(*status),
            MetadataError::Transport(e) => e.status(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_accessor_exposes_http_code() {
        let err = MetadataError::Status {
            status: StatusCode::NOT_FOUND,
            url: "http://100.100.100.200/latest/meta-data/instance/spot/termination-time".into(),
        };
        assert_eq!(err.status(), Some(StatusCode::NOT_FOUND));
    }

    #[test]
    fn labels_are_stable() {
        assert_eq!(
            ActionError::Timeout {
                timeout: Duration::from_secs(75)
            }
            .as_label(),
            "action_timeout"
        );
        assert_eq!(
            SetupError::NoProviderDetected.as_label(),
            "setup_no_provider_detected"
        );
    }
}
