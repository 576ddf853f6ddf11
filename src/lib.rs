//! # evacuator
//!
//! **Evacuator** is a per-node agent for cloud compute fleets. It runs
//! alongside a workload, detects as early as the platform allows that the
//! host instance is about to be reclaimed (spot termination, scheduled
//! maintenance), and drives the local workload through a bounded,
//! best-effort evacuation before the reclamation deadline.
//!
//! ## Features
//!
//! | Area           | Description                                                        | Key types / traits                      |
//! |----------------|--------------------------------------------------------------------|-----------------------------------------|
//! | **Providers**  | Per-cloud detection protocols over the instance metadata service.  | [`Provider`], [`ProviderName`]          |
//! | **Polling**    | Serialized probes with drop-on-contention, one event per lifetime. | [`MonitorHandle`]                       |
//! | **Actions**    | Named evacuation side effects (drain a node, notify a chat).       | [`Action`], [`ActionRef`]               |
//! | **Dispatch**   | Fan-out of the one event under a shared wall-clock budget.         | [`Dispatcher`], [`ActionOutcome`]       |
//! | **Supervision**| Root cancellation scope, signals, bounded shutdown.                | [`Supervisor`]                          |
//! | **Errors**     | Typed startup / action / metadata failures.                        | [`SetupError`], [`ActionError`]         |
//! | **Config**     | Env > YAML > defaults snapshot, validated once.                    | [`Config`]                              |
//!
//! ## Pipeline
//! ```text
//! Supervisor → Selector → Provider.startMonitoring
//!     → (later) one TerminationEvent
//!     → Dispatcher → fan-out to Actions under processing_timeout
//!     → aggregate → exit
//! ```
//!
//! The detection window is unforgiving: roughly 120 seconds on AWS-class
//! platforms and 30 on GCP-class ones. Everything here is shaped by that.
//! Probes are serialized and droppable rather than queued, actions run in
//! parallel under one shared deadline, and a partial drain always beats
//! waiting for a perfect one.

mod actions;
mod config;
mod core;
mod error;
mod event;
mod logging;
mod metadata;
mod providers;

// ---- Public re-exports ----

pub use actions::{
    build_actions, Action, ActionRef, KubernetesAction, LogAction, NomadAction, TelegramAction,
};
pub use config::{
    parse_duration, Config, DummyConfig, HandlerConfig, KubernetesConfig, LogConfig, NomadConfig,
    ProviderConfig, TelegramConfig,
};
pub use crate::core::{ActionOutcome, Dispatcher, Supervisor};
pub use error::{ActionError, MetadataError, SetupError};
pub use event::{TerminationEvent, TerminationReason, UNKNOWN_FIELD};
pub use logging::init as init_logging;
pub use metadata::{MetadataAuth, MetadataClient, TokenAuth};
pub use providers::{
    select_provider, AlicloudProvider, AwsProvider, DummyProvider, GcpProvider, HuaweiProvider,
    MonitorHandle, Provider, ProviderName, ProviderRef, TencentProvider,
};
