//! Runtime core: orchestration and lifecycle.
//!
//! The only public API re-exported from here is [`Supervisor`] (and the
//! [`Dispatcher`]/[`ActionOutcome`] pair it drives). Everything else is an
//! internal building block the supervisor wires together.
//!
//! ## Files & responsibilities
//! - **supervisor.rs**: owns the root cancellation scope, the termination
//!   channel, and the monitoring + dispatcher tasks; selects the provider,
//!   builds the action list, drives bounded shutdown.
//! - **dispatch.rs**: consumes the one termination event, fans it out to
//!   every action under the shared processing deadline, aggregates
//!   outcomes.
//! - **shutdown.rs**: OS signal handling used by the supervisor.
//!
//! ## Control flow
//! ```text
//! Supervisor → Selector → Provider.start_monitoring
//!     → (later) one event on the termination channel
//!     → Dispatcher → fan-out to Actions → aggregate
//!     → supervisor exits
//! ```
//!
//! ## Shutdown timeline
//! ```text
//! OS signal OR dispatcher finished
//!   → cancel root token
//!   → drain monitoring + dispatcher tasks, at most 10s
//!   → warn on overrun, return regardless
//! ```

mod dispatch;
mod shutdown;
mod supervisor;

pub use dispatch::{ActionOutcome, Dispatcher};
pub use supervisor::Supervisor;
