//! # Log-echo action.
//!
//! Writes the full event to the log stream and nothing else. Paired with
//! the dummy provider so integration runs are self-evident; harmless to
//! keep alongside real actions.

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::actions::Action;
use crate::error::ActionError;
use crate::event::TerminationEvent;

/// Echoes the termination event at info level. Never fails.
pub struct LogAction;

#[async_trait]
impl Action for LogAction {
    fn name(&self) -> &'static str {
        "log"
    }

    async fn handle(
        &self,
        _ctx: CancellationToken,
        event: &TerminationEvent,
    ) -> Result<(), ActionError> {
        info!(
            hostname = %event.hostname,
            private_ip = %event.private_ip,
            instance_id = %event.instance_id,
            reason = %event.reason,
            "log action fired"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::TerminationReason;

    #[tokio::test]
    async fn never_fails() {
        let event = TerminationEvent {
            hostname: "dummy".into(),
            private_ip: "172.16.1.1".into(),
            instance_id: "dummy-instance-id".into(),
            reason: TerminationReason::Spot,
        };
        LogAction
            .handle(CancellationToken::new(), &event)
            .await
            .unwrap();
    }
}
