//! # Nomad drain action.
//!
//! Resolves the Nomad node whose `Name` matches the event hostname, then
//! turns on drain for it, which cordons the node and migrates its
//! allocations. Speaks the HTTP API directly; agent address and ACL token
//! come from the standard `NOMAD_ADDR` / `NOMAD_TOKEN` variables, resolved
//! at construction.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::actions::Action;
use crate::config::NomadConfig;
use crate::error::{ActionError, SetupError};
use crate::event::TerminationEvent;

/// Default local agent address, same as the official client.
const DEFAULT_NOMAD_ADDR: &str = "http://127.0.0.1:4646";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Node list stub, only the fields the drain call needs.
#[derive(Debug, Deserialize)]
struct NodeStub {
    #[serde(rename = "ID")]
    id: String,
    #[serde(rename = "Name")]
    name: String,
}

#[derive(Debug, Serialize)]
struct DrainRequest {
    #[serde(rename = "DrainSpec")]
    drain_spec: DrainSpec,
    #[serde(rename = "MarkEligible")]
    mark_eligible: bool,
}

#[derive(Debug, Serialize)]
struct DrainSpec {
    #[serde(rename = "IgnoreSystemJobs")]
    ignore_system_jobs: bool,
}

/// Drains the local Nomad node.
pub struct NomadAction {
    http: reqwest::Client,
    address: String,
    token: Option<String>,
    force: bool,
}

impl NomadAction {
    pub fn new(cfg: &NomadConfig) -> Result<Self, SetupError> {
        let address = std::env::var("NOMAD_ADDR")
            .ok()
            .filter(|addr| !addr.is_empty())
            .unwrap_or_else(|| DEFAULT_NOMAD_ADDR.to_string());
        let token = std::env::var("NOMAD_TOKEN").ok().filter(|t| !t.is_empty());
        Self::with_address(cfg, address, token)
    }

    /// Explicit address/token; lets tests point the action at a stub agent.
    pub fn with_address(
        cfg: &NomadConfig,
        address: impl Into<String>,
        token: Option<String>,
    ) -> Result<Self, SetupError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| SetupError::ActionInit {
                name: "nomad",
                reason: e.to_string(),
            })?;

        Ok(Self {
            http,
            address: address.into().trim_end_matches('/').to_string(),
            token,
            force: cfg.force,
        })
    }

    fn request(&self, req: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => req.header("X-Nomad-Token", token),
            None => req,
        }
    }

    async fn find_node_id(&self, hostname: &str) -> Result<String, ActionError> {
        let url = format!("{}/v1/nodes", self.address);
        let filter = format!(r#"Name == "{hostname}""#);
        let response = self
            .request(self.http.get(&url).query(&[("filter", filter.as_str())]))
            .send()
            .await
            .map_err(|e| ActionError::Fail {
                reason: format!("failed to list nomad nodes: {e}"),
            })?;

        let nodes: Vec<NodeStub> = response.json().await.map_err(|e| ActionError::Fail {
            reason: format!("unparseable nomad node list: {e}"),
        })?;

        nodes
            .into_iter()
            .find(|node| node.name == hostname)
            .map(|node| node.id)
            .ok_or_else(|| ActionError::Fail {
                reason: format!("no nomad node named '{hostname}'"),
            })
    }
}

#[async_trait]
impl Action for NomadAction {
    fn name(&self) -> &'static str {
        "nomad"
    }

    async fn handle(
        &self,
        ctx: CancellationToken,
        event: &TerminationEvent,
    ) -> Result<(), ActionError> {
        info!(node = %event.hostname, "handling nomad node termination");

        let node_id = tokio::select! {
            _ = ctx.cancelled() => return Err(ActionError::Canceled),
            found = self.find_node_id(&event.hostname) => found?,
        };

        debug!(node_id = %node_id, "nomad node found, enabling drain");

        let url = format!("{}/v1/node/{node_id}/drain", self.address);
        let body = DrainRequest {
            drain_spec: DrainSpec {
                ignore_system_jobs: self.force,
            },
            mark_eligible: false,
        };

        let request = self.request(self.http.post(&url).json(&body)).send();
        let response = tokio::select! {
            _ = ctx.cancelled() => return Err(ActionError::Canceled),
            res = request => res.map_err(|e| ActionError::Fail {
                reason: format!("failed to drain nomad node: {e}"),
            })?,
        };

        if !response.status().is_success() {
            return Err(ActionError::Fail {
                reason: format!(
                    "nomad drain request answered {} for node {node_id}",
                    response.status()
                ),
            });
        }

        info!(node_id = %node_id, node = %event.hostname, "nomad node drain enabled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn address_is_normalised() {
        let cfg = NomadConfig {
            enabled: true,
            force: false,
        };
        let action =
            NomadAction::with_address(&cfg, "http://10.0.0.1:4646/", None).unwrap();
        assert_eq!(action.address, "http://10.0.0.1:4646");
    }

    #[test]
    fn drain_body_carries_force_flag() {
        let body = DrainRequest {
            drain_spec: DrainSpec {
                ignore_system_jobs: true,
            },
            mark_eligible: false,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["DrainSpec"]["IgnoreSystemJobs"], true);
        assert_eq!(json["MarkEligible"], false);
    }
}
