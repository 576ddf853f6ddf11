//! # Kubernetes drain action.
//!
//! Cordon, then drain: the same sequence as
//! `kubectl drain --ignore-daemonsets`, compressed for an emergency where
//! the node disappears in about two minutes.
//!
//! ## Rules
//! - Cluster credentials are resolved at construction (in-cluster service
//!   account or an explicit kubeconfig path); a cluster that cannot be
//!   reached fails the agent at startup, not at event time.
//! - Drain skips pods that are already terminating, completed, managed by
//!   a DaemonSet (when configured), static/mirror pods, and pods with
//!   emptyDir volumes unless `delete_empty_dir_data` allows losing them.
//! - Evictions run in parallel under the action's deadline; each one waits
//!   briefly for the pod to actually go away, and a pod that is merely slow
//!   to terminate is not a failure.
//! - The drain fails only when more than half the evictions failed; a
//!   partial drain is better than none.

use std::time::Duration;

use async_trait::async_trait;
use k8s_openapi::api::core::v1::{Node, Pod};
use kube::{
    api::{Api, EvictParams, ListParams, Patch, PatchParams},
    Client, Config,
};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::actions::Action;
use crate::config::KubernetesConfig;
use crate::error::{ActionError, SetupError};
use crate::event::TerminationEvent;

/// How long to wait for an evicted pod to actually disappear.
const EVICTION_WAIT: Duration = Duration::from_secs(5);
/// Deletion poll cadence while waiting.
const EVICTION_POLL: Duration = Duration::from_millis(500);

/// Cordons and drains the local Kubernetes node.
pub struct KubernetesAction {
    client: Client,
    skip_daemon_sets: bool,
    delete_empty_dir_data: bool,
}

impl KubernetesAction {
    pub async fn new(cfg: &KubernetesConfig) -> Result<Self, SetupError> {
        let init_err = |reason: String| SetupError::ActionInit {
            name: "kubernetes",
            reason,
        };

        let config = if cfg.in_cluster {
            Config::incluster().map_err(|e| init_err(format!("in-cluster config: {e}")))?
        } else {
            let kubeconfig = kube::config::Kubeconfig::read_from(&cfg.kubeconfig)
                .map_err(|e| init_err(format!("kubeconfig '{}': {e}", cfg.kubeconfig)))?;
            Config::from_custom_kubeconfig(kubeconfig, &Default::default())
                .await
                .map_err(|e| init_err(format!("kubeconfig '{}': {e}", cfg.kubeconfig)))?
        };

        let client =
            Client::try_from(config).map_err(|e| init_err(format!("client build: {e}")))?;

        Ok(Self {
            client,
            skip_daemon_sets: cfg.skip_daemon_sets,
            delete_empty_dir_data: cfg.delete_empty_dir_data,
        })
    }

    /// Marks the node unschedulable.
    async fn cordon(&self, node_name: &str) -> Result<(), ActionError> {
        let nodes: Api<Node> = Api::all(self.client.clone());

        nodes.get(node_name).await.map_err(|e| ActionError::Fail {
            reason: format!("failed to get node '{node_name}': {e}"),
        })?;

        let patch = serde_json::json!({"spec": {"unschedulable": true}});
        nodes
            .patch(node_name, &PatchParams::default(), &Patch::Merge(&patch))
            .await
            .map_err(|e| ActionError::Fail {
                reason: format!("failed to cordon node '{node_name}': {e}"),
            })?;

        info!(node = %node_name, "node cordoned");
        Ok(())
    }

    /// Evicts every drainable pod on the node in parallel.
    async fn drain(&self, ctx: &CancellationToken, node_name: &str) -> Result<(), ActionError> {
        let pods: Api<Pod> = Api::all(self.client.clone());
        let on_node = ListParams::default().fields(&format!("spec.nodeName={node_name}"));
        let listed = pods.list(&on_node).await.map_err(|e| ActionError::Fail {
            reason: format!("failed to list pods on '{node_name}': {e}"),
        })?;

        let mut to_evict = Vec::new();
        let mut skipped = 0usize;
        for pod in listed {
            match self.drain_verdict(&pod) {
                DrainVerdict::Evict => to_evict.push(pod),
                DrainVerdict::Skip(why) => {
                    skipped += 1;
                    debug!(
                        pod = %pod.metadata.name.as_deref().unwrap_or_default(),
                        namespace = %pod.metadata.namespace.as_deref().unwrap_or_default(),
                        why,
                        "pod skipped during drain"
                    );
                }
            }
        }

        info!(
            node = %node_name,
            to_evict = to_evict.len(),
            skipped,
            "starting parallel pod eviction"
        );

        if to_evict.is_empty() {
            return Ok(());
        }

        let total = to_evict.len();
        let mut set = JoinSet::new();
        for pod in to_evict {
            let client = self.client.clone();
            let ctx = ctx.clone();
            set.spawn(async move { evict_pod(client, ctx, pod).await });
        }

        let mut failures = 0usize;
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok(Ok(())) => {}
                Ok(Err(reason)) => {
                    warn!(error = %reason, "pod eviction failed");
                    failures += 1;
                }
                Err(_join_err) => failures += 1,
            }
        }

        info!(
            node = %node_name,
            total,
            failed = failures,
            "parallel pod eviction completed"
        );

        if failures * 2 > total {
            return Err(ActionError::Fail {
                reason: format!("failed to evict the majority of pods ({failures}/{total})"),
            });
        }
        Ok(())
    }

    fn drain_verdict(&self, pod: &Pod) -> DrainVerdict {
        if pod.metadata.deletion_timestamp.is_some() {
            return DrainVerdict::Skip("terminating");
        }

        if let Some(phase) = pod.status.as_ref().and_then(|s| s.phase.as_deref()) {
            if phase == "Succeeded" || phase == "Failed" {
                return DrainVerdict::Skip("completed");
            }
        }

        let owners = pod.metadata.owner_references.as_deref().unwrap_or_default();
        if self.skip_daemon_sets && owners.iter().any(|o| o.kind == "DaemonSet") {
            return DrainVerdict::Skip("daemonset");
        }

        // static pods are kubelet-managed; eviction cannot remove them
        let is_static = owners.iter().any(|o| o.kind == "Node")
            || pod
                .metadata
                .annotations
                .as_ref()
                .is_some_and(|a| a.contains_key("kubernetes.io/config.source"));
        if is_static {
            return DrainVerdict::Skip("static");
        }

        if !self.delete_empty_dir_data {
            let uses_empty_dir = pod
                .spec
                .as_ref()
                .and_then(|s| s.volumes.as_ref())
                .is_some_and(|vols| vols.iter().any(|v| v.empty_dir.is_some()));
            if uses_empty_dir {
                return DrainVerdict::Skip("emptydir");
            }
        }

        DrainVerdict::Evict
    }
}

enum DrainVerdict {
    Evict,
    Skip(&'static str),
}

/// Evicts one pod and waits briefly for it to disappear.
async fn evict_pod(client: Client, ctx: CancellationToken, pod: Pod) -> Result<(), String> {
    let name = pod.metadata.name.clone().unwrap_or_default();
    let namespace = pod.metadata.namespace.clone().unwrap_or_default();
    let api: Api<Pod> = Api::namespaced(client, &namespace);

    debug!(pod = %name, namespace = %namespace, "evicting pod");
    api.evict(&name, &EvictParams::default())
        .await
        .map_err(|e| format!("{namespace}/{name}: eviction failed: {e}"))?;

    // absence is success; a pod still terminating after the wait is not a
    // failure either, the drain moves on
    let deadline = tokio::time::Instant::now() + EVICTION_WAIT;
    loop {
        if ctx.is_cancelled() {
            return Err(format!("{namespace}/{name}: canceled while awaiting deletion"));
        }
        if tokio::time::Instant::now() >= deadline {
            warn!(pod = %name, namespace = %namespace, "timeout waiting for pod deletion");
            return Ok(());
        }
        match api.get_opt(&name).await {
            Ok(None) => {
                debug!(pod = %name, namespace = %namespace, "pod evicted and deleted");
                return Ok(());
            }
            Ok(Some(_)) => tokio::time::sleep(EVICTION_POLL).await,
            Err(e) => return Err(format!("{namespace}/{name}: deletion check failed: {e}")),
        }
    }
}

#[async_trait]
impl Action for KubernetesAction {
    fn name(&self) -> &'static str {
        "kubernetes"
    }

    async fn handle(
        &self,
        ctx: CancellationToken,
        event: &TerminationEvent,
    ) -> Result<(), ActionError> {
        info!(node = %event.hostname, "handling kubernetes node termination");

        tokio::select! {
            _ = ctx.cancelled() => return Err(ActionError::Canceled),
            cordoned = self.cordon(&event.hostname) => cordoned?,
        }

        tokio::select! {
            _ = ctx.cancelled() => return Err(ActionError::Canceled),
            drained = self.drain(&ctx, &event.hostname) => drained?,
        }

        info!(node = %event.hostname, "kubernetes node termination handled");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{EmptyDirVolumeSource, PodSpec, PodStatus, Volume};
    use k8s_openapi::apimachinery::pkg::apis::meta::v1::OwnerReference;

    use super::*;

    fn bare_pod(name: &str) -> Pod {
        let mut pod = Pod::default();
        pod.metadata.name = Some(name.to_string());
        pod.metadata.namespace = Some("default".to_string());
        pod
    }

    fn action_with(skip_daemon_sets: bool, delete_empty_dir_data: bool) -> KubernetesAction {
        // Client is never touched by drain_verdict; an inert one is enough.
        // Building it spawns a background task, so it needs a runtime context.
        let rt = tokio::runtime::Runtime::new().unwrap();
        let _guard = rt.enter();
        let config = Config::new("http://127.0.0.1:8080".parse().unwrap());
        KubernetesAction {
            client: Client::try_from(config).unwrap(),
            skip_daemon_sets,
            delete_empty_dir_data,
        }
    }

    fn owner(kind: &str) -> OwnerReference {
        OwnerReference {
            kind: kind.to_string(),
            ..OwnerReference::default()
        }
    }

    #[test]
    fn plain_pods_are_evicted() {
        let action = action_with(true, false);
        assert!(matches!(
            action.drain_verdict(&bare_pod("web")),
            DrainVerdict::Evict
        ));
    }

    #[test]
    fn daemonset_pods_are_skipped_when_configured() {
        let mut pod = bare_pod("ds-agent");
        pod.metadata.owner_references = Some(vec![owner("DaemonSet")]);

        assert!(matches!(
            action_with(true, false).drain_verdict(&pod),
            DrainVerdict::Skip("daemonset")
        ));
        assert!(matches!(
            action_with(false, false).drain_verdict(&pod),
            DrainVerdict::Evict
        ));
    }

    #[test]
    fn completed_and_terminating_pods_are_skipped() {
        let action = action_with(true, false);

        let mut done = bare_pod("job");
        done.status = Some(PodStatus {
            phase: Some("Succeeded".to_string()),
            ..PodStatus::default()
        });
        assert!(matches!(
            action.drain_verdict(&done),
            DrainVerdict::Skip("completed")
        ));

        let mut going = bare_pod("old");
        going.metadata.deletion_timestamp =
            Some(k8s_openapi::apimachinery::pkg::apis::meta::v1::Time(
                k8s_openapi::chrono::Utc::now(),
            ));
        assert!(matches!(
            action.drain_verdict(&going),
            DrainVerdict::Skip("terminating")
        ));
    }

    #[test]
    fn empty_dir_pods_need_explicit_permission() {
        let mut pod = bare_pod("cache");
        pod.spec = Some(PodSpec {
            volumes: Some(vec![Volume {
                name: "scratch".to_string(),
                empty_dir: Some(EmptyDirVolumeSource::default()),
                ..Volume::default()
            }]),
            ..PodSpec::default()
        });

        assert!(matches!(
            action_with(true, false).drain_verdict(&pod),
            DrainVerdict::Skip("emptydir")
        ));
        assert!(matches!(
            action_with(true, true).drain_verdict(&pod),
            DrainVerdict::Evict
        ));
    }

    #[test]
    fn static_pods_are_skipped() {
        let mut pod = bare_pod("etcd-node1");
        pod.metadata.owner_references = Some(vec![owner("Node")]);
        assert!(matches!(
            action_with(true, false).drain_verdict(&pod),
            DrainVerdict::Skip("static")
        ));
    }
}
