//! Claim resolution.
//!
//! Locates each persistent volume claim and the node currently mounting it.
//! For `ReadWriteOnce` volumes the transfer pod must land on the same node as
//! any existing mounter or admission will reject it, so the resolver records
//! the owner node for direct `nodeName` pinning.

use std::fmt;

use k8s_openapi::api::core::v1::{PersistentVolumeClaim, Pod};
use kube::api::ListParams;
use kube::{Api, Client};
use tracing::debug;

use crate::error::{MigrateError, Result};

/// Namespace + name of a persistent volume claim.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClaimRef {
    pub namespace: String,
    pub name: String,
}

impl fmt::Display for ClaimRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.namespace, self.name)
    }
}

/// How the sshd endpoint is exposed to the rsync client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Exposure {
    /// Both sides share a cluster; a virtual cluster address suffices.
    ClusterIp,
    /// The client lives in another cluster; an externally routable
    /// load-balanced address is required.
    LoadBalancer,
}

impl Exposure {
    /// Pick the exposure mode from the two cluster context names.
    pub fn for_contexts(source: Option<&str>, dest: Option<&str>) -> Self {
        if source == dest {
            Exposure::ClusterIp
        } else {
            Exposure::LoadBalancer
        }
    }

    /// The Kubernetes service type implementing this exposure mode.
    pub fn service_type(&self) -> &'static str {
        match self {
            Exposure::ClusterIp => "ClusterIP",
            Exposure::LoadBalancer => "LoadBalancer",
        }
    }

    pub fn is_cross_cluster(&self) -> bool {
        matches!(self, Exposure::LoadBalancer)
    }
}

/// Everything the orchestrator needs to know about one side of the transfer.
///
/// Constructed once at startup from cluster queries; never mutated.
#[derive(Debug, Clone)]
pub struct ClaimInfo {
    /// The resolved claim.
    pub claim: ClaimRef,
    /// Node currently hosting a pod that mounts the claim, if any.
    pub owner_node: Option<String>,
    /// Mount the volume read-only.
    pub read_only: bool,
    /// Delete files at the destination that are absent at the source.
    pub delete_extraneous_files: bool,
    /// How the sshd endpoint is exposed.
    pub exposure: Exposure,
}

/// Resolve a claim into a [`ClaimInfo`], failing if it is missing or unbound.
pub async fn resolve(
    client: &Client,
    claim: &ClaimRef,
    read_only: bool,
    delete_extraneous_files: bool,
    exposure: Exposure,
) -> Result<ClaimInfo> {
    let claims: Api<PersistentVolumeClaim> = Api::namespaced(client.clone(), &claim.namespace);
    let pvc = claims.get(&claim.name).await.map_err(|err| match err {
        kube::Error::Api(ref response) if response.code == 404 => MigrateError::ClaimNotFound {
            namespace: claim.namespace.clone(),
            name: claim.name.clone(),
            source: err,
        },
        other => MigrateError::Api(other),
    })?;

    let phase = pvc.status.as_ref().and_then(|s| s.phase.clone()).unwrap_or_default();
    if phase != "Bound" {
        return Err(MigrateError::ClaimNotBound {
            namespace: claim.namespace.clone(),
            name: claim.name.clone(),
            phase,
        });
    }

    let pods: Api<Pod> = Api::namespaced(client.clone(), &claim.namespace);
    let pod_list = pods.list(&ListParams::default()).await?;
    let owner_node = find_owner_node(&pod_list.items, &claim.name);
    match &owner_node {
        Some(node) => debug!("claim {} is mounted on node {}", claim, node),
        None => debug!("claim {} is not mounted by any pod", claim),
    }

    Ok(ClaimInfo { claim: claim.clone(), owner_node, read_only, delete_extraneous_files, exposure })
}

/// Node of the first pod in list order whose declared volumes include the
/// claim. An unattached claim yields `None`; the transfer pods may then be
/// scheduled freely.
pub fn find_owner_node(pods: &[Pod], claim_name: &str) -> Option<String> {
    for pod in pods {
        let Some(spec) = pod.spec.as_ref() else { continue };
        let volumes = spec.volumes.as_deref().unwrap_or_default();
        let mounts_claim = volumes
            .iter()
            .any(|v| v.persistent_volume_claim.as_ref().is_some_and(|c| c.claim_name == claim_name));
        if mounts_claim {
            return spec.node_name.clone();
        }
    }
    None
}
