//! Owner reference traversal: Pod -> ReplicaSet -> Deployment.
//!
//! Owner references are lookup keys only. When an object carries several
//! owners of the same kind the first one, in the order the API server
//! returned them, wins.

use k8s_openapi::{
    api::{apps::v1::ReplicaSet, core::v1::Pod},
    apimachinery::pkg::apis::meta::v1::ObjectMeta,
};
use log::debug;

use super::ClusterReader;
use crate::kube_types::OwnerKind;

pub fn owner_of_kind(meta: &ObjectMeta, kind: OwnerKind) -> Option<&str> {
    meta.owner_references
        .iter()
        .flatten()
        .find(|owner| OwnerKind::parse(&owner.kind) == kind)
        .map(|owner| owner.name.as_str())
}

pub fn pod_replica_set(pod: &Pod) -> Option<&str> {
    owner_of_kind(&pod.metadata, OwnerKind::ReplicaSet)
}

pub fn replica_set_deployment(replica_set: &ReplicaSet) -> Option<&str> {
    owner_of_kind(&replica_set.metadata, OwnerKind::Deployment)
}

/// Finds the name of the deployment owning a pod.
///
/// `Ok(None)` when the pod is not managed through a ReplicaSet, when the
/// ReplicaSet no longer exists, or when the ReplicaSet has no deployment
/// owner. The ReplicaSet is always fetched fresh.
pub async fn resolve_deployment<R: ClusterReader>(
    reader: &R,
    pod: &Pod,
) -> kube::Result<Option<String>> {
    let pod_name = pod.metadata.name.as_deref().unwrap_or("<unnamed>");

    let Some(rs_name) = pod_replica_set(pod) else {
        debug!("pod {} is not owned by a replicaset", pod_name);
        return Ok(None);
    };

    let Some(replica_set) = reader.get_replica_set(rs_name).await? else {
        debug!(
            "replicaset {} owning pod {} no longer exists",
            rs_name, pod_name
        );
        return Ok(None);
    };

    let deployment = replica_set_deployment(&replica_set).map(str::to_owned);
    if deployment.is_none() {
        debug!("replicaset {} is not owned by a deployment", rs_name);
    }
    Ok(deployment)
}
