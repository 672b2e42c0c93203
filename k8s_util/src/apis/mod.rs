use anyhow::Context;
use k8s_openapi::api::{
    apps::v1::{Deployment, ReplicaSet},
    core::v1::Pod,
};
use kube::{
    api::{ListParams, PostParams},
    Api, Client,
};
use log::debug;

use crate::kube_types::PodNameFilter;

pub mod owner;

/// Read side of the cluster as seen by the tools. Lookups of a single object
/// return `Ok(None)` when the object does not exist.
#[allow(async_fn_in_trait)]
pub trait ClusterReader {
    fn namespace(&self) -> &str;

    async fn list_pods(&self) -> kube::Result<Vec<Pod>>;

    async fn get_replica_set(&self, name: &str) -> kube::Result<Option<ReplicaSet>>;

    async fn get_deployment(&self, name: &str) -> kube::Result<Option<Deployment>>;
}

#[allow(async_fn_in_trait)]
pub trait ClusterWriter {
    /// Replaces the live deployment with the given object, identified by its
    /// metadata name.
    async fn replace_deployment(&self, deployment: &Deployment) -> kube::Result<Deployment>;
}

/// Whether an error should abort the whole invocation rather than just the
/// item being processed. Transport failures and authn/authz rejections mean
/// no further call can succeed either.
pub fn is_fatal(err: &kube::Error) -> bool {
    match err {
        kube::Error::Api(response) => matches!(response.code, 401 | 403),
        _ => true,
    }
}

/// Lists pods in the reader's namespace whose name matches the filter, in
/// the order the cluster returned them.
pub async fn select_pods<R: ClusterReader>(
    reader: &R,
    filter: &PodNameFilter,
) -> anyhow::Result<Vec<Pod>> {
    let pods = reader
        .list_pods()
        .await
        .with_context(|| format!("when listing pods in namespace {}", reader.namespace()))?;
    let total = pods.len();

    let selected: Vec<Pod> = pods.into_iter().filter(|pod| filter.matches(pod)).collect();
    debug!(
        "{} of {} pods match \"{}\"",
        selected.len(),
        total,
        filter.pattern()
    );

    Ok(selected)
}

pub struct Apis {
    pub namespace: String,
    pub deployment: Api<Deployment>,
    pub replica_set: Api<ReplicaSet>,
    pub pod: Api<Pod>,
}

impl Apis {
    pub fn namespaced(client: &Client, namespace: &str) -> Self {
        Apis {
            namespace: namespace.to_string(),
            deployment: Api::namespaced(client.clone(), namespace),
            replica_set: Api::namespaced(client.clone(), namespace),
            pod: Api::namespaced(client.clone(), namespace),
        }
    }
}

impl ClusterReader for Apis {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list_pods(&self) -> kube::Result<Vec<Pod>> {
        let pods = self.pod.list(&ListParams::default()).await?;
        Ok(pods.items)
    }

    async fn get_replica_set(&self, name: &str) -> kube::Result<Option<ReplicaSet>> {
        self.replica_set.get_opt(name).await
    }

    async fn get_deployment(&self, name: &str) -> kube::Result<Option<Deployment>> {
        self.deployment.get_opt(name).await
    }
}

impl ClusterWriter for Apis {
    async fn replace_deployment(&self, deployment: &Deployment) -> kube::Result<Deployment> {
        let name = deployment.metadata.name.as_deref().unwrap_or_default();
        self.deployment
            .replace(name, &PostParams::default(), deployment)
            .await
    }
}
