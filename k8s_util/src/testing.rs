//! In-memory cluster for exercising code written against [`ClusterReader`]
//! and [`ClusterWriter`] without an API server.

use std::{collections::BTreeMap, sync::Mutex};

use k8s_openapi::{
    api::{
        apps::v1::{Deployment, DeploymentSpec, ReplicaSet},
        core::v1::{Container, ContainerPort, EnvVar, Pod, PodSpec, PodTemplateSpec},
    },
    apimachinery::pkg::apis::meta::v1::{LabelSelector, ObjectMeta, OwnerReference},
};

use crate::apis::{ClusterReader, ClusterWriter};

pub fn api_error(code: u16) -> kube::Error {
    kube::Error::Api(kube::error::ErrorResponse {
        status: "Failure".into(),
        message: format!("request failed with status {}", code),
        reason: match code {
            401 => "Unauthorized",
            403 => "Forbidden",
            404 => "NotFound",
            409 => "Conflict",
            422 => "Invalid",
            _ => "InternalError",
        }
        .into(),
        code,
    })
}

pub fn transport_error() -> kube::Error {
    kube::Error::ReadEvents(std::io::Error::other("connection reset by peer"))
}

fn owner_references(owners: &[(&str, &str)]) -> Option<Vec<OwnerReference>> {
    if owners.is_empty() {
        return None;
    }
    Some(
        owners
            .iter()
            .map(|(kind, name)| OwnerReference {
                api_version: "apps/v1".into(),
                kind: (*kind).into(),
                name: (*name).into(),
                uid: format!("uid-{}", name),
                controller: Some(true),
                ..Default::default()
            })
            .collect(),
    )
}

fn meta(name: &str, owners: &[(&str, &str)]) -> ObjectMeta {
    ObjectMeta {
        name: Some(name.into()),
        namespace: Some("default".into()),
        owner_references: owner_references(owners),
        ..Default::default()
    }
}

/// Pod with owner references given as `(kind, name)` pairs.
pub fn pod(name: &str, owners: &[(&str, &str)]) -> Pod {
    Pod {
        metadata: meta(name, owners),
        ..Default::default()
    }
}

pub fn replica_set(name: &str, owners: &[(&str, &str)]) -> ReplicaSet {
    ReplicaSet {
        metadata: meta(name, owners),
        ..Default::default()
    }
}

pub fn container(name: &str, env: &[(&str, &str)], ports: &[i32]) -> Container {
    Container {
        name: name.into(),
        env: (!env.is_empty()).then(|| {
            env.iter()
                .map(|(name, value)| EnvVar {
                    name: (*name).into(),
                    value: Some((*value).into()),
                    ..Default::default()
                })
                .collect()
        }),
        ports: (!ports.is_empty()).then(|| {
            ports
                .iter()
                .map(|port| ContainerPort {
                    container_port: *port,
                    protocol: Some("TCP".into()),
                    ..Default::default()
                })
                .collect()
        }),
        ..Default::default()
    }
}

pub fn deployment(name: &str, containers: Vec<Container>) -> Deployment {
    let mut metadata = meta(name, &[]);
    metadata.resource_version = Some("1".into());
    Deployment {
        metadata,
        spec: Some(DeploymentSpec {
            selector: LabelSelector::default(),
            template: PodTemplateSpec {
                metadata: None,
                spec: Some(PodSpec {
                    containers,
                    ..Default::default()
                }),
            },
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[derive(Default)]
pub struct FakeCluster {
    namespace: String,
    pods: Vec<Pod>,
    replica_sets: BTreeMap<String, ReplicaSet>,
    deployments: BTreeMap<String, Deployment>,
    list_failure: Option<u16>,
    replica_set_failures: BTreeMap<String, kube::Error>,
    deployment_failures: BTreeMap<String, kube::Error>,
    replace_failures: BTreeMap<String, u16>,
    fetched_deployments: Mutex<Vec<String>>,
    replaced: Mutex<Vec<Deployment>>,
}

impl FakeCluster {
    pub fn new(namespace: &str) -> Self {
        FakeCluster {
            namespace: namespace.to_owned(),
            ..Default::default()
        }
    }

    pub fn with_pods(mut self, pods: impl IntoIterator<Item = Pod>) -> Self {
        self.pods.extend(pods);
        self
    }

    pub fn with_replica_set(mut self, rs: ReplicaSet) -> Self {
        let name = rs.metadata.name.clone().unwrap_or_default();
        self.replica_sets.insert(name, rs);
        self
    }

    pub fn with_deployment(mut self, deployment: Deployment) -> Self {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        self.deployments.insert(name, deployment);
        self
    }

    /// Listing pods fails with the given API status code.
    pub fn failing_list(mut self, code: u16) -> Self {
        self.list_failure = Some(code);
        self
    }

    pub fn failing_replica_set(mut self, name: &str, err: kube::Error) -> Self {
        self.replica_set_failures.insert(name.to_owned(), err);
        self
    }

    pub fn failing_deployment(mut self, name: &str, err: kube::Error) -> Self {
        self.deployment_failures.insert(name.to_owned(), err);
        self
    }

    /// Replacing the named deployment fails with the given API status code.
    pub fn failing_replace(mut self, name: &str, code: u16) -> Self {
        self.replace_failures.insert(name.to_owned(), code);
        self
    }

    /// Names passed to `get_deployment`, in call order.
    pub fn fetched_deployments(&self) -> Vec<String> {
        self.fetched_deployments.lock().unwrap().clone()
    }

    /// Deployments successfully written, in write order.
    pub fn replaced(&self) -> Vec<Deployment> {
        self.replaced.lock().unwrap().clone()
    }
}

fn clone_error(err: &kube::Error) -> kube::Error {
    match err {
        kube::Error::Api(response) => kube::Error::Api(response.clone()),
        other => kube::Error::ReadEvents(std::io::Error::other(other.to_string())),
    }
}

impl ClusterReader for FakeCluster {
    fn namespace(&self) -> &str {
        &self.namespace
    }

    async fn list_pods(&self) -> kube::Result<Vec<Pod>> {
        match self.list_failure {
            Some(code) => Err(api_error(code)),
            None => Ok(self.pods.clone()),
        }
    }

    async fn get_replica_set(&self, name: &str) -> kube::Result<Option<ReplicaSet>> {
        if let Some(err) = self.replica_set_failures.get(name) {
            return Err(clone_error(err));
        }
        Ok(self.replica_sets.get(name).cloned())
    }

    async fn get_deployment(&self, name: &str) -> kube::Result<Option<Deployment>> {
        self.fetched_deployments
            .lock()
            .unwrap()
            .push(name.to_owned());
        if let Some(err) = self.deployment_failures.get(name) {
            return Err(clone_error(err));
        }
        Ok(self.deployments.get(name).cloned())
    }
}

impl ClusterWriter for FakeCluster {
    async fn replace_deployment(&self, deployment: &Deployment) -> kube::Result<Deployment> {
        let name = deployment.metadata.name.clone().unwrap_or_default();
        if let Some(code) = self.replace_failures.get(&name) {
            return Err(api_error(*code));
        }
        if !self.deployments.contains_key(&name) {
            return Err(api_error(404));
        }

        let mut stored = deployment.clone();
        let generation = stored.metadata.generation.unwrap_or(1);
        stored.metadata.generation = Some(generation + 1);
        self.replaced.lock().unwrap().push(deployment.clone());
        Ok(stored)
    }
}
