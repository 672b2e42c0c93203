use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Container, PodSpec},
};

pub fn deployment_pod_spec(deployment: &Deployment) -> Option<&PodSpec> {
    deployment.spec.as_ref()?.template.spec.as_ref()
}

pub fn deployment_pod_spec_mut(deployment: &mut Deployment) -> Option<&mut PodSpec> {
    deployment.spec.as_mut()?.template.spec.as_mut()
}

/// Containers of the deployment's pod template; empty when the template has
/// no pod spec.
pub fn deployment_containers(deployment: &Deployment) -> &[Container] {
    deployment_pod_spec(deployment)
        .map(|spec| spec.containers.as_slice())
        .unwrap_or_default()
}

pub fn deployment_name(deployment: &Deployment) -> &str {
    deployment.metadata.name.as_deref().unwrap_or("<unnamed>")
}
