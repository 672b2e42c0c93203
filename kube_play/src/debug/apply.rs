use k8s_openapi::api::apps::v1::Deployment;
use k8s_util::{apis::ClusterWriter, pod_template::deployment_name};
use log::info;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied {
    pub name: String,
    pub generation: Option<i64>,
}

#[derive(Debug, thiserror::Error)]
pub enum ApplyError {
    #[error("deployment {0} no longer exists")]
    NotFound(String),
    #[error("deployment {0} was modified concurrently")]
    Conflict(String),
    #[error("not allowed to update deployment {name}: {message}")]
    Forbidden { name: String, message: String },
    #[error("update of deployment {name} rejected ({code}): {message}")]
    Rejected {
        name: String,
        code: u16,
        message: String,
    },
    #[error("could not reach cluster while updating deployment {name}")]
    Transport {
        name: String,
        #[source]
        source: kube::Error,
    },
}

impl ApplyError {
    fn from_kube(name: &str, err: kube::Error) -> Self {
        let name = name.to_owned();
        match err {
            kube::Error::Api(response) => match response.code {
                404 => ApplyError::NotFound(name),
                409 => ApplyError::Conflict(name),
                401 | 403 => ApplyError::Forbidden {
                    name,
                    message: response.message,
                },
                code => ApplyError::Rejected {
                    name,
                    code,
                    message: response.message,
                },
            },
            source => ApplyError::Transport { name, source },
        }
    }
}

/// Writes the modified deployment back as a full replacement of the live
/// object. The resource version read earlier is dropped, so the write is
/// unconditional and the last writer wins.
pub async fn apply<W: ClusterWriter>(
    writer: &W,
    deployment: &Deployment,
) -> Result<Applied, ApplyError> {
    let name = deployment_name(deployment);

    let mut replacement = deployment.clone();
    replacement.metadata.resource_version = None;

    let stored = writer
        .replace_deployment(&replacement)
        .await
        .map_err(|err| ApplyError::from_kube(name, err))?;

    info!(
        "replaced deployment {} (generation {:?})",
        name, stored.metadata.generation
    );
    Ok(Applied {
        name: name.to_owned(),
        generation: stored.metadata.generation,
    })
}
