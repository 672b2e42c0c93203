use std::path::Path;

use anyhow::{bail, Context};
use kube::{
    config::{KubeConfigOptions, Kubeconfig},
    Client, Config,
};

/// Builds a client from the ambient configuration (in-cluster or the default
/// kubeconfig), or from an explicit kubeconfig/context pair when either is
/// given.
pub async fn create_client(
    kubeconfig_path: Option<&Path>,
    context: Option<&str>,
) -> anyhow::Result<Client> {
    if kubeconfig_path.is_none() && context.is_none() {
        let config = Config::infer()
            .await
            .context("when inferring kubernetes config")?;
        return Client::try_from(config).context("when building kubernetes client");
    }

    let kubeconfig = match kubeconfig_path {
        Some(path) => Kubeconfig::read_from(path)
            .with_context(|| format!("when reading kubeconfig at {}", path.display()))?,
        None => Kubeconfig::read().context("when reading default kubeconfig")?,
    };

    if let Some(ctx) = context {
        let contexts = context_names(&kubeconfig);
        if !contexts.iter().any(|name| name == ctx) {
            bail!("unknown k8s context `{}`, please choose one of: {:?}", ctx, contexts);
        }
    }

    let options = KubeConfigOptions {
        context: context.map(str::to_owned),
        ..Default::default()
    };
    let config = Config::from_custom_kubeconfig(kubeconfig, &options)
        .await
        .context("when loading kubeconfig")?;
    Client::try_from(config).context("when building kubernetes client")
}

pub fn context_names(kubeconfig: &Kubeconfig) -> Vec<String> {
    kubeconfig
        .contexts
        .iter()
        .map(|ctx| ctx.name.clone())
        .collect()
}
