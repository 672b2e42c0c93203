use std::path::PathBuf;

use clap::Parser;
use clap_verbosity_flag::Verbosity;
use commands::{
    pod_watch::PodWatchArgs, port_forward::PortForwardArgs, remote_debug::RemoteDebugArgs,
};
use config::ToolConfig;
use k8s_util::apis::Apis;

mod commands;
mod config;
mod debug;

#[derive(Parser, Debug)]
#[command(name = "kube-play", author, version, about = "Kubernetes helper CLI", long_about = None)]
struct Args {
    #[command(flatten)]
    verbose: Verbosity,
    /// Kubeconfig context to use instead of the current one
    #[arg(short, long)]
    context: Option<String>,
    /// Namespace to operate in, defaults to the context's namespace
    #[arg(short, long)]
    namespace: Option<String>,
    #[arg(long)]
    kubeconfig: Option<PathBuf>,
    /// Tool config file, defaults to `<config dir>/kube-play/config.toml`
    #[arg(long)]
    config: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Enables/disables java remote debug session for the matching pods
    RemoteDebug(RemoteDebugArgs),
    /// Print namespace
    Namespace,
    /// Watches a set of identified pods
    PodWatch(PodWatchArgs),
    /// Forwards consecutive local ports to each of the matching pods
    PortForward(PortForwardArgs),
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    env_logger::Builder::new()
        .filter_level(args.verbose.log_level_filter())
        .init();

    let client =
        k8s_util::create_client(args.kubeconfig.as_deref(), args.context.as_deref()).await?;
    let namespace = args
        .namespace
        .unwrap_or_else(|| client.default_namespace().to_owned());
    log::debug!("using namespace {}", namespace);
    let apis = Apis::namespaced(&client, &namespace);

    match args.command {
        Commands::RemoteDebug(cmd_args) => {
            let config = ToolConfig::load(args.config.as_deref())?;
            commands::remote_debug::remote_debug(&apis, &config, cmd_args).await
        }
        Commands::Namespace => {
            commands::namespace::namespace(&apis);
            Ok(())
        }
        Commands::PodWatch(cmd_args) => commands::pod_watch::pod_watch(&apis, cmd_args).await,
        Commands::PortForward(cmd_args) => {
            commands::port_forward::port_forward(&apis, cmd_args).await
        }
    }
}
