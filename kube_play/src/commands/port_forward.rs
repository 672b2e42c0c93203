use std::{net::SocketAddr, time::Duration};

use anyhow::{bail, Context};
use colored::Colorize;
use k8s_openapi::api::core::v1::Pod;
use k8s_util::{
    apis::{select_pods, Apis},
    kube_types::{PodName, PodNameFilter},
};
use kube::Api;
use tokio::{
    net::{TcpListener, TcpStream},
    task::{JoinHandle, JoinSet},
};

#[derive(clap::Args, Debug)]
pub struct PortForwardArgs {
    /// Regex the whole pod name has to match
    #[arg(default_value = PodNameFilter::MATCH_ALL)]
    pub regex: String,
    /// Local port number to start from, incremented for each further pod
    #[arg(short, long, default_value = "8001")]
    pub port: u16,
    /// Remote port number
    #[arg(short, long, default_value = "8000")]
    pub remote_port: u16,
}

pub struct Forward {
    pub pod: PodName,
    pub local_addr: SocketAddr,
    handle: JoinHandle<()>,
}

/// Every forwarder started by one command invocation. Dropping the set tears
/// all of them down, including connections they are currently tunnelling.
#[derive(Default)]
pub struct ForwardSet {
    forwards: Vec<Forward>,
}

impl ForwardSet {
    pub fn push(&mut self, forward: Forward) {
        self.forwards.push(forward);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Forward> {
        self.forwards.iter()
    }

    pub fn len(&self) -> usize {
        self.forwards.len()
    }
}

impl Drop for ForwardSet {
    fn drop(&mut self) {
        for forward in &self.forwards {
            forward.handle.abort();
        }
        log::debug!("stopped {} port forward(s)", self.forwards.len());
    }
}

/// Local port for the `idx`-th matching pod.
pub fn local_port(base: u16, idx: usize) -> anyhow::Result<u16> {
    u16::try_from(idx)
        .ok()
        .and_then(|idx| base.checked_add(idx))
        .with_context(|| format!("no local port left for pod #{} starting from {}", idx, base))
}

async fn forward_conn(
    pods: &Api<Pod>,
    pod: &PodName,
    remote_port: u16,
    stream: TcpStream,
) -> anyhow::Result<()> {
    let mut port_forwarder = pods
        .portforward(&pod.0, &[remote_port])
        .await
        .context("when forwarding port")?;

    let upstream = port_forwarder
        .take_stream(remote_port)
        .context("could not get port of target")?;

    k8s_util::transfer(stream, upstream).await
}

const ACCEPT_BACKOFF_MIN: Duration = Duration::from_millis(100);
const ACCEPT_BACKOFF_MAX: Duration = Duration::from_secs(5);

/// Wait before accepting again after `failures` consecutive accept errors.
fn accept_backoff(failures: u32) -> Duration {
    ACCEPT_BACKOFF_MIN
        .saturating_mul(2u32.saturating_pow(failures.saturating_sub(1)))
        .min(ACCEPT_BACKOFF_MAX)
}

async fn accept_loop(listener: TcpListener, pods: Api<Pod>, pod: PodName, remote_port: u16) {
    // Owned here so aborting this task also aborts live connections.
    let mut connections = JoinSet::new();
    let mut failures: u32 = 0;
    loop {
        let (stream, peer) = match listener.accept().await {
            Ok(accepted) => {
                failures = 0;
                accepted
            }
            Err(error) => {
                failures = failures.saturating_add(1);
                let backoff = accept_backoff(failures);
                log::warn!(
                    "failed to accept connection for {}, retrying in {:?}: {:?}",
                    pod,
                    backoff,
                    error
                );
                tokio::time::sleep(backoff).await;
                continue;
            }
        };
        log::info!("forwarding {} to {}:{}", peer, pod, remote_port);

        let pods = pods.clone();
        let pod = pod.clone();
        connections.spawn(async move {
            if let Err(error) = forward_conn(&pods, &pod, remote_port, stream).await {
                log::warn!("terminated port forward connection to {}: {:?}", pod, error);
            }
        });
        while connections.try_join_next().is_some() {}
    }
}

async fn start_forward(
    pods: &Api<Pod>,
    pod: PodName,
    local_port: u16,
    remote_port: u16,
) -> anyhow::Result<Forward> {
    let listener = TcpListener::bind(("127.0.0.1", local_port))
        .await
        .with_context(|| format!("when binding local port {}", local_port))?;
    let local_addr = listener.local_addr()?;

    let handle = tokio::spawn(accept_loop(listener, pods.clone(), pod.clone(), remote_port));

    Ok(Forward {
        pod,
        local_addr,
        handle,
    })
}

pub async fn port_forward(apis: &Apis, args: PortForwardArgs) -> anyhow::Result<()> {
    let filter = PodNameFilter::new(&args.regex)?;
    let pods = select_pods(apis, &filter).await?;

    if pods.is_empty() {
        println!("No matching pods using the regex \"{}\"", args.regex);
        return Ok(());
    }

    println!("Enabling port forward for:");
    let mut forwards = ForwardSet::default();
    for (idx, pod) in pods.iter().enumerate() {
        let Some(name) = pod.metadata.name.clone() else {
            bail!("pod without a name in namespace {}", apis.namespace);
        };
        let local = local_port(args.port, idx)?;
        println!("{}:{} - {}", local, args.remote_port, name);

        let forward = start_forward(&apis.pod, PodName(name), local, args.remote_port).await?;
        forwards.push(forward);
    }

    for forward in forwards.iter() {
        println!("{} -> {}", forward.local_addr, forward.pod);
    }
    println!(
        "{}",
        "Port forwarding started. Press Ctrl+C to stop.".green()
    );

    tokio::signal::ctrl_c()
        .await
        .context("when waiting for ctrl-c")?;
    println!("Stopping {} port forward(s)", forwards.len());

    Ok(())
}
