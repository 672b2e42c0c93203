use std::{
    io::{self, Write},
    time::Duration,
};

use anyhow::Context;
use crossterm::{
    cursor::MoveTo,
    queue,
    terminal::{Clear, ClearType},
};
use k8s_openapi::api::core::v1::Pod;
use k8s_util::{
    apis::{select_pods, Apis},
    kube_types::{pod_display_status, PodNameFilter},
};

#[derive(clap::Args, Debug)]
pub struct PodWatchArgs {
    /// Regex the whole pod name has to match
    #[arg(default_value = PodNameFilter::MATCH_ALL)]
    pub regex: String,
    /// How often to update, lowest is 1 second
    #[arg(short, long, default_value = "1")]
    pub interval: u64,
}

pub fn render_row(pod: &Pod) -> String {
    let name = pod.metadata.name.as_deref().unwrap_or_default();
    format!("{:<45} {:<15}", name, pod_display_status(pod))
}

fn draw(out: &mut impl Write, pods: &[Pod]) -> io::Result<()> {
    queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
    for pod in pods {
        writeln!(out, "{}", render_row(pod))?;
    }
    writeln!(
        out,
        "\nPress CTRL+C to quit. Updated at: {}",
        chrono::Local::now().format("%H:%M:%S%.3f")
    )?;
    out.flush()
}

async fn watch_loop(apis: &Apis, filter: &PodNameFilter, period: Duration) -> anyhow::Result<()> {
    let mut ticker = tokio::time::interval(period);
    let mut stdout = io::stdout();
    loop {
        ticker.tick().await;
        let pods = select_pods(apis, filter).await?;
        draw(&mut stdout, &pods).context("when drawing pod list")?;
    }
}

/// Refresh period, never below one second.
fn watch_period(interval: u64) -> Duration {
    Duration::from_secs(interval.max(1))
}

/// Redraws the matching pods every interval until interrupted.
pub async fn pod_watch(apis: &Apis, args: PodWatchArgs) -> anyhow::Result<()> {
    let filter = PodNameFilter::new(&args.regex)?;
    let period = watch_period(args.interval);

    tokio::select! {
        res = watch_loop(apis, &filter, period) => res,
        res = tokio::signal::ctrl_c() => {
            res.context("when waiting for ctrl-c")?;
            Ok(())
        }
    }
}
