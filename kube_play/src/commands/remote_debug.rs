use std::{
    collections::BTreeSet,
    io::{self, Write},
};

use anyhow::{bail, Context};
use colored::Colorize;
use k8s_openapi::api::apps::v1::Deployment;
use k8s_util::{
    apis::{is_fatal, owner::resolve_deployment, select_pods, Apis, ClusterReader, ClusterWriter},
    kube_types::PodNameFilter,
    pod_template::deployment_name,
};
use log::{debug, warn};

use crate::{
    config::ToolConfig,
    debug::{
        apply::{apply, Applied, ApplyError},
        toggle::evaluate,
        DebugAgent, ToggleMode,
    },
};

#[derive(clap::Args, Debug)]
pub struct RemoteDebugArgs {
    /// Regex the whole pod name has to match
    #[arg(default_value = PodNameFilter::MATCH_ALL)]
    pub regex: String,
    /// Remove debug configuration
    #[arg(short, long)]
    pub remove: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Selecting,
    Resolving,
    Deduping,
    Fetching,
    Evaluating,
    Applying,
    Done,
}

#[derive(Debug)]
pub struct ApplyResult {
    pub deployment: String,
    pub result: Result<Applied, ApplyError>,
}

#[derive(Debug)]
pub enum Outcome {
    NoMatchingPods,
    NoDeployments,
    NothingToModify,
    Applied(Vec<ApplyResult>),
}

#[derive(Debug)]
pub struct Report {
    pub namespace: String,
    pub pattern: String,
    pub mode: ToggleMode,
    /// Last stage entered before the run terminated
    pub reached: Stage,
    pub pods: Vec<String>,
    pub deployments: Vec<String>,
    pub outcome: Outcome,
}

impl Report {
    pub fn failed(&self) -> usize {
        match &self.outcome {
            Outcome::Applied(results) => results.iter().filter(|r| r.result.is_err()).count(),
            _ => 0,
        }
    }
}

struct Run {
    report: Report,
}

impl Run {
    fn enter(&mut self, stage: Stage) {
        debug!("remote-debug: {:?} -> {:?}", self.report.reached, stage);
        self.report.reached = stage;
    }

    fn finish(mut self, outcome: Outcome) -> Report {
        self.report.outcome = outcome;
        self.report
    }
}

/// Toggles the debug agent on every deployment owning a pod that matches
/// `filter`. A single sequential pass: each stage completes before the next
/// one starts and every deployment is written at most once.
///
/// Errors local to one pod or deployment are logged and skipped. Only
/// failures that would hit every further call (transport, authn/authz)
/// abort the run.
pub async fn run<C>(
    cluster: &C,
    filter: &PodNameFilter,
    agent: &DebugAgent,
    mode: ToggleMode,
) -> anyhow::Result<Report>
where
    C: ClusterReader + ClusterWriter,
{
    let mut run = Run {
        report: Report {
            namespace: cluster.namespace().to_owned(),
            pattern: filter.pattern().to_owned(),
            mode,
            reached: Stage::Selecting,
            pods: Vec::new(),
            deployments: Vec::new(),
            outcome: Outcome::NoMatchingPods,
        },
    };

    let pods = select_pods(cluster, filter).await?;
    run.report.pods = pods
        .iter()
        .filter_map(|pod| pod.metadata.name.clone())
        .collect();
    if pods.is_empty() {
        return Ok(run.finish(Outcome::NoMatchingPods));
    }

    run.enter(Stage::Resolving);
    let mut resolved = Vec::with_capacity(pods.len());
    for pod in &pods {
        let pod_name = pod.metadata.name.as_deref().unwrap_or("<unnamed>");
        match resolve_deployment(cluster, pod).await {
            Ok(Some(name)) => resolved.push(name),
            Ok(None) => debug!("pod {} has no owning deployment", pod_name),
            Err(err) if is_fatal(&err) => {
                return Err(err)
                    .with_context(|| format!("when resolving deployment of pod {}", pod_name));
            }
            Err(err) => warn!("skipping pod {}: {}", pod_name, err),
        }
    }

    run.enter(Stage::Deduping);
    let names: BTreeSet<String> = resolved.into_iter().collect();
    if names.is_empty() {
        return Ok(run.finish(Outcome::NoDeployments));
    }

    run.enter(Stage::Fetching);
    let mut deployments: Vec<Deployment> = Vec::with_capacity(names.len());
    for name in &names {
        match cluster.get_deployment(name).await {
            Ok(Some(deployment)) => deployments.push(deployment),
            Ok(None) => warn!("deployment {} disappeared, skipping", name),
            Err(err) if is_fatal(&err) => {
                return Err(err).with_context(|| format!("when fetching deployment {}", name));
            }
            Err(err) => warn!("skipping deployment {}: {}", name, err),
        }
    }
    run.report.deployments = deployments
        .iter()
        .map(|d| deployment_name(d).to_owned())
        .collect();
    if deployments.is_empty() {
        return Ok(run.finish(Outcome::NoDeployments));
    }

    run.enter(Stage::Evaluating);
    let modified: Vec<Deployment> = deployments
        .iter()
        .filter_map(|deployment| evaluate(agent, mode, deployment))
        .collect();
    if modified.is_empty() {
        return Ok(run.finish(Outcome::NothingToModify));
    }

    run.enter(Stage::Applying);
    let mut results = Vec::with_capacity(modified.len());
    for deployment in &modified {
        let result = apply(cluster, deployment).await;
        if let Err(err) = &result {
            warn!("{}", err);
        }
        results.push(ApplyResult {
            deployment: deployment_name(deployment).to_owned(),
            result,
        });
    }

    run.enter(Stage::Done);
    Ok(run.finish(Outcome::Applied(results)))
}

/// Writes the human-readable summary of a run.
pub fn write_report(out: &mut impl Write, report: &Report) -> io::Result<()> {
    if report.pods.is_empty() {
        writeln!(
            out,
            "No matching pods using the regex \"{}\" within \"{}\" namespace",
            report.pattern, report.namespace
        )?;
        return Ok(());
    }

    writeln!(out, "Pods found within \"{}\" namespace:", report.namespace)?;
    for pod in &report.pods {
        writeln!(out, "{}", pod)?;
    }

    if matches!(report.outcome, Outcome::NoDeployments) {
        writeln!(out, "\n{}", "No corresponding deployments identified".yellow())?;
        return Ok(());
    }

    writeln!(out, "\nIdentified corresponding deployments:")?;
    for deployment in &report.deployments {
        writeln!(out, "{}", deployment)?;
    }

    match &report.outcome {
        Outcome::NothingToModify => {
            writeln!(out, "\n{}", "No deployments needed modifications".yellow())?;
        }
        Outcome::Applied(results) => {
            writeln!(
                out,
                "\nSaving modified deployments (remote debug {}):",
                report.mode.describe()
            )?;
            for ApplyResult { deployment, result } in results {
                match result {
                    Ok(Applied {
                        generation: Some(generation),
                        ..
                    }) => writeln!(out, "{} (generation {})", deployment.green(), generation)?,
                    Ok(_) => writeln!(out, "{}", deployment.green())?,
                    Err(err) => {
                        writeln!(out, "{} {}", deployment.red(), format!("({})", err).red())?
                    }
                }
            }
        }
        Outcome::NoMatchingPods | Outcome::NoDeployments => {}
    }
    Ok(())
}

pub async fn remote_debug(
    apis: &Apis,
    config: &ToolConfig,
    args: RemoteDebugArgs,
) -> anyhow::Result<()> {
    let filter = PodNameFilter::new(&args.regex)?;
    let agent = config.remote_debug.debug_agent();
    let mode = ToggleMode::from_remove_flag(args.remove);
    debug!(
        "debug carrier variables: {:?}",
        agent.carrier_vars().collect::<Vec<_>>()
    );

    let report = run(apis, &filter, &agent, mode).await?;
    write_report(&mut io::stdout().lock(), &report).context("when printing report")?;

    let failed = report.failed();
    if failed > 0 {
        bail!("{} deployment(s) could not be updated", failed);
    }
    Ok(())
}
