use std::fmt;

use anyhow::Context;
use k8s_openapi::api::core::v1::Pod;
use regex::Regex;

/// Owner kinds the resolver knows how to follow.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OwnerKind {
    ReplicaSet,
    Deployment,
    Other,
}

impl OwnerKind {
    pub fn parse(kind: &str) -> Self {
        match kind {
            "ReplicaSet" => OwnerKind::ReplicaSet,
            "Deployment" => OwnerKind::Deployment,
            _ => OwnerKind::Other,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodName(pub String);

impl fmt::Display for PodName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Selects pods whose whole name matches a regular expression.
#[derive(Debug, Clone)]
pub struct PodNameFilter {
    pattern: String,
    regex: Regex,
}

impl PodNameFilter {
    pub const MATCH_ALL: &'static str = ".*";

    pub fn new(pattern: &str) -> anyhow::Result<Self> {
        let regex = Regex::new(&format!("^(?:{})$", pattern))
            .with_context(|| format!("invalid pod name regex \"{}\"", pattern))?;
        Ok(PodNameFilter {
            pattern: pattern.to_owned(),
            regex,
        })
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    pub fn matches_name(&self, name: &str) -> bool {
        self.regex.is_match(name)
    }

    pub fn matches(&self, pod: &Pod) -> bool {
        pod.metadata
            .name
            .as_deref()
            .is_some_and(|name| self.matches_name(name))
    }
}

/// Status column as shown by `pod-watch`.
pub fn pod_display_status(pod: &Pod) -> &str {
    if pod.metadata.deletion_timestamp.is_some() {
        return "Terminating";
    }
    pod.status
        .as_ref()
        .and_then(|status| status.phase.as_deref())
        .unwrap_or("Unknown")
}
