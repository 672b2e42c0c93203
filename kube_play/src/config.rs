use std::path::{Path, PathBuf};

use anyhow::Context;
use k8s_util::config_dir::tool_config_file;
use serde::Deserialize;

use crate::debug::{DebugAgent, DEFAULT_CARRIER_VARS};

pub const TOOL_NAME: &str = "kube-play";
pub const CONFIG_FILE_NAME: &str = "config.toml";

#[derive(Debug, Default, Deserialize)]
pub struct ToolConfig {
    #[serde(default)]
    pub remote_debug: RemoteDebugConfig,
}

#[derive(Debug, Deserialize)]
pub struct RemoteDebugConfig {
    /// Environment variables that carry JVM startup flags
    #[serde(default = "default_carrier_vars")]
    pub carrier_vars: Vec<String>,
}

impl Default for RemoteDebugConfig {
    fn default() -> Self {
        RemoteDebugConfig {
            carrier_vars: default_carrier_vars(),
        }
    }
}

fn default_carrier_vars() -> Vec<String> {
    DEFAULT_CARRIER_VARS.iter().map(|v| v.to_string()).collect()
}

impl RemoteDebugConfig {
    pub fn debug_agent(&self) -> DebugAgent {
        DebugAgent::new(self.carrier_vars.iter().cloned())
    }
}

impl ToolConfig {
    pub fn parse(config_str: &str) -> anyhow::Result<Self> {
        toml::from_str(config_str).context("when parsing config")
    }

    /// Loads the explicitly given config file, or the per-user default one if
    /// it exists. Only an explicitly given file is required to exist.
    pub fn load(explicit: Option<&Path>) -> anyhow::Result<Self> {
        Self::load_from(explicit, tool_config_file(TOOL_NAME, CONFIG_FILE_NAME))
    }

    pub fn load_from(explicit: Option<&Path>, default: Option<PathBuf>) -> anyhow::Result<Self> {
        let path: PathBuf = match (explicit, default) {
            (Some(path), _) => path.to_owned(),
            (None, Some(path)) if path.is_file() => path,
            (None, _) => {
                log::debug!("no config file, using defaults");
                return Ok(ToolConfig::default());
            }
        };

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("when reading config file {}", path.display()))?;
        log::debug!("loaded config from {}", path.display());
        Self::parse(&config_str).with_context(|| format!("in {}", path.display()))
    }
}
