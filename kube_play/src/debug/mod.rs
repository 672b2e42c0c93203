use std::{collections::BTreeSet, sync::LazyLock};

use regex::Regex;

pub mod apply;
pub mod toggle;

pub const DEBUG_STATEMENT: &str =
    "-agentlib:jdwp=transport=dt_socket,server=y,suspend=n,address=0.0.0.0:8000";
pub const DEBUG_PATTERN: &str = r"-agentlib:jdwp=\S*";
const REDUNDANT_WHITESPACE: &str = r"\s{2,}";
pub const DEBUG_PORT: i32 = 8000;
pub const DEBUG_PORT_NAME: &str = "debug";
pub const DEBUG_PORT_PROTOCOL: &str = "TCP";
pub const DEFAULT_CARRIER_VARS: &[&str] = &["CATALINA_OPTS"];

static DEBUG_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DEBUG_PATTERN).expect("debug agent pattern is valid"));
static REDUNDANT_WHITESPACE_REGEX: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(REDUNDANT_WHITESPACE).expect("whitespace pattern is valid"));

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToggleMode {
    Enable,
    Remove,
}

impl ToggleMode {
    pub fn from_remove_flag(remove: bool) -> Self {
        if remove {
            ToggleMode::Remove
        } else {
            ToggleMode::Enable
        }
    }

    pub fn describe(self) -> &'static str {
        match self {
            ToggleMode::Enable => "enabled",
            ToggleMode::Remove => "disabled",
        }
    }
}

/// The JDWP agent as it is injected into containers: the flag written into a
/// carrier variable, the pattern recognising any existing agent flag, and
/// the port exposed for the debugger.
#[derive(Debug, Clone)]
pub struct DebugAgent {
    statement: String,
    pattern: Regex,
    redundant_whitespace: Regex,
    port: i32,
    carrier_vars: BTreeSet<String>,
}

impl DebugAgent {
    pub fn new<I, S>(carrier_vars: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        DebugAgent {
            statement: DEBUG_STATEMENT.to_owned(),
            pattern: DEBUG_REGEX.clone(),
            redundant_whitespace: REDUNDANT_WHITESPACE_REGEX.clone(),
            port: DEBUG_PORT,
            carrier_vars: carrier_vars.into_iter().map(Into::into).collect(),
        }
    }

    pub fn statement(&self) -> &str {
        &self.statement
    }

    pub fn pattern(&self) -> &Regex {
        &self.pattern
    }

    /// Squashes runs of two or more whitespace characters left behind by a
    /// removed flag, then trims.
    pub fn collapse_whitespace(&self, value: &str) -> String {
        self.redundant_whitespace
            .replace_all(value, " ")
            .trim()
            .to_owned()
    }

    pub fn port(&self) -> i32 {
        self.port
    }

    pub fn is_carrier(&self, var_name: &str) -> bool {
        self.carrier_vars.contains(var_name)
    }

    pub fn carrier_vars(&self) -> impl Iterator<Item = &str> {
        self.carrier_vars.iter().map(String::as_str)
    }
}

impl Default for DebugAgent {
    fn default() -> Self {
        DebugAgent::new(DEFAULT_CARRIER_VARS.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pattern_recognises_statement_and_variants() {
        let agent = DebugAgent::default();
        assert!(agent.pattern().is_match(DEBUG_STATEMENT));
        assert!(agent
            .pattern()
            .is_match("-agentlib:jdwp=transport=dt_socket,server=y,address=*:5005"));
        assert!(agent.pattern().is_match("-agentlib:jdwp="));
        assert!(!agent.pattern().is_match("-Xmx512m -agentlib:hprof=cpu=samples"));
    }

    #[test]
    fn collapse_whitespace_squashes_gaps_left_by_removal() {
        let agent = DebugAgent::default();
        assert_eq!(agent.collapse_whitespace("  -Xmx512m    -Xms1g \t"), "-Xmx512m -Xms1g");
        assert_eq!(agent.collapse_whitespace("   "), "");
    }

    #[test]
    fn default_carrier_set() {
        let agent = DebugAgent::default();
        assert!(agent.is_carrier("CATALINA_OPTS"));
        assert!(!agent.is_carrier("JAVA_OPTS"));
        assert!(!agent.is_carrier("catalina_opts"));
    }

    #[test]
    fn mode_from_flag() {
        assert_eq!(ToggleMode::from_remove_flag(false), ToggleMode::Enable);
        assert_eq!(ToggleMode::from_remove_flag(true), ToggleMode::Remove);
        assert_eq!(ToggleMode::Remove.describe(), "disabled");
    }
}
