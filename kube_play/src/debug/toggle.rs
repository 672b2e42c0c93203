//! Computes the pod template change that turns the debug agent on or off.
//!
//! Everything here is pure: inputs are borrowed snapshots of what was read
//! from the cluster and any change comes back as a new value.

use k8s_openapi::api::{
    apps::v1::Deployment,
    core::v1::{Container, ContainerPort},
};
use k8s_util::pod_template::{deployment_containers, deployment_name, deployment_pod_spec_mut};
use log::debug;

use super::{DebugAgent, ToggleMode, DEBUG_PORT_NAME, DEBUG_PORT_PROTOCOL};

/// New value for a carrier variable, or `None` when it is already in the
/// requested state.
pub fn toggle_value(agent: &DebugAgent, mode: ToggleMode, value: &str) -> Option<String> {
    let present = agent.pattern().is_match(value);
    match mode {
        ToggleMode::Enable if !present => {
            Some(format!("{} {}", value, agent.statement()).trim().to_owned())
        }
        ToggleMode::Remove if present => {
            let stripped = agent.pattern().replace_all(value, "");
            Some(agent.collapse_whitespace(&stripped))
        }
        _ => None,
    }
}

/// New port list, or `None` when the debug port is already in the requested
/// state. Removal drops every entry on the debug port and leaves an empty
/// list absent.
pub fn toggle_ports(
    agent: &DebugAgent,
    mode: ToggleMode,
    ports: Option<&[ContainerPort]>,
) -> Option<Option<Vec<ContainerPort>>> {
    let ports = ports.unwrap_or_default();
    let exposed = ports.iter().any(|port| port.container_port == agent.port());

    match mode {
        ToggleMode::Enable if !exposed => {
            let mut updated = ports.to_vec();
            updated.push(ContainerPort {
                name: Some(DEBUG_PORT_NAME.to_owned()),
                protocol: Some(DEBUG_PORT_PROTOCOL.to_owned()),
                container_port: agent.port(),
                ..Default::default()
            });
            Some(Some(updated))
        }
        ToggleMode::Remove if exposed => {
            let updated: Vec<_> = ports
                .iter()
                .filter(|port| port.container_port != agent.port())
                .cloned()
                .collect();
            Some((!updated.is_empty()).then_some(updated))
        }
        _ => None,
    }
}

/// Returns the toggled container, or `None` when the container carries no
/// debug variable or already is in the requested state.
pub fn toggle_container(
    agent: &DebugAgent,
    mode: ToggleMode,
    container: &Container,
) -> Option<Container> {
    let env = container.env.as_deref().unwrap_or_default();
    let (var_idx, var) = env
        .iter()
        .enumerate()
        .find(|(_, var)| agent.is_carrier(&var.name))?;

    if var.value.is_none() && var.value_from.is_some() {
        debug!(
            "container {}: {} is set through valueFrom, leaving it alone",
            container.name, var.name
        );
        return None;
    }

    let value = toggle_value(agent, mode, var.value.as_deref().unwrap_or_default());
    let ports = toggle_ports(agent, mode, container.ports.as_deref());
    if value.is_none() && ports.is_none() {
        return None;
    }

    let mut updated = container.clone();
    if let Some(value) = value {
        if let Some(env) = updated.env.as_mut() {
            env[var_idx].value = Some(value);
        }
    }
    if let Some(ports) = ports {
        updated.ports = ports;
    }
    debug!("container {}: debug agent {}", container.name, mode.describe());

    Some(updated)
}

/// Returns the deployment with every container toggled, or `None` when no
/// container needed a change.
pub fn evaluate(
    agent: &DebugAgent,
    mode: ToggleMode,
    deployment: &Deployment,
) -> Option<Deployment> {
    let mut changed = false;
    let containers: Vec<Container> = deployment_containers(deployment)
        .iter()
        .map(|container| match toggle_container(agent, mode, container) {
            Some(updated) => {
                changed = true;
                updated
            }
            None => container.clone(),
        })
        .collect();

    if !changed {
        debug!(
            "deployment {} already has debug {}",
            deployment_name(deployment),
            mode.describe()
        );
        return None;
    }

    let mut updated = deployment.clone();
    deployment_pod_spec_mut(&mut updated)?.containers = containers;
    Some(updated)
}

#[cfg(test)]
mod tests {
    use k8s_openapi::api::core::v1::{ConfigMapKeySelector, EnvVar, EnvVarSource};
    use k8s_util::testing::{container, deployment};

    use super::*;
    use crate::debug::{DEBUG_PORT, DEBUG_STATEMENT};

    fn env_value<'a>(c: &'a Container, name: &str) -> Option<&'a str> {
        c.env
            .iter()
            .flatten()
            .find(|v| v.name == name)
            .and_then(|v| v.value.as_deref())
    }

    fn debug_ports(c: &Container) -> usize {
        c.ports
            .iter()
            .flatten()
            .filter(|p| p.container_port == DEBUG_PORT)
            .count()
    }

    fn containers(d: &Deployment) -> &[Container] {
        deployment_containers(d)
    }

    #[test]
    fn enable_appends_flag_and_port() {
        let agent = DebugAgent::default();
        let d = deployment(
            "svc-x",
            vec![container("app", &[("CATALINA_OPTS", "-Xmx512m")], &[8080])],
        );

        let updated = evaluate(&agent, ToggleMode::Enable, &d).unwrap();
        let app = &containers(&updated)[0];
        assert_eq!(
            env_value(app, "CATALINA_OPTS"),
            Some(format!("-Xmx512m {}", DEBUG_STATEMENT).as_str())
        );

        let ports = app.ports.as_ref().unwrap();
        assert_eq!(ports.len(), 2);
        let debug = &ports[1];
        assert_eq!(debug.container_port, 8000);
        assert_eq!(debug.name.as_deref(), Some("debug"));
        assert_eq!(debug.protocol.as_deref(), Some("TCP"));

        // input untouched
        assert_eq!(
            env_value(&containers(&d)[0], "CATALINA_OPTS"),
            Some("-Xmx512m")
        );
    }

    #[test]
    fn enable_on_empty_value_is_trimmed() {
        let agent = DebugAgent::default();
        assert_eq!(
            toggle_value(&agent, ToggleMode::Enable, ""),
            Some(DEBUG_STATEMENT.to_owned())
        );
        assert_eq!(
            toggle_value(&agent, ToggleMode::Enable, "  -Xms1g  "),
            Some(format!("-Xms1g   {}", DEBUG_STATEMENT))
        );
    }

    #[test]
    fn containers_without_carrier_are_untouched() {
        let agent = DebugAgent::default();
        let plain = container("sidecar", &[("JAVA_OPTS", "-Xmx1g")], &[]);
        let no_env = container("proxy", &[], &[9090]);

        for mode in [ToggleMode::Enable, ToggleMode::Remove] {
            assert!(toggle_container(&agent, mode, &plain).is_none());
            assert!(toggle_container(&agent, mode, &no_env).is_none());
        }

        let d = deployment("svc-x", vec![plain, no_env]);
        assert!(evaluate(&agent, ToggleMode::Enable, &d).is_none());
    }

    #[test]
    fn enabling_twice_is_a_no_op() {
        let agent = DebugAgent::default();
        let d = deployment(
            "svc-x",
            vec![container("app", &[("CATALINA_OPTS", "-Xmx512m")], &[])],
        );

        let once = evaluate(&agent, ToggleMode::Enable, &d).unwrap();
        assert!(evaluate(&agent, ToggleMode::Enable, &once).is_none());
    }

    #[test]
    fn removing_twice_is_a_no_op() {
        let agent = DebugAgent::default();
        let value = format!("-Xmx512m {}", DEBUG_STATEMENT);
        let d = deployment(
            "svc-x",
            vec![container("app", &[("CATALINA_OPTS", &value)], &[8080, 8000])],
        );

        let once = evaluate(&agent, ToggleMode::Remove, &d).unwrap();
        assert!(evaluate(&agent, ToggleMode::Remove, &once).is_none());
    }

    #[test]
    fn enable_then_remove_restores_original() {
        let agent = DebugAgent::default();
        let d = deployment(
            "svc-x",
            vec![container(
                "app",
                &[("CATALINA_OPTS", "-Xmx512m -Dfile.encoding=UTF-8")],
                &[8080],
            )],
        );

        let enabled = evaluate(&agent, ToggleMode::Enable, &d).unwrap();
        let app = &containers(&enabled)[0];
        assert_eq!(
            env_value(app, "CATALINA_OPTS")
                .unwrap()
                .matches("-agentlib:jdwp=")
                .count(),
            1
        );
        assert_eq!(debug_ports(app), 1);

        let removed = evaluate(&agent, ToggleMode::Remove, &enabled).unwrap();
        assert_eq!(containers(&removed), containers(&d));
    }

    #[test]
    fn round_trip_without_ports_leaves_ports_absent() {
        let agent = DebugAgent::default();
        let d = deployment("svc-x", vec![container("app", &[("CATALINA_OPTS", "")], &[])]);

        let enabled = evaluate(&agent, ToggleMode::Enable, &d).unwrap();
        let removed = evaluate(&agent, ToggleMode::Remove, &enabled).unwrap();
        let app = &containers(&removed)[0];
        assert_eq!(env_value(app, "CATALINA_OPTS"), Some(""));
        assert!(app.ports.is_none());
    }

    #[test]
    fn remove_keeps_other_flags_and_collapses_whitespace() {
        let agent = DebugAgent::default();
        let value = "-Xmx512m  -agentlib:jdwp=transport=dt_socket,address=*:5005   -Dfoo=bar";
        assert_eq!(
            toggle_value(&agent, ToggleMode::Remove, value),
            Some("-Xmx512m -Dfoo=bar".to_owned())
        );
    }

    #[test]
    fn variant_agent_flag_counts_as_enabled() {
        let agent = DebugAgent::default();
        let c = container(
            "app",
            &[("CATALINA_OPTS", "-agentlib:jdwp=transport=dt_socket,address=5005")],
            &[8000],
        );
        assert!(toggle_container(&agent, ToggleMode::Enable, &c).is_none());
    }

    #[test]
    fn port_and_flag_are_toggled_independently() {
        let agent = DebugAgent::default();
        let flag_only = container("app", &[("CATALINA_OPTS", DEBUG_STATEMENT)], &[]);

        let updated = toggle_container(&agent, ToggleMode::Enable, &flag_only).unwrap();
        assert_eq!(env_value(&updated, "CATALINA_OPTS"), Some(DEBUG_STATEMENT));
        assert_eq!(debug_ports(&updated), 1);

        let port_only = container("app", &[("CATALINA_OPTS", "-Xmx1g")], &[8000]);
        let updated = toggle_container(&agent, ToggleMode::Remove, &port_only).unwrap();
        assert_eq!(env_value(&updated, "CATALINA_OPTS"), Some("-Xmx1g"));
        assert!(updated.ports.is_none());
    }

    #[test]
    fn remove_drops_duplicated_debug_ports() {
        let agent = DebugAgent::default();
        let c = container("app", &[("CATALINA_OPTS", "")], &[8000, 8080, 8000]);

        let updated = toggle_container(&agent, ToggleMode::Remove, &c).unwrap();
        let ports: Vec<_> = updated
            .ports
            .unwrap()
            .iter()
            .map(|p| p.container_port)
            .collect();
        assert_eq!(ports, vec![8080]);
    }

    #[test]
    fn only_first_carrier_variable_is_edited() {
        let agent = DebugAgent::new(["CATALINA_OPTS", "JAVA_OPTS"]);
        let c = container(
            "app",
            &[("JAVA_OPTS", "-Xmx1g"), ("CATALINA_OPTS", "-Xms1g")],
            &[],
        );

        let updated = toggle_container(&agent, ToggleMode::Enable, &c).unwrap();
        assert!(env_value(&updated, "JAVA_OPTS")
            .unwrap()
            .contains("-agentlib:jdwp="));
        assert_eq!(env_value(&updated, "CATALINA_OPTS"), Some("-Xms1g"));
    }

    #[test]
    fn value_from_carrier_is_skipped() {
        let agent = DebugAgent::default();
        let mut c = container("app", &[], &[]);
        c.env = Some(vec![EnvVar {
            name: "CATALINA_OPTS".into(),
            value: None,
            value_from: Some(EnvVarSource {
                config_map_key_ref: Some(ConfigMapKeySelector {
                    key: "opts".into(),
                    ..Default::default()
                }),
                ..Default::default()
            }),
        }]);

        assert!(toggle_container(&agent, ToggleMode::Enable, &c).is_none());
    }

    #[test]
    fn second_container_change_marks_deployment_changed() {
        let agent = DebugAgent::default();
        let d = deployment(
            "svc-x",
            vec![
                container("envoy", &[("LOG_LEVEL", "info")], &[9901]),
                container("app", &[("CATALINA_OPTS", "-Xmx512m")], &[]),
            ],
        );

        let updated = evaluate(&agent, ToggleMode::Enable, &d).unwrap();
        let (before, after) = (containers(&d), containers(&updated));
        assert_eq!(before[0], after[0]);
        assert_ne!(before[1], after[1]);
    }

    #[test]
    fn changed_flag_aggregates_across_all_containers() {
        let agent = DebugAgent::default();
        let d = deployment(
            "svc-x",
            vec![
                container("first", &[("CATALINA_OPTS", "-Xmx1g")], &[]),
                container("second", &[("CATALINA_OPTS", DEBUG_STATEMENT)], &[8000]),
                container("third", &[("CATALINA_OPTS", "-Xms1g")], &[]),
            ],
        );

        let updated = evaluate(&agent, ToggleMode::Enable, &d).unwrap();
        let after = containers(&updated);
        assert_eq!(debug_ports(&after[0]), 1);
        assert_eq!(after[1], containers(&d)[1]);
        assert_eq!(debug_ports(&after[2]), 1);
    }

    #[test]
    fn remove_on_clean_deployment_is_none() {
        let agent = DebugAgent::default();
        let d = deployment(
            "svc-x",
            vec![container("app", &[("CATALINA_OPTS", "-Xmx512m")], &[8080])],
        );
        assert!(evaluate(&agent, ToggleMode::Remove, &d).is_none());
    }
}
