//! # Policy resolver: desired network membership from container metadata.
//!
//! Pure functions only; nothing here touches the runtime or the cache.
//!
//! ## Resolution
//! - connect-all mode → the single shared network.
//! - policy label present → comma-separated names, trimmed. An empty or
//!   whitespace-only value falls back to the shared network, never an empty
//!   set — an empty set would silently orphan the container.
//! - neither → the container is exempt; the engine must not touch it.
//!
//! ## Stop path
//! A stopping container is reset to its compose default network
//! (`<project>_default`) when it is under policy (label present or
//! connect-all). Otherwise runtime teardown is left to handle it.

use crate::config::Config;
use crate::model::Container;

/// DNS zone suffix appended to `<service>.<project>` aliases.
const DNS_ZONE: &str = "svc.cluster.local";

/// Desired network set for a container, as computed by policy.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Desired {
    /// The container is not under policy; leave its networks untouched.
    Exempt,
    /// Converge the container toward exactly these networks, in order.
    Networks(Vec<String>),
}

/// Resolves the desired network set for a starting container.
pub fn desired_networks(container: &Container, cfg: &Config) -> Desired {
    if cfg.connect_all {
        return Desired::Networks(vec![cfg.shared_network.clone()]);
    }
    match container.labels.get(&cfg.policy_label) {
        Some(value) => Desired::Networks(split_network_label(value, &cfg.shared_network)),
        None => Desired::Exempt,
    }
}

/// Splits a policy label value into trimmed network names.
///
/// Malformed or empty values yield the shared-network fallback.
pub fn split_network_label(value: &str, fallback: &str) -> Vec<String> {
    let names: Vec<String> = value
        .split(',')
        .map(str::trim)
        .filter(|name| !name.is_empty())
        .map(str::to_string)
        .collect();
    if names.is_empty() {
        vec![fallback.to_string()]
    } else {
        names
    }
}

/// Whether a stopping container must be reset to its default network.
///
/// Containers without a policy label are excluded when connect-all is off:
/// the runtime's own teardown already detaches them.
pub fn should_reset_on_stop(container: &Container, cfg: &Config) -> bool {
    cfg.connect_all || container.labels.contains_key(&cfg.policy_label)
}

/// The compose default network for a container, `<project>_default`.
///
/// `None` when the project label is missing; such a container has no
/// well-defined default to return to.
pub fn default_network(container: &Container, cfg: &Config) -> Option<String> {
    container
        .labels
        .get(&cfg.project_label)
        .map(|project| format!("{project}_default"))
}

/// True when the compose project value marks a managed container.
pub fn is_managed_project(project: Option<&str>, cfg: &Config) -> bool {
    project.is_some_and(|p| p.starts_with(&cfg.project_prefix))
}

/// DNS alias published on connect, `<service>.<project>.svc.cluster.local`.
///
/// Requires both compose labels; without them there is no meaningful name to
/// publish.
pub fn dns_alias(container: &Container, cfg: &Config) -> Option<String> {
    let service = container.labels.get(&cfg.service_label)?;
    let project = container.labels.get(&cfg.project_label)?;
    Some(format!("{service}.{project}.{DNS_ZONE}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn labeled(labels: &[(&str, &str)]) -> Container {
        Container {
            id: "c1".to_string(),
            name: "web".to_string(),
            labels: labels
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            ..Container::default()
        }
    }

    fn selective() -> Config {
        Config {
            connect_all: false,
            ..Config::default()
        }
    }

    #[test]
    fn connect_all_overrides_labels() {
        let cfg = Config::default();
        let container = labeled(&[("netvisor.networks", "a,b")]);
        assert_eq!(
            desired_networks(&container, &cfg),
            Desired::Networks(vec!["apps-internal".to_string()])
        );
    }

    #[test]
    fn label_value_splits_on_commas_with_trim() {
        let cfg = selective();
        let container = labeled(&[("netvisor.networks", "a, b ,c")]);
        assert_eq!(
            desired_networks(&container, &cfg),
            Desired::Networks(vec!["a".to_string(), "b".to_string(), "c".to_string()])
        );
    }

    #[test]
    fn whitespace_only_label_falls_back_to_shared_network() {
        assert_eq!(
            split_network_label("   ", "apps-internal"),
            vec!["apps-internal".to_string()]
        );
        assert_eq!(
            split_network_label(" , ,", "apps-internal"),
            vec!["apps-internal".to_string()]
        );
    }

    #[test]
    fn unlabeled_container_is_exempt_outside_connect_all() {
        let cfg = selective();
        let container = labeled(&[("com.docker.compose.project", "ix-myapp")]);
        assert_eq!(desired_networks(&container, &cfg), Desired::Exempt);
        assert!(!should_reset_on_stop(&container, &cfg));
    }

    #[test]
    fn labeled_container_is_reset_on_stop() {
        let cfg = selective();
        let container = labeled(&[
            ("netvisor.networks", "appnet"),
            ("com.docker.compose.project", "ix-myapp"),
        ]);
        assert!(should_reset_on_stop(&container, &cfg));
        assert_eq!(
            default_network(&container, &cfg),
            Some("ix-myapp_default".to_string())
        );
    }

    #[test]
    fn project_prefix_gates_management() {
        let cfg = Config::default();
        assert!(is_managed_project(Some("ix-myapp"), &cfg));
        assert!(!is_managed_project(Some("myapp"), &cfg));
        assert!(!is_managed_project(None, &cfg));
    }

    #[test]
    fn dns_alias_requires_both_compose_labels() {
        let cfg = Config::default();
        let full = labeled(&[
            ("com.docker.compose.service", "svc"),
            ("com.docker.compose.project", "project"),
        ]);
        assert_eq!(
            dns_alias(&full, &cfg),
            Some("svc.project.svc.cluster.local".to_string())
        );

        let partial = labeled(&[("com.docker.compose.service", "svc")]);
        assert_eq!(dns_alias(&partial, &cfg), None);
    }
}
