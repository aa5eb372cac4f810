//! # Bulk reconciler: full passes at startup and shutdown.
//!
//! The live event window only covers containers that start or stop while
//! the daemon is running. These two passes handle everything else:
//!
//! - [`initialise`] — refresh the cache, list every managed container, and
//!   converge each toward its desired set.
//! - [`terminate`] — list every managed container and reset each to its
//!   compose default network, mirroring the stop-event path.
//!
//! Containers are awaited one at a time, in listing order: the logged
//! counter reflects containers whose network operations actually completed,
//! and no two in-flight reconciliations can race on the same network name.
//! Per-container failures are logged and the batch continues; only the
//! initial listing is load-bearing enough to fail the pass.

use tracing::{debug, info};

use crate::engine::ConvergenceEngine;
use crate::error::ClientError;
use crate::model::Container;
use crate::policy::{self, Desired};

/// Converges every managed container toward its desired network set.
///
/// Returns the number of containers processed.
pub async fn initialise(engine: &mut ConvergenceEngine) -> Result<usize, ClientError> {
    engine.refresh_cache().await?;
    let containers = managed_containers(engine).await?;

    let mut processed = 0;
    for container in &containers {
        let cfg = engine.config();
        match policy::desired_networks(container, cfg) {
            Desired::Networks(networks) => {
                debug!(container = %container.name, targets = ?networks, "initialising");
                engine.move_container_to_networks(container, &networks).await;
                processed += 1;
            }
            Desired::Exempt => {
                debug!(container = %container.name, "not under policy; skipping");
            }
        }
    }

    info!(processed, total = containers.len(), "containers initialised");
    Ok(processed)
}

/// Resets every managed container to its compose default network.
///
/// Returns the number of containers reset. Invoked on the termination
/// signal; the caller bounds it with the grace period.
pub async fn terminate(engine: &mut ConvergenceEngine) -> Result<usize, ClientError> {
    let containers = managed_containers(engine).await?;

    let mut processed = 0;
    for container in &containers {
        if !policy::should_reset_on_stop(container, engine.config()) {
            debug!(container = %container.name, "not under policy; leaving to runtime teardown");
            continue;
        }
        debug!(container = %container.name, "resetting to default network");
        engine.reset_container(container).await;
        processed += 1;
    }

    info!(processed, total = containers.len(), "containers reset");
    Ok(processed)
}

/// Lists running containers belonging to a managed compose project.
///
/// The runtime filter selects on label presence; the project prefix is
/// checked here.
async fn managed_containers(
    engine: &ConvergenceEngine,
) -> Result<Vec<Container>, ClientError> {
    let cfg = engine.config();
    let all = engine.runtime().list_containers(&cfg.project_label).await?;
    let total = all.len();
    let managed: Vec<Container> = all
        .into_iter()
        .filter(|c| {
            let project = c.labels.get(&cfg.project_label).map(String::as_str);
            let keep = policy::is_managed_project(project, cfg);
            if !keep {
                debug!(container = %c.name, ?project, "outside managed project prefix");
            }
            keep
        })
        .collect();
    debug!(managed = managed.len(), total, "listed managed containers");
    Ok(managed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Config;
    use crate::model::{Network, NetworkMember, NetworkMode};
    use crate::runtime::{SimOp, SimRuntime};
    use std::collections::HashMap;
    use std::sync::Arc;

    fn cfg(connect_all: bool) -> Config {
        Config {
            connect_all,
            ..Config::default()
        }
    }

    fn container(id: &str, project: &str, networks_label: Option<&str>, current: &[&str]) -> Container {
        let mut labels = HashMap::new();
        labels.insert("com.docker.compose.project".to_string(), project.to_string());
        labels.insert("com.docker.compose.service".to_string(), "svc".to_string());
        if let Some(value) = networks_label {
            labels.insert("netvisor.networks".to_string(), value.to_string());
        }
        Container {
            id: id.to_string(),
            name: format!("/{id}"),
            labels,
            network_mode: NetworkMode::Bridged(format!("{project}_default")),
            networks: current
                .iter()
                .map(|n| (n.to_string(), NetworkMember::default()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn initialise_converges_each_managed_container() {
        let sim = Arc::new(SimRuntime::detached());
        sim.seed_container(container("c1", "ix-app1", Some("appnet"), &[]));
        sim.seed_container(container("c2", "ix-app2", None, &[]));
        sim.seed_container(container("c3", "other", Some("appnet"), &[]));
        let mut engine = ConvergenceEngine::new(sim.clone(), cfg(false));

        let processed = initialise(&mut engine).await.unwrap();

        // c2 is exempt (no label, connect-all off); c3 is outside the prefix.
        assert_eq!(processed, 1);
        assert!(sim.operations().iter().any(|op| matches!(
            op,
            SimOp::Connect { network, container, .. }
                if network == "appnet" && container == "c1"
        )));
    }

    #[tokio::test]
    async fn initialise_in_connect_all_uses_the_shared_network() {
        let sim = Arc::new(SimRuntime::detached());
        sim.seed_container(container("c1", "ix-app1", None, &[]));
        sim.seed_container(container("c2", "ix-app2", Some("custom"), &[]));
        let mut engine = ConvergenceEngine::new(sim.clone(), cfg(true));

        let processed = initialise(&mut engine).await.unwrap();

        assert_eq!(processed, 2);
        let shared_connects = sim
            .operations()
            .iter()
            .filter(|op| matches!(
                op,
                SimOp::Connect { network, .. } if network == "apps-internal"
            ))
            .count();
        assert_eq!(shared_connects, 2);
    }

    #[tokio::test]
    async fn terminate_resets_labeled_containers_only() {
        let sim = Arc::new(SimRuntime::detached());
        sim.seed_network(Network {
            id: "n1".to_string(),
            name: "appnet".to_string(),
            labels: [("netvisor.networks".to_string(), "true".to_string())]
                .into_iter()
                .collect(),
            members: [("c1".to_string(), NetworkMember::default())]
                .into_iter()
                .collect(),
        });
        sim.seed_container(container("c1", "ix-app1", Some("appnet"), &["appnet"]));
        sim.seed_container(container("c2", "ix-app2", None, &["ix-app2_default"]));
        let mut engine = ConvergenceEngine::new(sim.clone(), cfg(false));
        engine.refresh_cache().await.unwrap();

        let processed = terminate(&mut engine).await.unwrap();

        assert_eq!(processed, 1);
        let ops = sim.operations();
        assert!(ops.contains(&SimOp::Disconnect {
            network: "appnet".to_string(),
            container: "c1".to_string(),
        }));
        // Emptied managed network is collected on the way out.
        assert!(ops.contains(&SimOp::RemoveNetwork("appnet".to_string())));
    }
}
