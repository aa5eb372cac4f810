//! # Convergence engine: diff current vs. desired membership and apply it.
//!
//! [`ConvergenceEngine`] owns the [`NetworkCache`] and a handle to the
//! runtime client. For one container at a time it computes the membership
//! diff and issues the minimal set of mutating calls, keeping the cache
//! consistent as it goes.
//!
//! ## Algorithm (`move_container_to_networks`)
//! ```text
//! to_connect    = desired − current      (in desired order)
//! to_disconnect = current − desired
//!
//! for each to_connect:
//!     ensure network exists (create managed + isolated if absent)
//!     connect endpoint, publishing the compose DNS alias
//!     cache: add member
//! for each to_disconnect:
//!     disconnect endpoint
//!     cache: drop member
//!     if member set emptied and network is managed → remove network
//! ```
//!
//! ## Rules
//! - Containers whose network mode is `none`, `host`, `container:*` or
//!   `service:*` are never mutated; the call is a warning no-op.
//! - Connects are issued before disconnects so the container is never left
//!   without membership mid-convergence.
//! - Each network is attempted independently: a connect/disconnect failure
//!   is logged and the rest of the batch continues.
//! - A create conflict ([`CreateOutcome::AlreadyExists`]) is success.
//! - Network removal refuses (warn, `false`) when the network is unknown or
//!   its cached member set is non-empty; both are stale-cache guards.
//!
//! ## Concurrency
//! Cache mutations are not atomic across `await` points. The daemon runs
//! the engine from a single logical thread and never fans out mutations for
//! the same network name in parallel; the 409-tolerant create and the
//! empty-check-before-remove cover the remaining same-name races.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::cache::NetworkCache;
use crate::config::Config;
use crate::error::ClientError;
use crate::model::{Container, NetworkSpec};
use crate::policy;
use crate::runtime::{CreateOutcome, RuntimeClient};

/// Outcome of ensuring a network exists.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EnsureOutcome {
    /// The network was created by this call.
    Created,
    /// The network already existed (cache hit or benign create race).
    Existed,
}

/// Reconciles a container's network membership toward its desired set.
pub struct ConvergenceEngine {
    runtime: Arc<dyn RuntimeClient>,
    cache: NetworkCache,
    cfg: Config,
}

impl ConvergenceEngine {
    /// Creates an engine over the given runtime client.
    pub fn new(runtime: Arc<dyn RuntimeClient>, cfg: Config) -> Self {
        Self {
            runtime,
            cache: NetworkCache::new(),
            cfg,
        }
    }

    /// Daemon configuration the engine was built with.
    pub fn config(&self) -> &Config {
        &self.cfg
    }

    /// Read access to the network cache (bulk logging, tests).
    pub fn cache(&self) -> &NetworkCache {
        &self.cache
    }

    /// Handle to the runtime client the engine drives.
    pub fn runtime(&self) -> &Arc<dyn RuntimeClient> {
        &self.runtime
    }

    /// Replaces the cache with a fresh runtime listing.
    pub async fn refresh_cache(&mut self) -> Result<(), ClientError> {
        let networks = self.runtime.list_networks().await?;
        self.cache.refresh(networks);
        debug!(count = self.cache.len(), networks = ?self.cache.names(), "network cache refreshed");
        Ok(())
    }

    /// Converges `container` toward exactly `desired` network membership.
    ///
    /// Unmoveable containers are skipped with a warning. Per-network
    /// failures are logged and absorbed; the call itself never fails.
    pub async fn move_container_to_networks(&mut self, container: &Container, desired: &[String]) {
        if !container.network_mode.is_moveable() {
            warn!(
                container = %container.name,
                mode = %container.network_mode,
                targets = ?desired,
                "container is not moveable; leaving networks untouched"
            );
            return;
        }

        let current = container.network_names();

        for target in desired {
            if !current.iter().any(|n| n == target) {
                self.connect(container, target).await;
            }
        }

        for existing in &current {
            if !desired.iter().any(|n| n == existing) {
                self.disconnect(container, existing).await;
            }
        }
    }

    /// Resets a container to its compose default network.
    ///
    /// Used by the stop-event path and the shutdown teardown pass.
    pub async fn reset_container(&mut self, container: &Container) {
        match policy::default_network(container, &self.cfg) {
            Some(default) => {
                self.move_container_to_networks(container, std::slice::from_ref(&default))
                    .await;
            }
            None => warn!(
                container = %container.name,
                "container has no compose project label; cannot reset to default network"
            ),
        }
    }

    /// Ensures the named network exists, creating it (managed, isolated)
    /// when absent. A cache hit or a lost create race both report
    /// [`EnsureOutcome::Existed`].
    pub async fn ensure_network(
        &mut self,
        name: &str,
        managed: bool,
    ) -> Result<EnsureOutcome, ClientError> {
        if self.cache.contains_name(name) {
            debug!(network = %name, "network already cached");
            return Ok(EnsureOutcome::Existed);
        }

        let spec = if managed {
            NetworkSpec::managed(name, &self.cfg.policy_label)
        } else {
            NetworkSpec {
                name: name.to_string(),
                driver: "bridge".to_string(),
                internal: true,
                labels: Default::default(),
            }
        };

        let outcome = self.runtime.create_network(&spec).await?;
        let existed = matches!(outcome, CreateOutcome::AlreadyExists(_));
        if existed {
            warn!(
                network = %name,
                "network create lost a benign race; another caller created it"
            );
        } else {
            info!(network = %name, managed, "network created");
        }
        self.cache.upsert(outcome.into_network());
        Ok(if existed {
            EnsureOutcome::Existed
        } else {
            EnsureOutcome::Created
        })
    }

    /// Removes the named network if it is known and empty.
    ///
    /// Returns `true` when the network was removed and evicted from the
    /// cache. Refusals (unknown network, non-empty member set) and runtime
    /// failures return `false` after logging.
    pub async fn remove_network(&mut self, name: &str) -> bool {
        let Some(network) = self.cache.find_by_name(name) else {
            warn!(network = %name, "refusing to remove unknown network");
            return false;
        };
        if !network.members.is_empty() {
            warn!(
                network = %name,
                members = network.members.len(),
                "refusing to remove non-empty network"
            );
            return false;
        }

        let id = network.id.clone();
        if let Err(e) = self.runtime.remove_network(&id).await {
            error!(network = %name, error = %e, "failed to remove network");
            return false;
        }
        self.cache.remove_by_id(&id);
        info!(network = %name, "network removed");
        true
    }

    /// Connects `container` to the named network, creating it if needed.
    async fn connect(&mut self, container: &Container, network_name: &str) {
        if let Err(e) = self.ensure_network(network_name, true).await {
            error!(
                network = %network_name,
                container = %container.name,
                error = %e,
                "failed to ensure network; skipping connect"
            );
            return;
        }

        let aliases: Vec<String> = policy::dns_alias(container, &self.cfg).into_iter().collect();
        match self
            .runtime
            .connect_endpoint(network_name, &container.id, &aliases)
            .await
        {
            Ok(()) => {
                self.cache.add_member(
                    network_name,
                    &container.id,
                    container.member_for(network_name),
                );
                info!(
                    container = %container.name,
                    network = %network_name,
                    aliases = ?aliases,
                    "container connected"
                );
            }
            Err(e) => error!(
                container = %container.name,
                network = %network_name,
                error = %e,
                "failed to connect container"
            ),
        }
    }

    /// Disconnects `container` from the named network and collects the
    /// network if that left it empty and managed.
    async fn disconnect(&mut self, container: &Container, network_name: &str) {
        if let Err(e) = self
            .runtime
            .disconnect_endpoint(network_name, &container.id)
            .await
        {
            error!(
                container = %container.name,
                network = %network_name,
                error = %e,
                "failed to disconnect container"
            );
            return;
        }

        let remaining = self.cache.remove_member(network_name, &container.id);
        info!(
            container = %container.name,
            network = %network_name,
            "container disconnected"
        );

        if remaining == Some(0) {
            let managed = self
                .cache
                .find_by_name(network_name)
                .map(|n| n.is_managed(&self.cfg.policy_label))
                .unwrap_or(false);
            if managed {
                info!(network = %network_name, "last member left managed network; collecting it");
                self.remove_network(network_name).await;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Network, NetworkMember, NetworkMode};
    use crate::runtime::{SimOp, SimRuntime};
    use std::collections::BTreeMap;

    fn selective_cfg() -> Config {
        Config {
            connect_all: false,
            ..Config::default()
        }
    }

    fn engine_with_sim(cfg: Config) -> (ConvergenceEngine, Arc<SimRuntime>) {
        let sim = Arc::new(SimRuntime::detached());
        let engine = ConvergenceEngine::new(sim.clone(), cfg);
        (engine, sim)
    }

    fn container(id: &str, networks: &[&str]) -> Container {
        let members: BTreeMap<String, NetworkMember> = networks
            .iter()
            .map(|n| (n.to_string(), NetworkMember::default()))
            .collect();
        Container {
            id: id.to_string(),
            name: format!("/{id}"),
            labels: [
                ("com.docker.compose.project".to_string(), "ix-myapp".to_string()),
                ("com.docker.compose.service".to_string(), "svc".to_string()),
            ]
            .into_iter()
            .collect(),
            network_mode: NetworkMode::Bridged("ix-myapp_default".to_string()),
            networks: members,
        }
    }

    fn managed_network(id: &str, name: &str, members: &[&str]) -> Network {
        Network {
            id: id.to_string(),
            name: name.to_string(),
            labels: [("netvisor.networks".to_string(), "true".to_string())]
                .into_iter()
                .collect(),
            members: members
                .iter()
                .map(|m| (m.to_string(), NetworkMember::default()))
                .collect(),
        }
    }

    #[tokio::test]
    async fn unmoveable_container_is_a_noop() {
        let (mut engine, sim) = engine_with_sim(selective_cfg());

        for mode in [
            NetworkMode::None,
            NetworkMode::Host,
            NetworkMode::Container("other".to_string()),
            NetworkMode::Service("db".to_string()),
        ] {
            let mut c = container("c1", &["old"]);
            c.network_mode = mode;
            engine
                .move_container_to_networks(&c, &["appnet".to_string()])
                .await;
        }

        assert!(sim.operations().is_empty());
    }

    #[tokio::test]
    async fn connect_creates_managed_network_and_publishes_alias() {
        let (mut engine, sim) = engine_with_sim(selective_cfg());
        let c = container("c1", &[]);

        engine
            .move_container_to_networks(&c, &["appnet".to_string()])
            .await;

        assert_eq!(
            sim.operations(),
            vec![
                SimOp::CreateNetwork("appnet".to_string()),
                SimOp::Connect {
                    network: "appnet".to_string(),
                    container: "c1".to_string(),
                    aliases: vec!["svc.ix-myapp.svc.cluster.local".to_string()],
                },
            ]
        );

        let cached = engine.cache().find_by_name("appnet").unwrap();
        assert!(cached.is_managed("netvisor.networks"));
        assert!(cached.members.contains_key("c1"));
    }

    #[tokio::test]
    async fn convergence_is_idempotent() {
        let (mut engine, sim) = engine_with_sim(selective_cfg());
        let desired = vec!["appnet".to_string()];

        engine
            .move_container_to_networks(&container("c1", &[]), &desired)
            .await;
        let ops_after_first = sim.operations().len();

        // Second call observes the membership the first one established.
        engine
            .move_container_to_networks(&container("c1", &["appnet"]), &desired)
            .await;

        assert_eq!(sim.operations().len(), ops_after_first);
    }

    #[tokio::test]
    async fn disconnecting_last_member_collects_managed_network() {
        let (mut engine, sim) = engine_with_sim(selective_cfg());
        sim.seed_network(managed_network("n1", "appnet", &["c1"]));
        engine.refresh_cache().await.unwrap();

        engine
            .move_container_to_networks(
                &container("c1", &["appnet"]),
                &["ix-myapp_default".to_string()],
            )
            .await;

        let ops = sim.operations();
        assert!(ops.contains(&SimOp::Disconnect {
            network: "appnet".to_string(),
            container: "c1".to_string(),
        }));
        assert!(ops.contains(&SimOp::RemoveNetwork("appnet".to_string())));
        assert!(engine.cache().find_by_name("appnet").is_none());
    }

    #[tokio::test]
    async fn unmanaged_network_is_left_in_place_when_emptied() {
        let (mut engine, sim) = engine_with_sim(selective_cfg());
        let mut unmanaged = managed_network("n1", "legacynet", &["c1"]);
        unmanaged.labels.clear();
        sim.seed_network(unmanaged);
        engine.refresh_cache().await.unwrap();

        engine
            .move_container_to_networks(
                &container("c1", &["legacynet"]),
                &["ix-myapp_default".to_string()],
            )
            .await;

        assert!(!sim
            .operations()
            .contains(&SimOp::RemoveNetwork("legacynet".to_string())));
        assert!(engine.cache().find_by_name("legacynet").is_some());
    }

    #[tokio::test]
    async fn network_still_in_use_is_not_collected() {
        let (mut engine, sim) = engine_with_sim(selective_cfg());
        sim.seed_network(managed_network("n1", "appnet", &["c1", "c2"]));
        engine.refresh_cache().await.unwrap();

        engine
            .move_container_to_networks(
                &container("c1", &["appnet"]),
                &["ix-myapp_default".to_string()],
            )
            .await;

        assert!(!sim
            .operations()
            .contains(&SimOp::RemoveNetwork("appnet".to_string())));
        let cached = engine.cache().find_by_name("appnet").unwrap();
        assert_eq!(cached.members.len(), 1);
    }

    #[tokio::test]
    async fn lost_create_race_is_treated_as_success() {
        let (mut engine, sim) = engine_with_sim(selective_cfg());
        // The runtime already has the network but the cache does not: the
        // same situation a losing racer sees after a 409.
        sim.seed_network(managed_network("n1", "appnet", &[]));

        let outcome = engine.ensure_network("appnet", true).await.unwrap();
        assert_eq!(outcome, EnsureOutcome::Existed);
        assert_eq!(engine.cache().len(), 1);
        assert_eq!(engine.cache().find_by_name("appnet").unwrap().id, "n1");
    }

    #[tokio::test]
    async fn ensure_network_hits_the_cache_first() {
        let (mut engine, sim) = engine_with_sim(selective_cfg());
        engine.ensure_network("appnet", true).await.unwrap();
        let ops_after_first = sim.operations().len();

        let outcome = engine.ensure_network("appnet", true).await.unwrap();
        assert_eq!(outcome, EnsureOutcome::Existed);
        assert_eq!(sim.operations().len(), ops_after_first);
    }

    #[tokio::test]
    async fn remove_network_refuses_unknown_and_non_empty() {
        let (mut engine, sim) = engine_with_sim(selective_cfg());
        assert!(!engine.remove_network("ghost").await);

        sim.seed_network(managed_network("n1", "appnet", &["c1"]));
        engine.refresh_cache().await.unwrap();
        assert!(!engine.remove_network("appnet").await);
        assert!(engine.cache().find_by_name("appnet").is_some());
        assert!(!sim
            .operations()
            .contains(&SimOp::RemoveNetwork("appnet".to_string())));
    }

    #[tokio::test]
    async fn reset_moves_container_to_its_compose_default() {
        let (mut engine, sim) = engine_with_sim(selective_cfg());
        sim.seed_network(managed_network("n1", "appnet", &["c1"]));
        engine.refresh_cache().await.unwrap();

        engine.reset_container(&container("c1", &["appnet"])).await;

        let ops = sim.operations();
        assert!(ops.iter().any(|op| matches!(
            op,
            SimOp::Connect { network, .. } if network == "ix-myapp_default"
        )));
        assert!(ops.contains(&SimOp::Disconnect {
            network: "appnet".to_string(),
            container: "c1".to_string(),
        }));
    }
}
