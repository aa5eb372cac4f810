//! Simulated implementation of [`RuntimeClient`].
//!
//! Backs `DEBUG` mode: every mutating call (create/remove/connect/disconnect)
//! is recorded and logged against an in-memory network view instead of being
//! issued, while reads and the event feed are delegated to an optional live
//! inner client. The convergence engine drives it exactly as it would the
//! live adapter.
//!
//! Detached (no inner client) it doubles as the crate's test double: tests
//! seed networks and containers up front and assert on the recorded
//! operation log afterwards.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use async_trait::async_trait;
use futures::StreamExt;
use rand::Rng;
use tracing::{debug, info};

use crate::error::ClientError;
use crate::model::{Container, Network, NetworkSpec};
use crate::runtime::{CreateOutcome, EventStream, RuntimeClient};

/// One recorded mutating operation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SimOp {
    CreateNetwork(String),
    RemoveNetwork(String),
    Connect {
        network: String,
        container: String,
        aliases: Vec<String>,
    },
    Disconnect {
        network: String,
        container: String,
    },
}

#[derive(Default)]
struct SimState {
    networks: Vec<Network>,
    containers: Vec<Container>,
    ops: Vec<SimOp>,
}

/// Runtime client that simulates all mutations.
pub struct SimRuntime {
    inner: Option<Arc<dyn RuntimeClient>>,
    state: Mutex<SimState>,
}

impl SimRuntime {
    /// Fully in-memory instance; reads see only seeded state and the event
    /// feed never yields. This is the test-double configuration.
    pub fn detached() -> Self {
        Self {
            inner: None,
            state: Mutex::new(SimState::default()),
        }
    }

    /// Simulates mutations while delegating reads and the event feed to a
    /// live client. This is the `DEBUG` configuration: the daemon observes
    /// the real runtime but never changes it.
    pub fn over(inner: Arc<dyn RuntimeClient>) -> Self {
        Self {
            inner: Some(inner),
            state: Mutex::new(SimState::default()),
        }
    }

    /// Seeds a pre-existing network into the simulated view.
    pub fn seed_network(&self, network: Network) {
        self.state().networks.push(network);
    }

    /// Seeds a container into the simulated view.
    pub fn seed_container(&self, container: Container) {
        self.state().containers.push(container);
    }

    /// Snapshot of all mutating operations recorded so far.
    pub fn operations(&self) -> Vec<SimOp> {
        self.state().ops.clone()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Synthetic 64-hex-char network id, shaped like a runtime-assigned one.
fn synthetic_id() -> String {
    let mut rng = rand::thread_rng();
    format!("{:032x}{:032x}", rng.gen::<u128>(), rng.gen::<u128>())
}

#[async_trait]
impl RuntimeClient for SimRuntime {
    async fn list_networks(&self) -> Result<Vec<Network>, ClientError> {
        let mut networks = match &self.inner {
            Some(inner) => inner.list_networks().await?,
            None => Vec::new(),
        };
        let simulated = self.state().networks.clone();
        for network in simulated {
            if !networks.iter().any(|n| n.name == network.name) {
                networks.push(network);
            }
        }
        Ok(networks)
    }

    async fn inspect_network(&self, id: &str) -> Result<Network, ClientError> {
        let local = self
            .state()
            .networks
            .iter()
            .find(|n| n.id == id || n.name == id)
            .cloned();
        if let Some(network) = local {
            return Ok(network);
        }
        match &self.inner {
            Some(inner) => inner.inspect_network(id).await,
            None => Err(ClientError::NetworkNotFound(id.to_string())),
        }
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<CreateOutcome, ClientError> {
        let mut state = self.state();
        state.ops.push(SimOp::CreateNetwork(spec.name.clone()));

        if let Some(existing) = state.networks.iter().find(|n| n.name == spec.name) {
            debug!(network = %spec.name, "simulated create: network already exists");
            return Ok(CreateOutcome::AlreadyExists(existing.clone()));
        }

        let network = Network {
            id: synthetic_id(),
            name: spec.name.clone(),
            labels: spec.labels.clone(),
            members: Default::default(),
        };
        state.networks.push(network.clone());
        info!(network = %spec.name, "simulated network create");
        Ok(CreateOutcome::Created(network))
    }

    async fn remove_network(&self, id: &str) -> Result<(), ClientError> {
        let mut state = self.state();
        let name = state
            .networks
            .iter()
            .find(|n| n.id == id)
            .map(|n| n.name.clone())
            .unwrap_or_else(|| id.to_string());
        state.networks.retain(|n| n.id != id);
        state.ops.push(SimOp::RemoveNetwork(name.clone()));
        info!(network = %name, "simulated network remove");
        Ok(())
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<Container>, ClientError> {
        match &self.inner {
            Some(inner) => inner.list_containers(label).await,
            None => Ok(self
                .state()
                .containers
                .iter()
                .filter(|c| c.labels.contains_key(label))
                .cloned()
                .collect()),
        }
    }

    async fn inspect_container(&self, id: &str) -> Result<Container, ClientError> {
        let local = self
            .state()
            .containers
            .iter()
            .find(|c| c.id == id)
            .cloned();
        if let Some(container) = local {
            return Ok(container);
        }
        match &self.inner {
            Some(inner) => inner.inspect_container(id).await,
            None => Err(ClientError::ContainerNotFound(id.to_string())),
        }
    }

    async fn connect_endpoint(
        &self,
        network_name: &str,
        container_id: &str,
        aliases: &[String],
    ) -> Result<(), ClientError> {
        self.state().ops.push(SimOp::Connect {
            network: network_name.to_string(),
            container: container_id.to_string(),
            aliases: aliases.to_vec(),
        });
        info!(network = %network_name, container = %container_id, "simulated connect");
        Ok(())
    }

    async fn disconnect_endpoint(
        &self,
        network_name: &str,
        container_id: &str,
    ) -> Result<(), ClientError> {
        self.state().ops.push(SimOp::Disconnect {
            network: network_name.to_string(),
            container: container_id.to_string(),
        });
        info!(network = %network_name, container = %container_id, "simulated disconnect");
        Ok(())
    }

    async fn events(&self) -> Result<EventStream, ClientError> {
        match &self.inner {
            Some(inner) => inner.events().await,
            None => Ok(futures::stream::pending().boxed()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn spec(name: &str) -> NetworkSpec {
        NetworkSpec::managed(name, "netvisor.networks")
    }

    #[tokio::test]
    async fn create_is_recorded_and_idempotent_on_name() {
        let sim = SimRuntime::detached();

        let first = sim.create_network(&spec("appnet")).await.unwrap();
        let second = sim.create_network(&spec("appnet")).await.unwrap();

        assert!(matches!(first, CreateOutcome::Created(_)));
        let CreateOutcome::AlreadyExists(existing) = second else {
            panic!("duplicate create must report AlreadyExists");
        };
        assert_eq!(existing.name, "appnet");
        assert_eq!(first.network().id, existing.id);

        let networks = sim.list_networks().await.unwrap();
        assert_eq!(networks.len(), 1);
    }

    #[tokio::test]
    async fn remove_drops_the_simulated_network() {
        let sim = SimRuntime::detached();
        let created = sim.create_network(&spec("appnet")).await.unwrap();
        sim.remove_network(&created.network().id).await.unwrap();

        assert!(sim.list_networks().await.unwrap().is_empty());
        assert_eq!(
            sim.operations(),
            vec![
                SimOp::CreateNetwork("appnet".to_string()),
                SimOp::RemoveNetwork("appnet".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn detached_reads_surface_not_found() {
        let sim = SimRuntime::detached();
        assert!(matches!(
            sim.inspect_container("ghost").await,
            Err(ClientError::ContainerNotFound(_))
        ));
        assert!(matches!(
            sim.inspect_network("ghost").await,
            Err(ClientError::NetworkNotFound(_))
        ));
    }
}
