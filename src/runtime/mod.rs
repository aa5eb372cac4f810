//! # Runtime client adapter: the daemon's only view of the container runtime.
//!
//! [`RuntimeClient`] is the seam between the convergence engine and the
//! outside world. Two implementations exist:
//!
//! - [`DockerRuntime`] — live Docker Engine API via `bollard`;
//! - [`SimRuntime`] — mutations simulated against an in-memory network view
//!   (`DEBUG` mode and tests), reads and events optionally delegated to a
//!   live inner client.
//!
//! The engine never knows which implementation it is driving; the choice is
//! made once at startup.
//!
//! ## Rules
//! - A `409 Conflict` on network create is **not** an error: it means a
//!   parallel caller won a benign race and the network exists. It surfaces
//!   as [`CreateOutcome::AlreadyExists`] carrying the existing network.
//! - The event feed is filtered at the source to container `start`/`stop`.

use std::collections::HashMap;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::error::ClientError;
use crate::model::{Container, Network, NetworkSpec};

mod docker;
mod sim;

pub use docker::DockerRuntime;
pub use sim::{SimOp, SimRuntime};

/// Result of a network create call.
#[derive(Clone, Debug)]
pub enum CreateOutcome {
    /// The network was created by this call.
    Created(Network),
    /// Another caller created it first (409-equivalent); the network exists
    /// regardless of who won, so this is success.
    AlreadyExists(Network),
}

impl CreateOutcome {
    /// The network, whichever caller materialized it.
    pub fn network(&self) -> &Network {
        match self {
            CreateOutcome::Created(n) | CreateOutcome::AlreadyExists(n) => n,
        }
    }

    /// Consumes the outcome, yielding the network.
    pub fn into_network(self) -> Network {
        match self {
            CreateOutcome::Created(n) | CreateOutcome::AlreadyExists(n) => n,
        }
    }
}

/// Container lifecycle actions the daemon subscribes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EventAction {
    Start,
    Stop,
}

/// One container lifecycle event from the runtime feed.
#[derive(Clone, Debug)]
pub struct RuntimeEvent {
    pub action: EventAction,
    /// Id of the container the event concerns.
    pub container_id: String,
    /// Actor attributes as reported by the runtime (includes labels).
    pub attributes: HashMap<String, String>,
}

/// Stream of lifecycle events, already filtered to container start/stop.
pub type EventStream = BoxStream<'static, Result<RuntimeEvent, ClientError>>;

/// The container runtime surface the daemon consumes.
///
/// All calls are suspension points; see the crate-level concurrency notes.
#[async_trait]
pub trait RuntimeClient: Send + Sync {
    /// Lists all networks, including their connected-member sets.
    async fn list_networks(&self) -> Result<Vec<Network>, ClientError>;

    /// Inspects one network by id or name.
    async fn inspect_network(&self, id: &str) -> Result<Network, ClientError>;

    /// Creates a network. A duplicate-name conflict is reported as
    /// [`CreateOutcome::AlreadyExists`], not an error.
    async fn create_network(&self, spec: &NetworkSpec) -> Result<CreateOutcome, ClientError>;

    /// Removes a network by id.
    async fn remove_network(&self, id: &str) -> Result<(), ClientError>;

    /// Lists running containers carrying the given label key.
    async fn list_containers(&self, label: &str) -> Result<Vec<Container>, ClientError>;

    /// Inspects one container by id.
    async fn inspect_container(&self, id: &str) -> Result<Container, ClientError>;

    /// Connects a container endpoint to a network, publishing DNS aliases.
    async fn connect_endpoint(
        &self,
        network_name: &str,
        container_id: &str,
        aliases: &[String],
    ) -> Result<(), ClientError>;

    /// Disconnects a container endpoint from a network.
    async fn disconnect_endpoint(
        &self,
        network_name: &str,
        container_id: &str,
    ) -> Result<(), ClientError>;

    /// Subscribes to the filtered container start/stop event feed.
    async fn events(&self) -> Result<EventStream, ClientError>;
}
