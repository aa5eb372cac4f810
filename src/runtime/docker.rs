//! Live Docker Engine implementation of [`RuntimeClient`].
//!
//! Thin mapping layer over `bollard`: list/inspect payloads are converted to
//! the crate's model types, the event feed is filtered server-side to
//! container `start`/`stop`, and a `409 Conflict` on network create is
//! folded into [`CreateOutcome::AlreadyExists`].

use std::collections::HashMap;

use async_trait::async_trait;
use bollard::container::ListContainersOptions;
use bollard::errors::Error as BollardError;
use bollard::models::{
    ContainerInspectResponse, ContainerSummary, EndpointSettings, EventMessage,
};
use bollard::network::{
    ConnectNetworkOptions, CreateNetworkOptions, DisconnectNetworkOptions, InspectNetworkOptions,
    ListNetworksOptions,
};
use bollard::system::EventsOptions;
use bollard::Docker;
use futures::StreamExt;
use tracing::warn;

use crate::error::ClientError;
use crate::model::{Container, Network, NetworkMember, NetworkMode, NetworkSpec};
use crate::runtime::{CreateOutcome, EventAction, EventStream, RuntimeClient, RuntimeEvent};

/// Live runtime client backed by the local Docker Engine socket.
#[derive(Clone)]
pub struct DockerRuntime {
    docker: Docker,
}

impl DockerRuntime {
    /// Connects using the platform's local defaults (unix socket or pipe).
    pub fn connect() -> Result<Self, ClientError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self { docker })
    }
}

#[async_trait]
impl RuntimeClient for DockerRuntime {
    async fn list_networks(&self) -> Result<Vec<Network>, ClientError> {
        let summaries = self
            .docker
            .list_networks(None::<ListNetworksOptions<String>>)
            .await?;

        // The list endpoint omits the connected-member sets; inspect each
        // network to fill them in. Networks that vanish mid-listing are a
        // benign race and are skipped.
        let mut networks = Vec::with_capacity(summaries.len());
        for summary in summaries {
            let Some(id) = summary.id else { continue };
            match self.inspect_network(&id).await {
                Ok(network) => networks.push(network),
                Err(e) => warn!(network = %id, error = %e, "skipping network that failed inspect"),
            }
        }
        Ok(networks)
    }

    async fn inspect_network(&self, id: &str) -> Result<Network, ClientError> {
        let inspected = self
            .docker
            .inspect_network(
                id,
                Some(InspectNetworkOptions::<String> {
                    verbose: false,
                    ..Default::default()
                }),
            )
            .await?;
        network_from_bollard(inspected)
    }

    async fn create_network(&self, spec: &NetworkSpec) -> Result<CreateOutcome, ClientError> {
        let options = CreateNetworkOptions {
            name: spec.name.clone(),
            driver: spec.driver.clone(),
            internal: spec.internal,
            check_duplicate: true,
            labels: spec.labels.clone(),
            ..Default::default()
        };

        match self.docker.create_network(options).await {
            Ok(_) => {
                let network = self.inspect_network(&spec.name).await?;
                Ok(CreateOutcome::Created(network))
            }
            // Two containers of the same project starting in parallel both
            // attempt the create; whichever lost the race finds the network
            // in place, which is all that matters.
            Err(BollardError::DockerResponseServerError {
                status_code: 409, ..
            }) => {
                let network = self.inspect_network(&spec.name).await?;
                Ok(CreateOutcome::AlreadyExists(network))
            }
            Err(e) => Err(ClientError::Api(e)),
        }
    }

    async fn remove_network(&self, id: &str) -> Result<(), ClientError> {
        self.docker.remove_network(id).await?;
        Ok(())
    }

    async fn list_containers(&self, label: &str) -> Result<Vec<Container>, ClientError> {
        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec![label.to_string()]);

        let summaries = self
            .docker
            .list_containers(Some(ListContainersOptions {
                filters,
                ..Default::default()
            }))
            .await?;

        let mut containers = Vec::with_capacity(summaries.len());
        for summary in summaries {
            match container_from_summary(summary) {
                Ok(container) => containers.push(container),
                Err(e) => warn!(error = %e, "skipping malformed container summary"),
            }
        }
        Ok(containers)
    }

    async fn inspect_container(&self, id: &str) -> Result<Container, ClientError> {
        let inspected = self.docker.inspect_container(id, None).await?;
        container_from_inspect(inspected)
    }

    async fn connect_endpoint(
        &self,
        network_name: &str,
        container_id: &str,
        aliases: &[String],
    ) -> Result<(), ClientError> {
        let endpoint_config = EndpointSettings {
            aliases: if aliases.is_empty() {
                None
            } else {
                Some(aliases.to_vec())
            },
            ..Default::default()
        };
        self.docker
            .connect_network(
                network_name,
                ConnectNetworkOptions {
                    container: container_id.to_string(),
                    endpoint_config,
                },
            )
            .await?;
        Ok(())
    }

    async fn disconnect_endpoint(
        &self,
        network_name: &str,
        container_id: &str,
    ) -> Result<(), ClientError> {
        self.docker
            .disconnect_network(
                network_name,
                DisconnectNetworkOptions {
                    container: container_id.to_string(),
                    force: false,
                },
            )
            .await?;
        Ok(())
    }

    async fn events(&self) -> Result<EventStream, ClientError> {
        let mut filters = HashMap::new();
        filters.insert("type".to_string(), vec!["container".to_string()]);
        filters.insert(
            "event".to_string(),
            vec!["start".to_string(), "stop".to_string()],
        );

        let stream = self
            .docker
            .events(Some(EventsOptions {
                filters,
                ..Default::default()
            }))
            .filter_map(|item| async move {
                match item {
                    Ok(message) => runtime_event(message).map(Ok),
                    Err(e) => Some(Err(ClientError::Api(e))),
                }
            })
            .boxed();
        Ok(stream)
    }
}

/// Maps a raw event message to a [`RuntimeEvent`], dropping anything that is
/// not a well-formed container start/stop.
fn runtime_event(message: EventMessage) -> Option<RuntimeEvent> {
    let action = match message.action.as_deref() {
        Some("start") => EventAction::Start,
        Some("stop") => EventAction::Stop,
        _ => return None,
    };
    let actor = message.actor?;
    Some(RuntimeEvent {
        action,
        container_id: actor.id?,
        attributes: actor.attributes.unwrap_or_default(),
    })
}

fn network_from_bollard(network: bollard::models::Network) -> Result<Network, ClientError> {
    let id = network
        .id
        .ok_or_else(|| ClientError::Malformed("network without id".to_string()))?;
    let name = network
        .name
        .ok_or_else(|| ClientError::Malformed(format!("network {id} without name")))?;

    let members = network
        .containers
        .unwrap_or_default()
        .into_iter()
        .map(|(container_id, c)| {
            (
                container_id,
                NetworkMember {
                    name: c.name.unwrap_or_default(),
                    endpoint_id: c.endpoint_id.unwrap_or_default(),
                    mac_address: c.mac_address.unwrap_or_default(),
                    ipv4_address: c.ipv4_address.unwrap_or_default(),
                    ipv6_address: c.ipv6_address.unwrap_or_default(),
                },
            )
        })
        .collect();

    Ok(Network {
        id,
        name,
        labels: network.labels.unwrap_or_default(),
        members,
    })
}

fn member_from_endpoint(container_name: &str, endpoint: &EndpointSettings) -> NetworkMember {
    NetworkMember {
        name: container_name.to_string(),
        endpoint_id: endpoint.endpoint_id.clone().unwrap_or_default(),
        mac_address: endpoint.mac_address.clone().unwrap_or_default(),
        ipv4_address: cidr(endpoint.ip_address.as_deref(), endpoint.ip_prefix_len),
        ipv6_address: cidr(
            endpoint.global_ipv6_address.as_deref(),
            endpoint.global_ipv6_prefix_len,
        ),
    }
}

fn cidr(address: Option<&str>, prefix_len: Option<i64>) -> String {
    match address {
        Some(addr) if !addr.is_empty() => {
            format!("{addr}/{}", prefix_len.unwrap_or_default())
        }
        _ => String::new(),
    }
}

fn container_from_summary(summary: ContainerSummary) -> Result<Container, ClientError> {
    let id = summary
        .id
        .ok_or_else(|| ClientError::Malformed("container summary without id".to_string()))?;
    let name = summary.names.unwrap_or_default().join(",");
    let network_mode = NetworkMode::parse(
        summary
            .host_config
            .as_ref()
            .and_then(|hc| hc.network_mode.as_deref()),
    );
    let networks = summary
        .network_settings
        .and_then(|ns| ns.networks)
        .unwrap_or_default()
        .into_iter()
        .map(|(network_name, endpoint)| {
            let member = member_from_endpoint(&name, &endpoint);
            (network_name, member)
        })
        .collect();

    Ok(Container {
        id,
        name,
        labels: summary.labels.unwrap_or_default(),
        network_mode,
        networks,
    })
}

fn container_from_inspect(inspected: ContainerInspectResponse) -> Result<Container, ClientError> {
    let id = inspected
        .id
        .ok_or_else(|| ClientError::Malformed("container inspect without id".to_string()))?;
    let name = inspected.name.unwrap_or_default();
    let network_mode = NetworkMode::parse(
        inspected
            .host_config
            .as_ref()
            .and_then(|hc| hc.network_mode.as_deref()),
    );
    let networks = inspected
        .network_settings
        .and_then(|ns| ns.networks)
        .unwrap_or_default()
        .into_iter()
        .map(|(network_name, endpoint)| {
            let member = member_from_endpoint(&name, &endpoint);
            (network_name, member)
        })
        .collect();

    Ok(Container {
        id,
        name,
        labels: inspected
            .config
            .and_then(|c| c.labels)
            .unwrap_or_default(),
        network_mode,
        networks,
    })
}
