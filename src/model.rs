//! # Data model: networks, containers, and network modes.
//!
//! These are the in-process shapes the engine works with. Containers are
//! never cached — they are rebuilt from a fresh runtime inspect on every
//! reconciliation trigger. Networks live in the
//! [`NetworkCache`](crate::cache::NetworkCache) and carry the member
//! bookkeeping the garbage collector relies on.

use std::collections::{BTreeMap, HashMap};
use std::fmt;

/// Endpoint attributes of one container attached to a network.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NetworkMember {
    /// Container display name.
    pub name: String,
    /// Runtime-assigned endpoint id (may be empty right after connect).
    pub endpoint_id: String,
    /// Endpoint MAC address.
    pub mac_address: String,
    /// IPv4 address in CIDR form (`addr/prefix`), empty if unknown.
    pub ipv4_address: String,
    /// IPv6 address in CIDR form (`addr/prefix`), empty if unknown.
    pub ipv6_address: String,
}

/// A virtual network as mirrored by the state cache.
///
/// `name` is unique across the live set; `id` is the key used for removal.
#[derive(Clone, Debug, Default)]
pub struct Network {
    /// Stable runtime-assigned id.
    pub id: String,
    /// Network name, unique among active networks.
    pub name: String,
    /// Network labels.
    pub labels: HashMap<String, String>,
    /// Connected containers, keyed by container id.
    pub members: BTreeMap<String, NetworkMember>,
}

impl Network {
    /// True if this network was created by the daemon and is therefore
    /// eligible for garbage collection once its member set empties.
    ///
    /// The marker is the policy label key with the literal value `"true"`.
    pub fn is_managed(&self, marker_label: &str) -> bool {
        self.labels.get(marker_label).map(String::as_str) == Some("true")
    }
}

/// Creation parameters for a network the daemon is about to materialize.
///
/// Managed networks are created with an isolated (non-default-route) profile
/// and tagged with the ownership marker so they can be collected later.
#[derive(Clone, Debug)]
pub struct NetworkSpec {
    pub name: String,
    pub driver: String,
    pub internal: bool,
    pub labels: HashMap<String, String>,
}

impl NetworkSpec {
    /// Builds the spec for a network owned by the daemon.
    pub fn managed(name: impl Into<String>, marker_label: &str) -> Self {
        let mut labels = HashMap::new();
        labels.insert(marker_label.to_string(), "true".to_string());
        Self {
            name: name.into(),
            driver: "bridge".to_string(),
            internal: true,
            labels,
        }
    }
}

/// The network mode a container was started with.
///
/// Only [`NetworkMode::Bridged`] containers are moveable; the other modes
/// either have no endpoints of their own or borrow another stack.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NetworkMode {
    /// No networking (`none`).
    None,
    /// Host networking (`host`).
    Host,
    /// Shares another container's network stack (`container:<id>`).
    Container(String),
    /// Shares a service's network stack (`service:<name>`).
    Service(String),
    /// A regular attachable mode (named network, `bridge`, `default`, ...).
    Bridged(String),
    /// The runtime did not report a mode.
    Unknown,
}

impl NetworkMode {
    /// Parses the runtime-reported `NetworkMode` string.
    pub fn parse(raw: Option<&str>) -> Self {
        match raw {
            Option::None => NetworkMode::Unknown,
            Some("none") => NetworkMode::None,
            Some("host") => NetworkMode::Host,
            Some(s) => {
                if let Some(id) = s.strip_prefix("container:") {
                    NetworkMode::Container(id.to_string())
                } else if let Some(name) = s.strip_prefix("service:") {
                    NetworkMode::Service(name.to_string())
                } else {
                    NetworkMode::Bridged(s.to_string())
                }
            }
        }
    }

    /// Whether the daemon may change this container's network membership.
    pub fn is_moveable(&self) -> bool {
        matches!(self, NetworkMode::Bridged(_))
    }
}

impl Default for NetworkMode {
    fn default() -> Self {
        NetworkMode::Unknown
    }
}

impl fmt::Display for NetworkMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NetworkMode::None => write!(f, "none"),
            NetworkMode::Host => write!(f, "host"),
            NetworkMode::Container(id) => write!(f, "container:{id}"),
            NetworkMode::Service(name) => write!(f, "service:{name}"),
            NetworkMode::Bridged(name) => write!(f, "{name}"),
            NetworkMode::Unknown => write!(f, "<unknown>"),
        }
    }
}

/// A runtime container, rebuilt fresh from list/inspect on every trigger.
#[derive(Clone, Debug, Default)]
pub struct Container {
    /// Stable runtime-assigned id.
    pub id: String,
    /// Display name.
    pub name: String,
    /// Container labels.
    pub labels: HashMap<String, String>,
    /// Network mode reported by the runtime.
    pub network_mode: NetworkMode,
    /// Networks the container is currently attached to, keyed by name.
    pub networks: BTreeMap<String, NetworkMember>,
}

impl Container {
    /// Names of the networks the container is currently attached to.
    pub fn network_names(&self) -> Vec<String> {
        self.networks.keys().cloned().collect()
    }

    /// Member record to store in the cache for the named network.
    ///
    /// If the container does not report endpoint attributes for the network
    /// yet (it was just connected), the record carries only the name.
    pub fn member_for(&self, network_name: &str) -> NetworkMember {
        let mut member = self
            .networks
            .get(network_name)
            .cloned()
            .unwrap_or_default();
        member.name = self.name.clone();
        member
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_unmoveable_modes() {
        assert_eq!(NetworkMode::parse(Some("none")), NetworkMode::None);
        assert_eq!(NetworkMode::parse(Some("host")), NetworkMode::Host);
        assert_eq!(
            NetworkMode::parse(Some("container:abc123")),
            NetworkMode::Container("abc123".to_string())
        );
        assert_eq!(
            NetworkMode::parse(Some("service:db")),
            NetworkMode::Service("db".to_string())
        );
        assert_eq!(NetworkMode::parse(None), NetworkMode::Unknown);

        for mode in [
            NetworkMode::None,
            NetworkMode::Host,
            NetworkMode::Container("abc123".to_string()),
            NetworkMode::Service("db".to_string()),
            NetworkMode::Unknown,
        ] {
            assert!(!mode.is_moveable(), "{mode} must not be moveable");
        }
    }

    #[test]
    fn bridged_modes_are_moveable() {
        assert!(NetworkMode::parse(Some("bridge")).is_moveable());
        assert!(NetworkMode::parse(Some("ix-myapp_default")).is_moveable());
    }

    #[test]
    fn managed_marker_requires_literal_true() {
        let mut network = Network {
            id: "n1".to_string(),
            name: "appnet".to_string(),
            ..Network::default()
        };
        assert!(!network.is_managed("netvisor.networks"));

        network
            .labels
            .insert("netvisor.networks".to_string(), "yes".to_string());
        assert!(!network.is_managed("netvisor.networks"));

        network
            .labels
            .insert("netvisor.networks".to_string(), "true".to_string());
        assert!(network.is_managed("netvisor.networks"));
    }

    #[test]
    fn member_for_unknown_network_carries_only_the_name() {
        let container = Container {
            id: "c1".to_string(),
            name: "web".to_string(),
            ..Container::default()
        };
        let member = container.member_for("appnet");
        assert_eq!(member.name, "web");
        assert!(member.endpoint_id.is_empty());
        assert!(member.ipv4_address.is_empty());
    }
}
