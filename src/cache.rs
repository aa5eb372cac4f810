//! # State cache: the in-process mirror of runtime network state.
//!
//! [`NetworkCache`] holds the subset of network state the convergence engine
//! needs: id, name, labels, and the connected-member set per network. It is
//! the only shared mutable resource in the daemon.
//!
//! ## Rules
//! - `refresh()` replaces the full set from a runtime listing; used at
//!   process start and before bulk reconciliation.
//! - Lookups return an absent result, never an error.
//! - `upsert()` keys on **name**: a create assigns a fresh id, so the stale
//!   entry (if any) must be found by name and replaced. Duplicate names are
//!   never introduced.
//! - `remove_by_id()` is a no-op when the id is absent.
//!
//! ## Concurrency
//! Mutated only by the convergence engine on the single logical thread.
//! Mutations are not atomic across `await` suspension points, so the cache
//! is not safe to share across threads without an added lock.

use crate::model::{Network, NetworkMember};

/// In-process mirror of the runtime's network listing.
#[derive(Debug, Default)]
pub struct NetworkCache {
    networks: Vec<Network>,
}

impl NetworkCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Replaces the full network set with a fresh runtime listing.
    pub fn refresh(&mut self, networks: Vec<Network>) {
        self.networks = networks;
    }

    /// Looks a network up by name.
    pub fn find_by_name(&self, name: &str) -> Option<&Network> {
        self.networks.iter().find(|n| n.name == name)
    }

    /// Looks a network up by id.
    pub fn find_by_id(&self, id: &str) -> Option<&Network> {
        self.networks.iter().find(|n| n.id == id)
    }

    /// True if a network with this name is cached.
    pub fn contains_name(&self, name: &str) -> bool {
        self.find_by_name(name).is_some()
    }

    /// Inserts a network, replacing any existing entry with the same name.
    pub fn upsert(&mut self, network: Network) {
        self.networks.retain(|n| n.name != network.name);
        self.networks.push(network);
    }

    /// Removes the network with the given id, if present.
    pub fn remove_by_id(&mut self, id: &str) {
        self.networks.retain(|n| n.id != id);
    }

    /// Records a container as a member of the named network.
    ///
    /// Returns `false` when the network is not cached.
    pub fn add_member(&mut self, network_name: &str, container_id: &str, member: NetworkMember) -> bool {
        match self.networks.iter_mut().find(|n| n.name == network_name) {
            Some(network) => {
                network.members.insert(container_id.to_string(), member);
                true
            }
            None => false,
        }
    }

    /// Drops a container from the named network's member set.
    ///
    /// Returns the remaining member count, or `None` when the network is not
    /// cached. A zero return is the garbage-collection trigger for managed
    /// networks.
    pub fn remove_member(&mut self, network_name: &str, container_id: &str) -> Option<usize> {
        let network = self.networks.iter_mut().find(|n| n.name == network_name)?;
        network.members.remove(container_id);
        Some(network.members.len())
    }

    /// Number of cached networks.
    pub fn len(&self) -> usize {
        self.networks.len()
    }

    /// True when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.networks.is_empty()
    }

    /// Cached network names, in insertion order. Used for startup logging.
    pub fn names(&self) -> Vec<&str> {
        self.networks.iter().map(|n| n.name.as_str()).collect()
    }
}
