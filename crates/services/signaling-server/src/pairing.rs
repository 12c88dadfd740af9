//! Pairing tracker
//!
//! Symmetric peer mapping for endpoints exchanging negotiation messages.
//! Each undirected pairing is stored as two directed entries so either side
//! resolves its peer in O(1). An endpoint has at most one pairing; linking it
//! again replaces the old one. Multi-viewer fan-out from a single phone is not
//! supported by this model.

use std::collections::{HashMap, HashSet};

use crate::protocol::EndpointId;

/// An undirected pairing between two endpoints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pairing {
    pub a: EndpointId,
    pub b: EndpointId,
}

#[derive(Debug, Default)]
pub struct PairingTracker {
    peers: HashMap<EndpointId, EndpointId>,
}

impl PairingTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pair `a` with `b`, dropping any pairing either side had before.
    ///
    /// Returns the pairings that were replaced. Re-linking an existing pair
    /// replaces nothing. Self-links are ignored.
    pub fn link(&mut self, a: &str, b: &str) -> Vec<Pairing> {
        if a == b {
            return Vec::new();
        }
        if self.peer_of(a) == Some(b) {
            return Vec::new();
        }

        let mut replaced = Vec::new();
        for id in [a, b] {
            if let Some(old_peer) = self.unlink(id) {
                replaced.push(Pairing {
                    a: id.to_string(),
                    b: old_peer,
                });
            }
        }

        self.peers.insert(a.to_string(), b.to_string());
        self.peers.insert(b.to_string(), a.to_string());
        replaced
    }

    pub fn peer_of(&self, id: &str) -> Option<&str> {
        self.peers.get(id).map(String::as_str)
    }

    /// Remove `id`'s pairing in both directions, returning the former peer
    pub fn unlink(&mut self, id: &str) -> Option<EndpointId> {
        let peer = self.peers.remove(id)?;
        if self.peers.get(&peer).map(String::as_str) == Some(id) {
            self.peers.remove(&peer);
        }
        Some(peer)
    }

    /// Drop every pairing with an endpoint outside `alive`
    pub fn prune_dangling(&mut self, alive: &HashSet<EndpointId>) -> Vec<Pairing> {
        let dangling: Vec<EndpointId> = self
            .peers
            .iter()
            .filter(|(id, peer)| !alive.contains(*id) || !alive.contains(*peer))
            .map(|(id, _)| id.clone())
            .collect();

        let mut pruned = Vec::new();
        for id in dangling {
            if let Some(peer) = self.unlink(&id) {
                pruned.push(Pairing { a: id, b: peer });
            }
        }
        pruned
    }

    /// Number of undirected pairings
    pub fn pair_count(&self) -> usize {
        self.peers.len() / 2
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}
