//! Connection registry
//!
//! Holds every connected endpoint with its declared role, metadata and
//! activity timestamps. Pure in-memory state; synchronization is the
//! caller's job (see [`crate::coordinator`]).

use chrono::{DateTime, Utc};
use serde_json::Value;
use std::collections::HashMap;

use crate::protocol::{EndpointId, PeerSummary, Role};

/// One connected endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Endpoint {
    pub id: EndpointId,
    pub role: Role,
    pub metadata: Value,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
    /// Monotonic connect order, breaks ties between equal `connected_at`
    seq: u64,
}

impl Endpoint {
    pub fn summary(&self) -> PeerSummary {
        PeerSummary {
            id: self.id.clone(),
            metadata: self.metadata.clone(),
        }
    }
}

/// Endpoint counts per role
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize)]
pub struct RoleCounts {
    pub unknown: usize,
    pub phone: usize,
    pub viewer: usize,
}

#[derive(Debug, Default)]
pub struct ConnectionRegistry {
    endpoints: HashMap<EndpointId, Endpoint>,
    next_seq: u64,
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a freshly connected endpoint with an `unknown` role
    pub fn connect(&mut self, id: EndpointId) {
        self.upsert(id, Role::Unknown, Value::Null);
    }

    /// Store or overwrite an entry. An existing entry keeps its connect time.
    pub fn upsert(&mut self, id: EndpointId, role: Role, metadata: Value) {
        let now = Utc::now();
        if let Some(endpoint) = self.endpoints.get_mut(&id) {
            endpoint.role = role;
            endpoint.metadata = metadata;
            endpoint.last_activity = now;
            return;
        }

        let seq = self.next_seq;
        self.next_seq += 1;
        self.endpoints.insert(
            id.clone(),
            Endpoint {
                id,
                role,
                metadata,
                connected_at: now,
                last_activity: now,
                seq,
            },
        );
    }

    pub fn get(&self, id: &str) -> Option<&Endpoint> {
        self.endpoints.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.endpoints.contains_key(id)
    }

    /// Remove an entry, returning it if it was present
    pub fn remove(&mut self, id: &str) -> Option<Endpoint> {
        self.endpoints.remove(id)
    }

    /// Entries with `role`, oldest connection first
    pub fn list_by_role(&self, role: Role) -> Vec<&Endpoint> {
        let mut matching: Vec<&Endpoint> =
            self.endpoints.values().filter(|e| e.role == role).collect();
        matching.sort_by(|a, b| {
            a.connected_at
                .cmp(&b.connected_at)
                .then_with(|| a.seq.cmp(&b.seq))
        });
        matching
    }

    /// Ids with `role`, oldest connection first
    pub fn ids_by_role(&self, role: Role) -> Vec<EndpointId> {
        self.list_by_role(role)
            .into_iter()
            .map(|e| e.id.clone())
            .collect()
    }

    /// Mark activity; returns false if the endpoint is unknown
    pub fn touch(&mut self, id: &str) -> bool {
        self.touch_at(id, Utc::now())
    }

    pub fn touch_at(&mut self, id: &str, at: DateTime<Utc>) -> bool {
        match self.endpoints.get_mut(id) {
            Some(endpoint) => {
                endpoint.last_activity = at;
                true
            }
            None => false,
        }
    }

    /// Ids whose last activity is strictly older than `cutoff`
    pub fn stale_since(&self, cutoff: DateTime<Utc>) -> Vec<EndpointId> {
        self.endpoints
            .values()
            .filter(|e| e.last_activity < cutoff)
            .map(|e| e.id.clone())
            .collect()
    }

    pub fn ids(&self) -> impl Iterator<Item = &EndpointId> {
        self.endpoints.keys()
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    pub fn count_by_role(&self) -> RoleCounts {
        let mut counts = RoleCounts::default();
        for endpoint in self.endpoints.values() {
            match endpoint.role {
                Role::Unknown => counts.unknown += 1,
                Role::Phone => counts.phone += 1,
                Role::Viewer => counts.viewer += 1,
            }
        }
        counts
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_connect_starts_unknown() {
        let mut registry = ConnectionRegistry::new();
        registry.connect("a".to_string());

        let endpoint = registry.get("a").unwrap();
        assert_eq!(endpoint.role, Role::Unknown);
        assert_eq!(endpoint.metadata, Value::Null);
        assert_eq!(registry.count_by_role().unknown, 1);
    }

    #[test]
    fn test_upsert_overwrites_without_duplicating() {
        let mut registry = ConnectionRegistry::new();
        registry.connect("a".to_string());
        let connected_at = registry.get("a").unwrap().connected_at;

        registry.upsert("a".to_string(), Role::Phone, json!({"device": "old"}));
        registry.upsert("a".to_string(), Role::Phone, json!({"device": "new"}));

        assert_eq!(registry.len(), 1);
        let endpoint = registry.get("a").unwrap();
        assert_eq!(endpoint.metadata, json!({"device": "new"}));
        assert_eq!(endpoint.connected_at, connected_at);
    }

    #[test]
    fn test_list_by_role_in_connect_order() {
        let mut registry = ConnectionRegistry::new();
        for id in ["p1", "v1", "p2", "p3"] {
            registry.connect(id.to_string());
        }
        // Register out of connect order
        registry.upsert("p3".to_string(), Role::Phone, Value::Null);
        registry.upsert("p1".to_string(), Role::Phone, Value::Null);
        registry.upsert("p2".to_string(), Role::Phone, Value::Null);
        registry.upsert("v1".to_string(), Role::Viewer, Value::Null);

        assert_eq!(registry.ids_by_role(Role::Phone), vec!["p1", "p2", "p3"]);
        assert_eq!(registry.ids_by_role(Role::Viewer), vec!["v1"]);
    }

    #[test]
    fn test_reregistration_moves_between_roles() {
        let mut registry = ConnectionRegistry::new();
        registry.connect("x".to_string());
        registry.upsert("x".to_string(), Role::Phone, Value::Null);
        assert_eq!(registry.ids_by_role(Role::Phone), vec!["x"]);

        registry.upsert("x".to_string(), Role::Viewer, Value::Null);
        assert!(registry.ids_by_role(Role::Phone).is_empty());
        assert_eq!(registry.ids_by_role(Role::Viewer), vec!["x"]);
    }

    #[test]
    fn test_remove_is_noop_when_absent() {
        let mut registry = ConnectionRegistry::new();
        registry.connect("a".to_string());
        assert!(registry.remove("a").is_some());
        assert!(registry.remove("a").is_none());
        assert!(registry.is_empty());
    }

    #[test]
    fn test_touch_and_stale() {
        let mut registry = ConnectionRegistry::new();
        registry.connect("idle".to_string());
        registry.connect("busy".to_string());

        let now = Utc::now();
        registry.touch_at("idle", now - Duration::minutes(45));
        registry.touch_at("busy", now - Duration::minutes(1));

        let stale = registry.stale_since(now - Duration::minutes(30));
        assert_eq!(stale, vec!["idle".to_string()]);
        assert!(!registry.touch("missing"));
    }

    #[derive(Debug, Clone)]
    enum Op {
        Connect(u8),
        Register(u8, bool),
        Remove(u8),
    }

    fn op() -> impl Strategy<Value = Op> {
        prop_oneof![
            (0u8..8).prop_map(Op::Connect),
            (0u8..8, any::<bool>()).prop_map(|(id, phone)| Op::Register(id, phone)),
            (0u8..8).prop_map(Op::Remove),
        ]
    }

    proptest! {
        /// Role listings only ever contain ids present in the registry
        #[test]
        fn list_by_role_only_contains_registered_ids(ops in prop::collection::vec(op(), 0..64)) {
            let mut registry = ConnectionRegistry::new();
            for op in ops {
                match op {
                    Op::Connect(id) => registry.connect(id.to_string()),
                    Op::Register(id, phone) => {
                        let role = if phone { Role::Phone } else { Role::Viewer };
                        registry.upsert(id.to_string(), role, Value::Null);
                    }
                    Op::Remove(id) => {
                        registry.remove(&id.to_string());
                    }
                }

                for role in [Role::Unknown, Role::Phone, Role::Viewer] {
                    for endpoint in registry.list_by_role(role) {
                        prop_assert!(registry.contains(&endpoint.id));
                        prop_assert_eq!(endpoint.role, role);
                    }
                }
                let counts = registry.count_by_role();
                prop_assert_eq!(counts.unknown + counts.phone + counts.viewer, registry.len());
            }
        }
    }
}
