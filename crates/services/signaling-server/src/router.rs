//! Signaling router
//!
//! Relays offer / answer / candidate payloads to the endpoint named in the
//! message and keeps the pairing tracker current as a side effect. Payloads
//! are forwarded untouched. Delivery is best-effort: a stale sender or an
//! absent target drops the message without telling anyone.
//!
//! The router only decides; the coordinator pushes the resulting
//! [`Delivery`] into the target's mailbox once its state lock is released.

use serde_json::Value;

use crate::pairing::{Pairing, PairingTracker};
use crate::protocol::{EndpointId, NegotiationKind, OutboundMessage};
use crate::registry::ConnectionRegistry;

/// A message bound for one endpoint
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub target: EndpointId,
    pub message: OutboundMessage,
}

/// Result of a relay attempt
#[derive(Debug, Clone, PartialEq)]
pub enum RelayOutcome {
    /// Forwarded to the target. `replaced` lists pairings broken by the
    /// link this message created.
    Delivered {
        delivery: Delivery,
        replaced: Vec<Pairing>,
    },
    /// Sender is no longer registered; message is stale
    UnknownSender,
    /// Target is not connected
    TargetUnavailable,
}

pub struct SignalingRouter;

impl SignalingRouter {
    pub fn relay_offer(
        registry: &ConnectionRegistry,
        pairings: &mut PairingTracker,
        sender: &str,
        target: &str,
        payload: Value,
    ) -> RelayOutcome {
        Self::relay(registry, pairings, NegotiationKind::Offer, sender, target, payload)
    }

    pub fn relay_answer(
        registry: &ConnectionRegistry,
        pairings: &mut PairingTracker,
        sender: &str,
        target: &str,
        payload: Value,
    ) -> RelayOutcome {
        Self::relay(registry, pairings, NegotiationKind::Answer, sender, target, payload)
    }

    pub fn relay_candidate(
        registry: &ConnectionRegistry,
        pairings: &mut PairingTracker,
        sender: &str,
        target: &str,
        payload: Value,
    ) -> RelayOutcome {
        Self::relay(registry, pairings, NegotiationKind::Candidate, sender, target, payload)
    }

    /// Relay one negotiation message from `sender` to `target`
    pub fn relay(
        registry: &ConnectionRegistry,
        pairings: &mut PairingTracker,
        kind: NegotiationKind,
        sender: &str,
        target: &str,
        payload: Value,
    ) -> RelayOutcome {
        if !registry.contains(sender) {
            return RelayOutcome::UnknownSender;
        }
        if !registry.contains(target) {
            return RelayOutcome::TargetUnavailable;
        }

        let replaced = if kind.links_peers() {
            pairings.link(sender, target)
        } else {
            Vec::new()
        };

        RelayOutcome::Delivered {
            delivery: Delivery {
                target: target.to_string(),
                message: OutboundMessage::negotiation(kind, sender.to_string(), payload),
            },
            replaced,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::Role;
    use serde_json::json;

    fn setup() -> (ConnectionRegistry, PairingTracker) {
        let mut registry = ConnectionRegistry::new();
        for (id, role) in [("p1", Role::Phone), ("v1", Role::Viewer), ("v2", Role::Viewer)] {
            registry.connect(id.to_string());
            registry.upsert(id.to_string(), role, Value::Null);
        }
        (registry, PairingTracker::new())
    }

    #[test]
    fn test_offer_links_and_forwards_payload_verbatim() {
        let (registry, mut pairings) = setup();
        let payload = json!({"sdp": "v=0\r\no=- 1 2 IN IP4 0.0.0.0", "type": "offer"});

        let outcome =
            SignalingRouter::relay_offer(&registry, &mut pairings, "p1", "v1", payload.clone());

        match outcome {
            RelayOutcome::Delivered { delivery, replaced } => {
                assert_eq!(delivery.target, "v1");
                assert_eq!(
                    delivery.message,
                    OutboundMessage::NegotiationOffer {
                        from_id: "p1".to_string(),
                        payload,
                    }
                );
                assert!(replaced.is_empty());
            }
            other => panic!("expected delivery, got {:?}", other),
        }
        assert_eq!(pairings.peer_of("v1"), Some("p1"));
    }

    #[test]
    fn test_answer_links() {
        let (registry, mut pairings) = setup();
        let outcome = SignalingRouter::relay_answer(&registry, &mut pairings, "v1", "p1", json!({}));
        assert!(matches!(outcome, RelayOutcome::Delivered { .. }));
        assert_eq!(pairings.peer_of("p1"), Some("v1"));
    }

    #[test]
    fn test_candidate_does_not_link() {
        let (registry, mut pairings) = setup();
        let outcome = SignalingRouter::relay_candidate(
            &registry,
            &mut pairings,
            "p1",
            "v1",
            json!({"candidate": "candidate:1 1 udp 2122260223 10.0.0.2 54321 typ host"}),
        );
        assert!(matches!(outcome, RelayOutcome::Delivered { .. }));
        assert!(pairings.is_empty());
    }

    #[test]
    fn test_unknown_sender_dropped() {
        let (registry, mut pairings) = setup();
        let outcome = SignalingRouter::relay_offer(&registry, &mut pairings, "gone", "v1", json!({}));
        assert_eq!(outcome, RelayOutcome::UnknownSender);
        assert!(pairings.is_empty());
    }

    #[test]
    fn test_absent_target_dropped_without_link() {
        let (registry, mut pairings) = setup();
        let outcome = SignalingRouter::relay_offer(&registry, &mut pairings, "p1", "ghost", json!({}));
        assert_eq!(outcome, RelayOutcome::TargetUnavailable);
        assert!(pairings.is_empty());
    }

    #[test]
    fn test_offer_to_new_target_reports_replaced_pairing() {
        let (registry, mut pairings) = setup();
        SignalingRouter::relay_offer(&registry, &mut pairings, "p1", "v1", json!({}));
        let outcome = SignalingRouter::relay_offer(&registry, &mut pairings, "p1", "v2", json!({}));

        match outcome {
            RelayOutcome::Delivered { replaced, .. } => {
                assert_eq!(replaced.len(), 1);
                assert_eq!(
                    replaced[0],
                    Pairing {
                        a: "p1".to_string(),
                        b: "v1".to_string(),
                    }
                );
            }
            other => panic!("expected delivery, got {:?}", other),
        }
        assert_eq!(pairings.peer_of("v1"), None);
        assert_eq!(pairings.peer_of("v2"), Some("p1"));
    }
}
