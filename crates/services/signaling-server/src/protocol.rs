//! Wire protocol for the signaling WebSocket
//!
//! Every frame is a JSON object tagged by `type` (kebab-case) with camelCase
//! fields. Negotiation payloads and frame data are carried as opaque JSON
//! values and are never inspected.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;
use std::str::FromStr;

/// Opaque endpoint identifier assigned by the coordinator at connect time
pub type EndpointId = String;

/// Declared role of an endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// Connected but not registered yet
    Unknown,
    /// Media source
    Phone,
    /// Media sink
    Viewer,
}

impl FromStr for Role {
    type Err = ProtocolError;

    /// Parses a role a client may register as. `unknown` is not registrable.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "phone" => Ok(Role::Phone),
            "viewer" => Ok(Role::Viewer),
            other => Err(ProtocolError::UnknownRole(other.to_string())),
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Role::Unknown => write!(f, "unknown"),
            Role::Phone => write!(f, "phone"),
            Role::Viewer => write!(f, "viewer"),
        }
    }
}

/// Stream control actions a phone can announce
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StreamAction {
    Start,
    Pause,
    Resume,
    Stop,
}

/// Which leg of the peer-to-peer handshake a relayed message belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NegotiationKind {
    Offer,
    Answer,
    Candidate,
}

impl NegotiationKind {
    /// Offers and answers establish a pairing; candidates only ride on one.
    pub fn links_peers(self) -> bool {
        matches!(self, NegotiationKind::Offer | NegotiationKind::Answer)
    }
}

impl fmt::Display for NegotiationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NegotiationKind::Offer => write!(f, "offer"),
            NegotiationKind::Answer => write!(f, "answer"),
            NegotiationKind::Candidate => write!(f, "candidate"),
        }
    }
}

/// Messages sent by endpoints to the coordinator
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum InboundMessage {
    RegisterRole {
        /// Kept as a string so an unknown role is reported instead of
        /// failing the whole frame as malformed
        role: String,
        #[serde(default)]
        metadata: Value,
    },
    RequestStream {
        target_id: EndpointId,
    },
    StreamControl {
        action: StreamAction,
    },
    NegotiationOffer {
        target_id: EndpointId,
        payload: Value,
    },
    NegotiationAnswer {
        target_id: EndpointId,
        payload: Value,
    },
    NegotiationCandidate {
        target_id: EndpointId,
        payload: Value,
    },
    FrameData {
        sequence: u64,
        data: Value,
    },
}

impl InboundMessage {
    /// Parse a text frame
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        serde_json::from_str(text).map_err(|e| ProtocolError::Malformed(e.to_string()))
    }

    /// Short name used in logs
    pub fn kind(&self) -> &'static str {
        match self {
            InboundMessage::RegisterRole { .. } => "register-role",
            InboundMessage::RequestStream { .. } => "request-stream",
            InboundMessage::StreamControl { .. } => "stream-control",
            InboundMessage::NegotiationOffer { .. } => "negotiation-offer",
            InboundMessage::NegotiationAnswer { .. } => "negotiation-answer",
            InboundMessage::NegotiationCandidate { .. } => "negotiation-candidate",
            InboundMessage::FrameData { .. } => "frame-data",
        }
    }
}

/// Entry in an availability list
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PeerSummary {
    pub id: EndpointId,
    pub metadata: Value,
}

/// Messages sent by the coordinator to endpoints
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum OutboundMessage {
    RoleRegistered {
        id: EndpointId,
        available_list: Vec<PeerSummary>,
    },
    PeerAvailable {
        id: EndpointId,
        metadata: Value,
    },
    PeerDeparted {
        id: EndpointId,
    },
    StreamRequested {
        from_id: EndpointId,
    },
    PeerNotFound {
        requested_id: EndpointId,
        alternatives: Vec<EndpointId>,
    },
    StreamControl {
        phone_id: EndpointId,
        action: StreamAction,
    },
    NegotiationOffer {
        from_id: EndpointId,
        payload: Value,
    },
    NegotiationAnswer {
        from_id: EndpointId,
        payload: Value,
    },
    NegotiationCandidate {
        from_id: EndpointId,
        payload: Value,
    },
    PairingRemoved {
        peer_id: EndpointId,
    },
    FrameData {
        from_id: EndpointId,
        sequence: u64,
        data: Value,
        /// Receipt time, milliseconds since the Unix epoch
        received_at: i64,
    },
    Error {
        message: String,
    },
}

impl OutboundMessage {
    /// Build the relayed form of a negotiation message
    pub fn negotiation(kind: NegotiationKind, from_id: EndpointId, payload: Value) -> Self {
        match kind {
            NegotiationKind::Offer => OutboundMessage::NegotiationOffer { from_id, payload },
            NegotiationKind::Answer => OutboundMessage::NegotiationAnswer { from_id, payload },
            NegotiationKind::Candidate => {
                OutboundMessage::NegotiationCandidate { from_id, payload }
            }
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}

/// Protocol errors
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("Malformed message: {0}")]
    Malformed(String),

    #[error("Unknown role: {0}")]
    UnknownRole(String),
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_register_role() {
        let msg = InboundMessage::parse(
            r#"{"type":"register-role","role":"phone","metadata":{"device":"Pixel 8"}}"#,
        )
        .unwrap();
        assert_eq!(
            msg,
            InboundMessage::RegisterRole {
                role: "phone".to_string(),
                metadata: json!({"device": "Pixel 8"}),
            }
        );
    }

    #[test]
    fn test_register_role_metadata_is_optional() {
        let msg = InboundMessage::parse(r#"{"type":"register-role","role":"viewer"}"#).unwrap();
        assert!(matches!(
            msg,
            InboundMessage::RegisterRole { metadata: Value::Null, .. }
        ));
    }

    #[test]
    fn test_parse_negotiation_uses_camel_case() {
        let msg = InboundMessage::parse(
            r#"{"type":"negotiation-offer","targetId":"abc","payload":{"sdp":"v=0"}}"#,
        )
        .unwrap();
        assert_eq!(msg.kind(), "negotiation-offer");
        match msg {
            InboundMessage::NegotiationOffer { target_id, payload } => {
                assert_eq!(target_id, "abc");
                assert_eq!(payload, json!({"sdp": "v=0"}));
            }
            other => panic!("unexpected message {:?}", other),
        }
    }

    #[test]
    fn test_missing_field_is_malformed() {
        let err = InboundMessage::parse(r#"{"type":"request-stream"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));

        let err = InboundMessage::parse(r#"{"type":"teleport"}"#).unwrap_err();
        assert!(matches!(err, ProtocolError::Malformed(_)));
    }

    #[test]
    fn test_role_parsing() {
        assert_eq!("phone".parse::<Role>().unwrap(), Role::Phone);
        assert_eq!("viewer".parse::<Role>().unwrap(), Role::Viewer);
        assert!(matches!(
            "unknown".parse::<Role>(),
            Err(ProtocolError::UnknownRole(_))
        ));
        assert!("admin".parse::<Role>().is_err());
    }

    #[test]
    fn test_outbound_serialization() {
        let msg = OutboundMessage::PeerNotFound {
            requested_id: "ghost".to_string(),
            alternatives: vec!["p1".to_string()],
        };
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(
            value,
            json!({"type": "peer-not-found", "requestedId": "ghost", "alternatives": ["p1"]})
        );

        let msg = OutboundMessage::negotiation(
            NegotiationKind::Candidate,
            "p1".to_string(),
            json!({"candidate": "a=1"}),
        );
        let value: Value = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
        assert_eq!(value["type"], "negotiation-candidate");
        assert_eq!(value["fromId"], "p1");
    }
}
