//! Phonecast Signaling Service
//!
//! Coordinates phone-to-desktop WebRTC streaming. Phones and desktop viewers
//! connect over one WebSocket each, announce a role, find each other, and
//! relay session-negotiation messages through the service until a direct
//! media link is up. Media never passes through here except the optional
//! low-rate `frame-data` fallback.
//!
//! # Architecture
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────────┐
//! │                       phonecast-signaling                         │
//! ├───────────────────────────────────────────────────────────────────┤
//! │                                                                   │
//! │  ┌──────────────────┐                                             │
//! │  │  HTTP / WS (axum)│ ← GET /ws   GET /status /health /metrics    │
//! │  └────────┬─────────┘                                             │
//! │           │ text frames                                           │
//! │           ▼                                                       │
//! │  ┌──────────────────────────────────────────────┐                 │
//! │  │  SessionCoordinator (one lock)               │◀── Sweeper      │
//! │  │  ┌────────────┐ ┌──────────────┐ ┌─────────┐ │    (interval)   │
//! │  │  │  Registry  │ │   Pairings   │ │ Router  │ │                 │
//! │  │  └────────────┘ └──────────────┘ └─────────┘ │                 │
//! │  └────────┬─────────────────────────────────────┘                 │
//! │           │ mailboxes (mpsc, FIFO per endpoint)                   │
//! │           ▼                                                       │
//! │  per-connection forward task → WebSocket                          │
//! └───────────────────────────────────────────────────────────────────┘
//! ```

pub mod api;
pub mod config;
pub mod coordinator;
pub mod metrics;
pub mod pairing;
pub mod protocol;
pub mod registry;
pub mod router;
pub mod sweeper;

pub use coordinator::SessionCoordinator;
pub use protocol::{EndpointId, InboundMessage, OutboundMessage, Role};
