//! Session coordination
//!
//! [`SessionCoordinator`] is the command surface every connection handler
//! talks to. It owns the connection registry, the pairing tracker and one
//! outbound mailbox per endpoint inside a single [`CoordinatorState`] behind a
//! short-held mutex. No lock is held across an `.await`: each operation
//! mutates state, snapshots its recipients into an [`Outbox`], releases the
//! lock and only then pushes into the mailboxes.
//!
//! Per directed sender → target pair, relayed messages keep their send order:
//! a connection handles its inbound frames one at a time and mailboxes are
//! FIFO.

use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tokio::sync::mpsc;

use crate::metrics::Metrics;
use crate::pairing::PairingTracker;
use crate::protocol::{
    EndpointId, InboundMessage, NegotiationKind, OutboundMessage, ProtocolError, Role,
    StreamAction,
};
use crate::registry::{ConnectionRegistry, RoleCounts};
use crate::router::{RelayOutcome, SignalingRouter};

/// Sending half of an endpoint's outbound queue
pub type Mailbox = mpsc::UnboundedSender<OutboundMessage>;

/// Everything the coordinator serializes access to
#[derive(Default)]
pub struct CoordinatorState {
    registry: ConnectionRegistry,
    pairings: PairingTracker,
    mailboxes: HashMap<EndpointId, Mailbox>,
}

/// Notifications gathered under the lock and delivered after it is released
#[derive(Default)]
pub struct Outbox {
    pending: Vec<(Mailbox, OutboundMessage)>,
}

impl Outbox {
    fn flush(self) {
        for (mailbox, message) in self.pending {
            // Receiver gone means the connection is already closing
            let _ = mailbox.send(message);
        }
    }
}

impl CoordinatorState {
    /// Queue `message` for `target` if it still has a mailbox
    fn notify(&self, outbox: &mut Outbox, target: &str, message: OutboundMessage) -> bool {
        match self.mailboxes.get(target) {
            Some(mailbox) => {
                outbox.pending.push((mailbox.clone(), message));
                true
            }
            None => false,
        }
    }

    /// Queue `message` for every endpoint with `role` except `skip`
    fn notify_role(
        &self,
        outbox: &mut Outbox,
        role: Role,
        skip: &str,
        message: &OutboundMessage,
    ) -> usize {
        let mut notified = 0;
        // Snapshot recipients before notifying
        for id in self.registry.ids_by_role(role) {
            if id != skip && self.notify(outbox, &id, message.clone()) {
                notified += 1;
            }
        }
        notified
    }

    fn register_role(
        &mut self,
        outbox: &mut Outbox,
        id: &str,
        role: &str,
        metadata: Value,
    ) -> Result<(), ProtocolError> {
        let previous = match self.registry.get(id) {
            Some(endpoint) => endpoint.role,
            None => return Ok(()),
        };

        let role: Role = match role.parse() {
            Ok(role) => role,
            Err(e) => {
                self.notify(
                    outbox,
                    id,
                    OutboundMessage::Error {
                        message: e.to_string(),
                    },
                );
                return Err(e);
            }
        };

        self.registry.upsert(id.to_string(), role, metadata.clone());

        if previous == Role::Phone && role != Role::Phone {
            let departed = OutboundMessage::PeerDeparted { id: id.to_string() };
            self.notify_role(outbox, Role::Viewer, id, &departed);
        }

        let available_list = match role {
            Role::Phone => {
                let available = OutboundMessage::PeerAvailable {
                    id: id.to_string(),
                    metadata,
                };
                self.notify_role(outbox, Role::Viewer, id, &available);
                Vec::new()
            }
            _ => self
                .registry
                .list_by_role(Role::Phone)
                .into_iter()
                .map(|e| e.summary())
                .collect(),
        };

        self.notify(
            outbox,
            id,
            OutboundMessage::RoleRegistered {
                id: id.to_string(),
                available_list,
            },
        );
        Ok(())
    }

    fn request_stream(&mut self, outbox: &mut Outbox, viewer_id: &str, phone_id: &str) -> bool {
        if !self.registry.contains(viewer_id) {
            return false;
        }

        let is_phone = self
            .registry
            .get(phone_id)
            .map(|e| e.role == Role::Phone)
            .unwrap_or(false);

        if is_phone {
            self.notify(
                outbox,
                phone_id,
                OutboundMessage::StreamRequested {
                    from_id: viewer_id.to_string(),
                },
            )
        } else {
            self.notify(
                outbox,
                viewer_id,
                OutboundMessage::PeerNotFound {
                    requested_id: phone_id.to_string(),
                    alternatives: self.registry.ids_by_role(Role::Phone),
                },
            );
            false
        }
    }

    fn stream_control(&mut self, outbox: &mut Outbox, phone_id: &str, action: StreamAction) -> usize {
        let is_phone = self
            .registry
            .get(phone_id)
            .map(|e| e.role == Role::Phone)
            .unwrap_or(false);
        if !is_phone {
            return 0;
        }
        let message = OutboundMessage::StreamControl {
            phone_id: phone_id.to_string(),
            action,
        };
        self.notify_role(outbox, Role::Viewer, phone_id, &message)
    }

    fn relay(
        &mut self,
        outbox: &mut Outbox,
        kind: NegotiationKind,
        sender: &str,
        target: &str,
        payload: Value,
    ) -> RelayOutcome {
        let outcome =
            SignalingRouter::relay(&self.registry, &mut self.pairings, kind, sender, target, payload);

        if let RelayOutcome::Delivered { delivery, replaced } = &outcome {
            self.notify(outbox, &delivery.target, delivery.message.clone());
            for pairing in replaced {
                tracing::debug!(
                    endpoint_id = %pairing.a,
                    old_peer = %pairing.b,
                    "Pairing replaced by new negotiation"
                );
                self.notify(
                    outbox,
                    &pairing.b,
                    OutboundMessage::PairingRemoved {
                        peer_id: pairing.a.clone(),
                    },
                );
            }
        }
        outcome
    }

    fn relay_frame(&mut self, outbox: &mut Outbox, sender: &str, sequence: u64, data: Value) -> usize {
        if !self.registry.contains(sender) {
            return 0;
        }
        let message = OutboundMessage::FrameData {
            from_id: sender.to_string(),
            sequence,
            data,
            received_at: Utc::now().timestamp_millis(),
        };
        self.notify_role(outbox, Role::Viewer, sender, &message)
    }

    /// Tear down everything tied to `id`. Returns true if it held a mailbox.
    fn remove_endpoint(&mut self, outbox: &mut Outbox, id: &str) -> bool {
        let removed = self.registry.remove(id);
        let had_mailbox = self.mailboxes.remove(id).is_some();

        if let Some(peer) = self.pairings.unlink(id) {
            self.notify(
                outbox,
                &peer,
                OutboundMessage::PairingRemoved {
                    peer_id: id.to_string(),
                },
            );
        }

        if let Some(endpoint) = removed {
            if endpoint.role == Role::Phone {
                let departed = OutboundMessage::PeerDeparted { id: id.to_string() };
                self.notify_role(outbox, Role::Viewer, id, &departed);
            }
        }

        had_mailbox
    }

    fn sweep(&mut self, outbox: &mut Outbox, now: DateTime<Utc>, inactivity: Duration) -> SweepReport {
        let alive: HashSet<EndpointId> = self.registry.ids().cloned().collect();
        let pruned = self.pairings.prune_dangling(&alive);
        for pairing in &pruned {
            // Whichever side is still here learns its partner is gone
            for (member, other) in [(&pairing.a, &pairing.b), (&pairing.b, &pairing.a)] {
                if alive.contains(member) {
                    self.notify(
                        outbox,
                        member,
                        OutboundMessage::PairingRemoved {
                            peer_id: other.clone(),
                        },
                    );
                }
            }
        }

        // A cutoff before the representable range means nothing is old enough
        let evicted = match now.checked_sub_signed(inactivity) {
            Some(cutoff) => self.registry.stale_since(cutoff),
            None => Vec::new(),
        };
        for id in &evicted {
            self.remove_endpoint(outbox, id);
        }

        SweepReport {
            pruned_pairs: pruned.len(),
            evicted,
        }
    }

    fn status(&self) -> StatusSnapshot {
        StatusSnapshot {
            total_endpoints: self.registry.len(),
            by_role: self.registry.count_by_role(),
            active_pairings: self.pairings.pair_count(),
        }
    }
}

/// Outcome of one liveness sweep
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SweepReport {
    pub pruned_pairs: usize,
    pub evicted: Vec<EndpointId>,
}

/// Read-only view served on `GET /status`
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusSnapshot {
    pub total_endpoints: usize,
    pub by_role: RoleCounts,
    pub active_pairings: usize,
}

/// A live connection's link to the coordinator
///
/// Dropping the guard runs [`SessionCoordinator::disconnect`], so cleanup
/// happens exactly once however the transport ended.
pub struct ConnectionGuard {
    id: EndpointId,
    coordinator: Arc<SessionCoordinator>,
}

impl ConnectionGuard {
    pub fn id(&self) -> &str {
        &self.id
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.coordinator.disconnect(&self.id);
    }
}

/// Returned by [`SessionCoordinator::connect`]
pub struct Connection {
    pub guard: ConnectionGuard,
    pub outbound: mpsc::UnboundedReceiver<OutboundMessage>,
}

/// Shared coordinator, created once per process and handed to every
/// connection handler and the sweeper
pub struct SessionCoordinator {
    state: Mutex<CoordinatorState>,
    metrics: Arc<Metrics>,
}

impl Default for SessionCoordinator {
    fn default() -> Self {
        Self::new(Arc::new(Metrics::new()))
    }
}

impl SessionCoordinator {
    pub fn new(metrics: Arc<Metrics>) -> Self {
        Self {
            state: Mutex::new(CoordinatorState::default()),
            metrics,
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        Arc::clone(&self.metrics)
    }

    /// Admit a new endpoint with a fresh id and an `unknown` role
    pub fn connect(self: &Arc<Self>) -> Connection {
        let id = uuid::Uuid::new_v4().to_string();
        let (tx, rx) = mpsc::unbounded_channel();
        {
            let mut state = self.state.lock();
            state.registry.connect(id.clone());
            state.mailboxes.insert(id.clone(), tx);
        }
        self.metrics.endpoint_connected();
        tracing::info!(endpoint_id = %id, "Endpoint connected");

        Connection {
            guard: ConnectionGuard {
                id,
                coordinator: Arc::clone(self),
            },
            outbound: rx,
        }
    }

    /// Parse and dispatch one text frame from `id`
    pub fn handle_text(&self, id: &str, text: &str) {
        match InboundMessage::parse(text) {
            Ok(message) => self.handle_inbound(id, message),
            Err(e) => {
                self.metrics.message_malformed();
                tracing::debug!(endpoint_id = %id, error = %e, "Dropping malformed message");
                self.with_outbox(|state, outbox| {
                    // Malformed frames still count as activity
                    if state.registry.touch(id) && expects_reply(text) {
                        state.notify(
                            outbox,
                            id,
                            OutboundMessage::Error {
                                message: e.to_string(),
                            },
                        );
                    }
                });
            }
        }
    }

    /// Dispatch one inbound message from `id`
    ///
    /// Messages from endpoints no longer in the registry are stale and
    /// ignored. Everything else refreshes the sender's activity first.
    pub fn handle_inbound(&self, id: &str, message: InboundMessage) {
        let kind = message.kind();
        let mut outbox = Outbox::default();
        {
            let mut state = self.state.lock();
            if !state.registry.touch(id) {
                tracing::debug!(endpoint_id = %id, kind, "Ignoring message from removed endpoint");
                return;
            }
            self.metrics.message_received();

            match message {
                InboundMessage::RegisterRole { role, metadata } => {
                    match state.register_role(&mut outbox, id, &role, metadata) {
                        Ok(()) => tracing::info!(endpoint_id = %id, role = %role, "Role registered"),
                        Err(e) => tracing::warn!(endpoint_id = %id, error = %e, "Rejected registration"),
                    }
                }
                InboundMessage::RequestStream { target_id } => {
                    self.metrics.stream_requested();
                    let forwarded = state.request_stream(&mut outbox, id, &target_id);
                    tracing::info!(endpoint_id = %id, target_id = %target_id, forwarded, "Stream requested");
                }
                InboundMessage::StreamControl { action } => {
                    let notified = state.stream_control(&mut outbox, id, action);
                    tracing::info!(endpoint_id = %id, ?action, notified, "Stream control broadcast");
                }
                InboundMessage::NegotiationOffer { target_id, payload } => {
                    let outcome =
                        state.relay(&mut outbox, NegotiationKind::Offer, id, &target_id, payload);
                    self.record_relay(outcome, id, &target_id);
                }
                InboundMessage::NegotiationAnswer { target_id, payload } => {
                    let outcome =
                        state.relay(&mut outbox, NegotiationKind::Answer, id, &target_id, payload);
                    self.record_relay(outcome, id, &target_id);
                }
                InboundMessage::NegotiationCandidate { target_id, payload } => {
                    let outcome =
                        state.relay(&mut outbox, NegotiationKind::Candidate, id, &target_id, payload);
                    self.record_relay(outcome, id, &target_id);
                }
                InboundMessage::FrameData { sequence, data } => {
                    let recipients = state.relay_frame(&mut outbox, id, sequence, data);
                    self.metrics.frames_relayed(recipients as u64);
                }
            }
        }
        outbox.flush();
    }

    fn record_relay(&self, outcome: RelayOutcome, sender: &str, target: &str) {
        match outcome {
            RelayOutcome::Delivered { delivery, .. } => {
                self.metrics.negotiation_relayed();
                tracing::debug!(from = %sender, to = %delivery.target, "Relayed negotiation message");
            }
            RelayOutcome::UnknownSender => {
                self.metrics.relay_dropped();
                tracing::debug!(from = %sender, to = %target, "Dropped relay from stale sender");
            }
            RelayOutcome::TargetUnavailable => {
                self.metrics.relay_dropped();
                tracing::debug!(from = %sender, to = %target, "Dropped relay to absent target");
            }
        }
    }

    /// Register (or re-register) `id` as `role`
    pub fn register_role(&self, id: &str, role: &str, metadata: Value) -> Result<(), ProtocolError> {
        self.with_outbox(|state, outbox| state.register_role(outbox, id, role, metadata))
    }

    /// Ask `phone_id` to start streaming to `viewer_id`. Returns true if the
    /// request reached a registered phone.
    pub fn request_stream(&self, viewer_id: &str, phone_id: &str) -> bool {
        self.with_outbox(|state, outbox| state.request_stream(outbox, viewer_id, phone_id))
    }

    /// Broadcast a phone's stream control action to every viewer. Returns the
    /// number of viewers notified; zero if `phone_id` is not a registered phone.
    pub fn stream_control(&self, phone_id: &str, action: StreamAction) -> usize {
        self.with_outbox(|state, outbox| state.stream_control(outbox, phone_id, action))
    }

    pub fn relay_offer(&self, sender: &str, target: &str, payload: Value) -> RelayOutcome {
        self.with_outbox(|state, outbox| {
            state.relay(outbox, NegotiationKind::Offer, sender, target, payload)
        })
    }

    pub fn relay_answer(&self, sender: &str, target: &str, payload: Value) -> RelayOutcome {
        self.with_outbox(|state, outbox| {
            state.relay(outbox, NegotiationKind::Answer, sender, target, payload)
        })
    }

    pub fn relay_candidate(&self, sender: &str, target: &str, payload: Value) -> RelayOutcome {
        self.with_outbox(|state, outbox| {
            state.relay(outbox, NegotiationKind::Candidate, sender, target, payload)
        })
    }

    /// Fan a fallback media frame out to every viewer
    pub fn relay_frame(&self, sender: &str, sequence: u64, data: Value) -> usize {
        self.with_outbox(|state, outbox| state.relay_frame(outbox, sender, sequence, data))
    }

    /// Remove `id` and notify whoever cared. Safe to call more than once.
    pub fn disconnect(&self, id: &str) {
        let had_mailbox = self.with_outbox(|state, outbox| state.remove_endpoint(outbox, id));
        if had_mailbox {
            self.metrics.endpoint_disconnected();
            tracing::info!(endpoint_id = %id, "Endpoint disconnected");
        }
    }

    /// Prune dangling pairings and evict endpoints idle longer than
    /// `inactivity` as of `now`
    pub fn sweep(&self, now: DateTime<Utc>, inactivity: Duration) -> SweepReport {
        let report = self.with_outbox(|state, outbox| state.sweep(outbox, now, inactivity));
        self.metrics.pairings_pruned(report.pruned_pairs as u64);
        self.metrics.endpoints_evicted(report.evicted.len() as u64);
        for _ in &report.evicted {
            self.metrics.endpoint_disconnected();
        }
        report
    }

    pub fn status(&self) -> StatusSnapshot {
        self.state.lock().status()
    }

    pub fn peer_of(&self, id: &str) -> Option<EndpointId> {
        self.state.lock().pairings.peer_of(id).map(str::to_string)
    }

    pub fn role_of(&self, id: &str) -> Option<Role> {
        self.state.lock().registry.get(id).map(|e| e.role)
    }

    /// Registered ids with `role`, oldest connection first
    pub fn endpoints_by_role(&self, role: Role) -> Vec<EndpointId> {
        self.state.lock().registry.ids_by_role(role)
    }

    /// Record activity for a frame that carries no message (binary, ping, pong)
    pub fn touch(&self, id: &str) -> bool {
        self.state.lock().registry.touch(id)
    }

    /// Backdate an endpoint's last activity
    pub fn touch_at(&self, id: &str, at: DateTime<Utc>) -> bool {
        self.state.lock().registry.touch_at(id, at)
    }

    fn with_outbox<T>(&self, f: impl FnOnce(&mut CoordinatorState, &mut Outbox) -> T) -> T {
        let mut outbox = Outbox::default();
        let result = {
            let mut state = self.state.lock();
            f(&mut *state, &mut outbox)
        };
        outbox.flush();
        result
    }
}

/// Only `register-role` promises a reply, so only it earns an error frame
fn expects_reply(text: &str) -> bool {
    serde_json::from_str::<Value>(text)
        .ok()
        .and_then(|v| v.get("type").and_then(Value::as_str).map(|t| t == "register-role"))
        .unwrap_or(false)
}
