//! Signaling router
//!
//! Interprets client messages and owns the join / offer / answer / candidate /
//! disconnect protocol. The registry sits behind a single mutex and every
//! logical operation (one join, one forward, one disconnect with its
//! broadcast) runs under one acquisition of it. Nothing awaits while the lock
//! is held: deliveries go through non-blocking outbox sends.

use parking_lot::Mutex;
use tracing::{debug, info, warn};

use tandem_core::{ConnectionId, PublisherOverflow, RelayConfig, SlowPeerPolicy};

use crate::messages::{ClientMessage, ErrorCode, Role, ServerMessage};
use crate::outbox::{Delivery, Outbox};
use crate::registry::{Connection, Registry};

/// Router-side state of one transport connection.
///
/// Created when the transport accepts a connection and consumed by
/// [`SignalRouter::disconnect`] when it closes.
#[derive(Debug)]
pub struct Session {
    id: ConnectionId,
    state: SessionState,
}

#[derive(Debug)]
enum SessionState {
    /// Not registered yet; the session keeps its outbox until it joins
    Unjoined(Outbox),
    /// Registered; the registry entry owns the outbox
    Joined(Role),
}

impl Session {
    pub fn new(id: ConnectionId, outbox: Outbox) -> Self {
        Self {
            id,
            state: SessionState::Unjoined(outbox),
        }
    }

    pub fn id(&self) -> &ConnectionId {
        &self.id
    }

    /// Role taken at join, if joined
    pub fn role(&self) -> Option<Role> {
        match self.state {
            SessionState::Joined(role) => Some(role),
            SessionState::Unjoined(_) => None,
        }
    }

    pub fn is_joined(&self) -> bool {
        matches!(self.state, SessionState::Joined(_))
    }
}

/// Counts reported by the health endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RelayStats {
    pub connections: usize,
    pub publishers: usize,
}

/// Routes client messages between registered connections
pub struct SignalRouter {
    registry: Mutex<Registry>,
    slow_peer: SlowPeerPolicy,
    overflow: PublisherOverflow,
}

impl SignalRouter {
    pub fn new(max_publishers: usize, slow_peer: SlowPeerPolicy, overflow: PublisherOverflow) -> Self {
        Self {
            registry: Mutex::new(Registry::new(max_publishers)),
            slow_peer,
            overflow,
        }
    }

    pub fn from_config(config: &RelayConfig) -> Self {
        Self::new(config.max_publishers, config.slow_peer, config.publisher_overflow)
    }

    /// Parse one inbound text frame and dispatch it.
    ///
    /// Frames that are not a valid message are logged and discarded.
    pub fn handle_frame(&self, session: &mut Session, text: &str) {
        match ClientMessage::from_json(text) {
            Ok(msg) => self.handle(session, msg),
            Err(e) => warn!("Discarding malformed frame from {}: {}", session.id, e),
        }
    }

    /// Dispatch a parsed message
    pub fn handle(&self, session: &mut Session, msg: ClientMessage) {
        match msg {
            join @ ClientMessage::Join { .. } => {
                let role = join.requested_role().unwrap_or(Role::Subscriber);
                self.join(session, role)
            }
            ClientMessage::Unknown => debug!("Ignoring unknown message type from {}", session.id),
            _ if !session.is_joined() => {
                debug!("Ignoring message from unjoined connection {}", session.id)
            }
            ClientMessage::Offer { target_id, offer } => {
                let msg = ServerMessage::Offer {
                    sender_id: session.id.clone(),
                    offer,
                };
                self.forward(&session.id, &target_id, msg);
            }
            ClientMessage::Answer { target_id, answer } => {
                let msg = ServerMessage::Answer {
                    sender_id: session.id.clone(),
                    answer,
                };
                self.forward(&session.id, &target_id, msg);
            }
            ClientMessage::IceCandidate {
                target_id,
                candidate,
            } => {
                let msg = ServerMessage::IceCandidate {
                    sender_id: session.id.clone(),
                    candidate,
                };
                self.forward(&session.id, &target_id, msg);
            }
        }
    }

    /// Register a session and tell everyone involved whom to negotiate with
    pub fn join(&self, session: &mut Session, requested: Role) {
        let outbox = match std::mem::replace(&mut session.state, SessionState::Joined(requested)) {
            SessionState::Unjoined(outbox) => outbox,
            joined @ SessionState::Joined(_) => {
                session.state = joined;
                debug!("Ignoring repeated join from {}", session.id);
                return;
            }
        };

        let id = session.id.clone();
        let mut registry = self.registry.lock();
        let mut stalled = Vec::new();

        let mut role = requested;
        if role == Role::Publisher && !registry.has_publisher_slot() {
            match self.overflow {
                PublisherOverflow::Ignore => {
                    info!("Streamer slots full, {} joins without a slot", id);
                }
                PublisherOverflow::Downgrade => {
                    info!("Streamer slots full, {} joins as watcher", id);
                    role = Role::Subscriber;
                }
                PublisherOverflow::Reject => {
                    info!("Streamer slots full, rejecting join from {}", id);
                    let msg = ServerMessage::error(
                        ErrorCode::PublisherLimit,
                        format!("all {} streamer slots are taken", registry.max_publishers()),
                    );
                    let _ = outbox.deliver(msg);
                    session.state = SessionState::Unjoined(outbox);
                    return;
                }
            }
        }

        let promoted = registry.register(id.clone(), role, outbox);
        session.state = SessionState::Joined(role);

        if promoted {
            let publishers = registry.publisher_ids();
            info!("Streamer {} joined ({} streaming)", id, publishers.len());

            let announce = ServerMessage::StreamerJoined {
                client_id: id.clone(),
                streamers_count: publishers.len(),
            };
            self.broadcast_except(&registry, &id, announce, &mut stalled);

            for subscriber in registry.subscriber_ids() {
                let msg = ServerMessage::CreateOffer { target_id: subscriber };
                self.send(&registry, &id, msg, &mut stalled);
            }

            // Earlier streamers open the link toward the newcomer
            for earlier in publishers.iter().filter(|p| **p != id) {
                let msg = ServerMessage::CreateOffer {
                    target_id: id.clone(),
                };
                self.send(&registry, earlier, msg, &mut stalled);
            }
        } else if role == Role::Subscriber {
            let publishers = registry.publisher_ids();
            info!("Watcher {} joined ({} streaming)", id, publishers.len());

            for publisher in &publishers {
                let msg = ServerMessage::CreateOffer {
                    target_id: id.clone(),
                };
                self.send(&registry, publisher, msg, &mut stalled);
            }

            let list = ServerMessage::StreamersList {
                streamers: publishers,
            };
            self.send(&registry, &id, list, &mut stalled);
        }

        let joined = ServerMessage::Joined {
            client_id: id.clone(),
            client_type: role,
        };
        self.send(&registry, &id, joined, &mut stalled);

        self.evict(&mut registry, stalled);
    }

    /// Tear down a session and notify the remaining connections.
    ///
    /// Returns true if the session was registered (and a notice was broadcast).
    pub fn disconnect(&self, session: Session) -> bool {
        let mut registry = self.registry.lock();
        let removed = registry.unregister(session.id.as_str());

        if let Some(conn) = &removed {
            info!(
                "{} {} left after {:.1}s",
                conn.role.as_str(),
                session.id,
                conn.joined_at.elapsed().as_secs_f64()
            );
            let mut stalled = Vec::new();
            let notice = ServerMessage::UserDisconnected {
                client_id: session.id.clone(),
            };
            self.broadcast_except(&registry, &session.id, notice, &mut stalled);
            self.evict(&mut registry, stalled);
        } else {
            debug!("Connection {} closed", session.id);
        }
        removed.is_some()
    }

    /// Send `msg` to every registered connection except `exclude`.
    ///
    /// Returns the number of recipients the message was queued for.
    fn broadcast_except(
        &self,
        registry: &Registry,
        exclude: &ConnectionId,
        msg: ServerMessage,
        stalled: &mut Vec<ConnectionId>,
    ) -> usize {
        registry
            .all()
            .filter(|conn| conn.id != *exclude)
            .filter(|conn| self.deliver(conn, msg.clone(), stalled))
            .count()
    }

    fn forward(&self, sender: &ConnectionId, target: &ConnectionId, msg: ServerMessage) {
        let mut registry = self.registry.lock();
        let mut stalled = Vec::new();

        let kind = msg.kind();
        if self.send(&registry, target, msg, &mut stalled) {
            debug!("Relayed {} from {} to {}", kind, sender, target);
        }
        self.evict(&mut registry, stalled);
    }

    /// Deliver to one registered connection; unknown targets are dropped
    fn send(
        &self,
        registry: &Registry,
        target: &ConnectionId,
        msg: ServerMessage,
        stalled: &mut Vec<ConnectionId>,
    ) -> bool {
        match registry.get(target.as_str()) {
            Some(conn) => self.deliver(conn, msg, stalled),
            None => {
                debug!("Dropping {} for unknown target {}", msg.kind(), target);
                false
            }
        }
    }

    fn deliver(&self, conn: &Connection, msg: ServerMessage, stalled: &mut Vec<ConnectionId>) -> bool {
        let kind = msg.kind();
        match conn.outbox.deliver(msg) {
            Delivery::Sent => true,
            Delivery::Full => {
                match self.slow_peer {
                    SlowPeerPolicy::Drop => {
                        warn!("Outbound queue full for {}, dropped {}", conn.id, kind);
                    }
                    SlowPeerPolicy::Disconnect => {
                        warn!("Outbound queue full for {}, evicting", conn.id);
                        if !stalled.contains(&conn.id) {
                            stalled.push(conn.id.clone());
                        }
                    }
                }
                false
            }
            Delivery::Closed => {
                debug!("Connection {} is closing, dropped {}", conn.id, kind);
                false
            }
        }
    }

    /// Remove stalled connections as if they had closed.
    ///
    /// Dropping the registry entry drops its outbox, which ends the writer
    /// task and closes the socket.
    fn evict(&self, registry: &mut Registry, mut stalled: Vec<ConnectionId>) {
        while let Some(id) = stalled.pop() {
            if registry.unregister(id.as_str()).is_none() {
                continue;
            }
            info!("Evicted stalled connection {}", id);
            let notice = ServerMessage::UserDisconnected {
                client_id: id.clone(),
            };
            self.broadcast_except(registry, &id, notice, &mut stalled);
        }
    }

    pub fn stats(&self) -> RelayStats {
        let registry = self.registry.lock();
        RelayStats {
            connections: registry.len(),
            publishers: registry.publisher_count(),
        }
    }

    /// Current publisher slot holders in join order
    pub fn publisher_ids(&self) -> Vec<ConnectionId> {
        self.registry.lock().publisher_ids()
    }

    pub fn is_registered(&self, id: &str) -> bool {
        self.registry.lock().contains(id)
    }
}

impl Default for SignalRouter {
    fn default() -> Self {
        Self::from_config(&RelayConfig::default())
    }
}
