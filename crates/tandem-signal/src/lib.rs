//! Tandem Signal Server
//!
//! Signaling relay that lets WebRTC peers find each other and exchange
//! session descriptions and ICE candidates. Media never passes through it.
//!
//! # Protocol
//!
//! 1. A client connects over WebSocket and sends `join`, as a streamer
//!    (publisher) or a watcher (subscriber). At most two streamers hold a slot.
//! 2. The relay tells the right parties to `create-offer` toward each other:
//!    streamers toward every watcher, and the first streamer toward the second.
//! 3. Clients exchange `offer`, `answer`, and `ice-candidate` messages through
//!    the relay, addressed by `targetId`.
//! 4. When a connection closes, everyone else gets `user-disconnected`.

pub mod http;
pub mod messages;
pub mod outbox;
pub mod registry;
pub mod router;
pub mod server;

pub use messages::{ClientMessage, ErrorCode, Role, ServerMessage};
pub use outbox::{Delivery, Outbox};
pub use registry::{Connection, Registry};
pub use router::{RelayStats, Session, SignalRouter};
pub use server::SignalServer;
