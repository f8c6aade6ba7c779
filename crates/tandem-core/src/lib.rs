//! Tandem Core - shared configuration, error types, and connection identifiers
//!
//! This crate holds the pieces of the relay that carry no networking code:
//! the TOML configuration model, the error enums, and the id generator used
//! to name every accepted connection.

pub mod config;
pub mod error;
pub mod id;

pub use config::{PublisherOverflow, RelayConfig, SlowPeerPolicy};
pub use error::*;
pub use id::{ConnectionId, IdGenerator};

/// Default listening port (overridden by `PORT`)
pub const DEFAULT_PORT: u16 = 8000;

/// Publisher slots available at once
pub const DEFAULT_MAX_PUBLISHERS: usize = 2;

/// Per-connection outbound queue capacity
pub const DEFAULT_OUTBOUND_QUEUE: usize = 64;
