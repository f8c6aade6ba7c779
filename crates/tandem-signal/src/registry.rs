//! Registry of joined connections
//!
//! A connection is present here if and only if it has completed the join
//! handshake. Publishers that won a slot are also tracked in join order; the
//! slot count never exceeds the configured maximum.

use std::collections::HashMap;
use std::time::Instant;

use tandem_core::ConnectionId;

use crate::messages::Role;
use crate::outbox::Outbox;

/// A joined connection
#[derive(Debug)]
pub struct Connection {
    pub id: ConnectionId,
    pub role: Role,
    pub outbox: Outbox,
    pub joined_at: Instant,
}

/// Joined connections and publisher slots
#[derive(Debug)]
pub struct Registry {
    connections: HashMap<ConnectionId, Connection>,

    /// Slot holders, first-joined first
    publishers: Vec<ConnectionId>,

    max_publishers: usize,
}

impl Registry {
    pub fn new(max_publishers: usize) -> Self {
        Self {
            connections: HashMap::new(),
            publishers: Vec::new(),
            max_publishers,
        }
    }

    /// Register a connection.
    ///
    /// Returns true when the connection took a publisher slot. A publisher
    /// arriving with every slot taken is still registered, without a slot.
    pub fn register(&mut self, id: ConnectionId, role: Role, outbox: Outbox) -> bool {
        let promoted = role == Role::Publisher && self.has_publisher_slot();
        if promoted {
            self.publishers.push(id.clone());
        }

        self.connections.insert(
            id.clone(),
            Connection {
                id,
                role,
                outbox,
                joined_at: Instant::now(),
            },
        );
        promoted
    }

    /// Remove a connection; no-op if absent
    pub fn unregister(&mut self, id: &str) -> Option<Connection> {
        self.publishers.retain(|p| p.as_str() != id);
        self.connections.remove(id)
    }

    pub fn get(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    /// Iterate over every registered connection
    pub fn all(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    /// Publisher slot holders in join order
    pub fn publisher_ids(&self) -> Vec<ConnectionId> {
        self.publishers.clone()
    }

    /// Connections registered with the subscriber role
    pub fn subscriber_ids(&self) -> Vec<ConnectionId> {
        self.connections
            .values()
            .filter(|c| c.role == Role::Subscriber)
            .map(|c| c.id.clone())
            .collect()
    }

    pub fn publisher_count(&self) -> usize {
        self.publishers.len()
    }

    pub fn has_publisher_slot(&self) -> bool {
        self.publishers.len() < self.max_publishers
    }

    pub fn max_publishers(&self) -> usize {
        self.max_publishers
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}
