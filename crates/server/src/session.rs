//! Connection registry.
//!
//! Tracks every open connection from accept until close. A connection
//! becomes a world session only once it joins; until then it receives
//! nothing and may only send a join.

use std::collections::BTreeMap;

use lumberyard_sim::SessionId;

/// Where a connection is in the join handshake.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// Accepted, no join received yet.
    Connected,
    /// Join accepted into the intent queue, not yet applied.
    Joining,
    /// Present in the world and receiving broadcasts.
    Joined,
}

/// One open connection.
#[derive(Debug, Clone)]
pub struct Connection {
    pub id: SessionId,
    pub state: ConnectionState,
}

impl Connection {
    pub fn is_joined(&self) -> bool {
        self.state == ConnectionState::Joined
    }

    /// Whether non-join intents from this connection may be queued.
    pub fn may_send(&self) -> bool {
        self.state != ConnectionState::Connected
    }
}

/// Open connections keyed by session id. Ids are never reused.
#[derive(Debug)]
pub struct ConnectionRegistry {
    connections: BTreeMap<SessionId, Connection>,
    next_id: SessionId,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            connections: BTreeMap::new(),
            next_id: 1,
        }
    }

    /// Register a new connection and hand out its id.
    pub fn connect(&mut self) -> SessionId {
        let id = self.next_id;
        self.next_id += 1;
        self.connections.insert(id, Connection {
            id,
            state: ConnectionState::Connected,
        });
        id
    }

    pub fn get(&self, id: SessionId) -> Option<&Connection> {
        self.connections.get(&id)
    }

    /// Move a connection forward in the handshake. Never moves backward.
    pub fn advance(&mut self, id: SessionId, state: ConnectionState) -> bool {
        let Some(connection) = self.connections.get_mut(&id) else {
            return false;
        };
        let rank = |s: ConnectionState| match s {
            ConnectionState::Connected => 0,
            ConnectionState::Joining => 1,
            ConnectionState::Joined => 2,
        };
        if rank(state) > rank(connection.state) {
            connection.state = state;
        }
        true
    }

    pub fn remove(&mut self, id: SessionId) -> Option<Connection> {
        self.connections.remove(&id)
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }

    /// Joined session ids, ascending.
    pub fn joined(&self) -> impl Iterator<Item = SessionId> + '_ {
        self.connections
            .values()
            .filter(|c| c.is_joined())
            .map(|c| c.id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ids_are_unique_and_not_reused() {
        let mut registry = ConnectionRegistry::new();
        let a = registry.connect();
        let b = registry.connect();
        assert_ne!(a, b);

        registry.remove(a);
        let c = registry.connect();
        assert!(c > b);
        assert_eq!(registry.len(), 2);
    }

    #[test]
    fn test_handshake_only_moves_forward() {
        let mut registry = ConnectionRegistry::new();
        let id = registry.connect();
        assert!(!registry.get(id).unwrap().may_send());

        registry.advance(id, ConnectionState::Joined);
        registry.advance(id, ConnectionState::Joining);
        assert!(registry.get(id).unwrap().is_joined());

        assert!(!registry.advance(99, ConnectionState::Joined));
    }

    #[test]
    fn test_joined_excludes_pending_connections() {
        let mut registry = ConnectionRegistry::new();
        let a = registry.connect();
        let b = registry.connect();
        let c = registry.connect();
        registry.advance(a, ConnectionState::Joined);
        registry.advance(b, ConnectionState::Joining);
        registry.advance(c, ConnectionState::Joined);

        assert_eq!(registry.joined().collect::<Vec<_>>(), vec![a, c]);
    }
}
