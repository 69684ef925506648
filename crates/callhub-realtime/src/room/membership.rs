//! Membership tracking: which rooms each connection has joined.

use std::collections::HashSet;

use dashmap::DashMap;

use callhub_core::types::{ChatId, ConnectionId};

/// Reverse index: connection → joined rooms.
#[derive(Debug, Default)]
pub struct MembershipTracker {
    conn_to_rooms: DashMap<ConnectionId, HashSet<ChatId>>,
}

impl MembershipTracker {
    /// Creates a new tracker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a membership.
    pub fn add(&self, conn_id: ConnectionId, chat_id: ChatId) {
        self.conn_to_rooms.entry(conn_id).or_default().insert(chat_id);
    }

    /// Removes a membership.
    pub fn remove(&self, conn_id: ConnectionId, chat_id: &ChatId) {
        let emptied = match self.conn_to_rooms.get_mut(&conn_id) {
            Some(mut rooms) => {
                rooms.remove(chat_id);
                rooms.is_empty()
            }
            None => false,
        };
        if emptied {
            self.conn_to_rooms.remove_if(&conn_id, |_, rooms| rooms.is_empty());
        }
    }

    /// Returns the number of rooms a connection is in.
    pub fn count(&self, conn_id: ConnectionId) -> usize {
        self.conn_to_rooms
            .get(&conn_id)
            .map(|entry| entry.value().len())
            .unwrap_or(0)
    }

    /// Whether a connection has joined a room.
    pub fn contains(&self, conn_id: ConnectionId, chat_id: &ChatId) -> bool {
        self.conn_to_rooms
            .get(&conn_id)
            .is_some_and(|entry| entry.value().contains(chat_id))
    }

    /// Removes every membership for a connection, returning the rooms.
    pub fn remove_all(&self, conn_id: ConnectionId) -> HashSet<ChatId> {
        self.conn_to_rooms
            .remove(&conn_id)
            .map(|(_, rooms)| rooms)
            .unwrap_or_default()
    }
}
