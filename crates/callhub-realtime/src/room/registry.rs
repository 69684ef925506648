//! Room registry: members of every active chat room.

use std::collections::HashSet;

use dashmap::DashMap;

use callhub_core::types::{ChatId, ConnectionId};

use super::membership::MembershipTracker;

/// Registry of active chat rooms.
///
/// A room exists while it has at least one member.
#[derive(Debug, Default)]
pub struct RoomRegistry {
    /// Room → member connections.
    rooms: DashMap<ChatId, HashSet<ConnectionId>>,
    /// Reverse index.
    memberships: MembershipTracker,
}

impl RoomRegistry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a connection to a room. Returns false if it was already a member.
    pub fn join(&self, chat_id: ChatId, conn_id: ConnectionId) -> bool {
        let inserted = self.rooms.entry(chat_id.clone()).or_default().insert(conn_id);
        self.memberships.add(conn_id, chat_id);
        inserted
    }

    /// Removes a connection from a room.
    pub fn leave(&self, chat_id: &ChatId, conn_id: ConnectionId) {
        self.detach(chat_id, conn_id);
        self.memberships.remove(conn_id, chat_id);
    }

    /// Removes a connection from every room it joined.
    pub fn leave_all(&self, conn_id: ConnectionId) -> usize {
        let rooms = self.memberships.remove_all(conn_id);
        for chat_id in &rooms {
            self.detach(chat_id, conn_id);
        }
        rooms.len()
    }

    fn detach(&self, chat_id: &ChatId, conn_id: ConnectionId) {
        let emptied = match self.rooms.get_mut(chat_id) {
            Some(mut members) => {
                members.remove(&conn_id);
                members.is_empty()
            }
            None => false,
        };
        if emptied {
            self.rooms.remove_if(chat_id, |_, members| members.is_empty());
        }
    }

    /// Members of a room other than `except`.
    pub fn members_except(&self, chat_id: &ChatId, except: ConnectionId) -> Vec<ConnectionId> {
        self.rooms
            .get(chat_id)
            .map(|members| members.iter().copied().filter(|id| *id != except).collect())
            .unwrap_or_default()
    }

    /// Whether a connection is in a room.
    pub fn is_member(&self, chat_id: &ChatId, conn_id: ConnectionId) -> bool {
        self.memberships.contains(conn_id, chat_id)
    }

    /// Number of rooms a connection has joined.
    pub fn membership_count(&self, conn_id: ConnectionId) -> usize {
        self.memberships.count(conn_id)
    }

    /// Number of active rooms.
    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }
}
