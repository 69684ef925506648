//! Presence registry: maps a logical user to their live connection.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::Utc;
use tracing::{debug, info};

use callhub_core::types::{ConnectionId, MediaAddress, UserId};

use crate::connection::handle::ConnectionHandle;

use super::entry::{PresenceEntry, PresenceSnapshot};

/// Both indices live under one lock so no operation can observe one
/// updated without the other.
#[derive(Debug, Default)]
struct RegistryState {
    /// User ID → current entry.
    by_user: HashMap<UserId, PresenceEntry>,
    /// Connection ID → user it registered (only current registrations).
    by_connection: HashMap<ConnectionId, UserId>,
}

/// Single source of truth for "who can be called and how to reach them".
///
/// Exactly one entry per user; the last registration wins. Every operation
/// takes the same mutex, so a `register` and a `remove` racing on a
/// reconnect can never interleave.
#[derive(Debug, Default)]
pub struct PresenceRegistry {
    state: Mutex<RegistryState>,
}

impl PresenceRegistry {
    /// Create an empty registry
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        // Every critical section leaves both maps consistent, so the data
        // behind a poisoned lock is still valid.
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Register (or re-register) a user on a connection.
    ///
    /// Overwrites any prior entry for the user. Returns the ID of the
    /// connection that was displaced, if it differs from the new one.
    pub fn register(
        &self,
        user_id: UserId,
        connection: Arc<ConnectionHandle>,
        media_address: MediaAddress,
    ) -> Option<ConnectionId> {
        let conn_id = connection.id;
        let entry = PresenceEntry {
            user_id: user_id.clone(),
            connection,
            media_address,
            registered_at: Utc::now(),
        };

        let mut state = self.lock();

        // A connection that re-registers under another identity gives up
        // its previous one.
        if let Some(previous_user) = state.by_connection.insert(conn_id, user_id.clone()) {
            if previous_user != user_id
                && state
                    .by_user
                    .get(&previous_user)
                    .is_some_and(|e| e.connection.id == conn_id)
            {
                state.by_user.remove(&previous_user);
            }
        }

        let displaced = state
            .by_user
            .insert(user_id.clone(), entry)
            .map(|prev| prev.connection.id)
            .filter(|prev_conn| *prev_conn != conn_id);

        if let Some(prev_conn) = displaced {
            state.by_connection.remove(&prev_conn);
            info!(
                user_id = %user_id,
                conn_id = %conn_id,
                displaced = %prev_conn,
                "Presence re-registered on a new connection"
            );
        } else {
            debug!(user_id = %user_id, conn_id = %conn_id, "Presence registered");
        }

        displaced
    }

    /// Look up a user. `None` means not currently reachable.
    pub fn resolve(&self, user_id: &UserId) -> Option<PresenceEntry> {
        self.lock().by_user.get(user_id).cloned()
    }

    /// Drop the registration owned by a closing connection.
    ///
    /// Only removes the user's entry if it still points at `conn_id`, so a
    /// late close for a superseded connection leaves the newer registration
    /// in place. Returns the user that went offline.
    pub fn remove(&self, conn_id: &ConnectionId) -> Option<UserId> {
        let mut state = self.lock();
        let user_id = state.by_connection.remove(conn_id)?;

        let owns_entry = state
            .by_user
            .get(&user_id)
            .is_some_and(|e| e.connection.id == *conn_id);
        if !owns_entry {
            return None;
        }

        state.by_user.remove(&user_id);
        debug!(user_id = %user_id, conn_id = %conn_id, "Presence removed");
        Some(user_id)
    }

    /// Whether a user currently has an entry.
    pub fn is_registered(&self, user_id: &UserId) -> bool {
        self.lock().by_user.contains_key(user_id)
    }

    /// Number of reachable users.
    pub fn len(&self) -> usize {
        self.lock().by_user.len()
    }

    /// Whether nobody is registered.
    pub fn is_empty(&self) -> bool {
        self.lock().by_user.is_empty()
    }

    /// Snapshot of all entries, sorted by user.
    pub fn entries(&self) -> Vec<PresenceSnapshot> {
        let mut entries: Vec<PresenceSnapshot> = self
            .lock()
            .by_user
            .values()
            .map(PresenceEntry::snapshot)
            .collect();
        entries.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        entries
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn conn(user: &str) -> Arc<ConnectionHandle> {
        let (tx, _rx) = mpsc::channel(4);
        Arc::new(ConnectionHandle::new(UserId::from(user), user.to_string(), tx))
    }

    #[test]
    fn test_last_writer_wins() {
        let registry = PresenceRegistry::new();
        let user = UserId::from("U");
        let first = conn("U");
        let second = conn("U");

        assert_eq!(
            registry.register(user.clone(), first.clone(), MediaAddress::from("m1")),
            None
        );
        assert_eq!(
            registry.register(user.clone(), second.clone(), MediaAddress::from("m2")),
            Some(first.id)
        );

        let entry = registry.resolve(&user).expect("registered");
        assert_eq!(entry.connection_id(), second.id);
        assert_eq!(entry.media_address, MediaAddress::from("m2"));
        assert_eq!(registry.len(), 1);
    }

    #[test]
    fn test_stale_close_keeps_newer_registration() {
        let registry = PresenceRegistry::new();
        let user = UserId::from("U");
        let conn_a = conn("U");
        let conn_b = conn("U");

        registry.register(user.clone(), conn_a.clone(), MediaAddress::from("mA"));
        registry.register(user.clone(), conn_b.clone(), MediaAddress::from("mB"));

        assert_eq!(registry.remove(&conn_a.id), None);
        let entry = registry.resolve(&user).expect("still reachable");
        assert_eq!(entry.connection_id(), conn_b.id);

        assert_eq!(registry.remove(&conn_b.id), Some(user.clone()));
        assert!(registry.resolve(&user).is_none());
    }

    #[test]
    fn test_register_is_idempotent() {
        let registry = PresenceRegistry::new();
        let user = UserId::from("U");
        let c = conn("U");

        registry.register(user.clone(), c.clone(), MediaAddress::from("m"));
        assert_eq!(
            registry.register(user.clone(), c.clone(), MediaAddress::from("m")),
            None
        );
        assert_eq!(registry.len(), 1);
        assert_eq!(registry.remove(&c.id), Some(user));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_reregistering_connection_under_new_identity_frees_old() {
        let registry = PresenceRegistry::new();
        let c = conn("U");

        registry.register(UserId::from("old"), c.clone(), MediaAddress::from("m"));
        registry.register(UserId::from("new"), c.clone(), MediaAddress::from("m"));

        assert!(!registry.is_registered(&UserId::from("old")));
        assert!(registry.is_registered(&UserId::from("new")));
    }

    #[test]
    fn test_remove_unknown_connection() {
        let registry = PresenceRegistry::new();
        assert_eq!(registry.remove(&ConnectionId::new()), None);
    }

    #[test]
    fn test_concurrent_reconnects_leave_single_consistent_entry() {
        let registry = Arc::new(PresenceRegistry::new());
        let user = UserId::from("U");
        let conns: Vec<_> = (0..16).map(|_| conn("U")).collect();

        std::thread::scope(|scope| {
            for c in &conns {
                let registry = registry.clone();
                let user = user.clone();
                scope.spawn(move || {
                    registry.register(user.clone(), c.clone(), MediaAddress::from("m"));
                    registry.remove(&c.id);
                    registry.register(user, c.clone(), MediaAddress::from("m"));
                });
            }
        });

        let entry = registry.resolve(&user).expect("someone registered last");
        for c in conns.iter().filter(|c| c.id != entry.connection_id()) {
            assert_eq!(registry.remove(&c.id), None);
        }
        assert_eq!(registry.remove(&entry.connection_id()), Some(user));
        assert!(registry.is_empty());
    }
}
