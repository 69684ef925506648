//! Presence entry definitions.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use callhub_core::types::{ConnectionId, MediaAddress, UserId};

use crate::connection::handle::ConnectionHandle;

/// One reachable user: the connection that registered last, plus the media
/// address the peer library assigned to that client.
#[derive(Debug, Clone)]
pub struct PresenceEntry {
    /// Registered user.
    pub user_id: UserId,
    /// Connection that receives this user's signaling events.
    pub connection: Arc<ConnectionHandle>,
    /// Address for opening a direct media session to this user.
    pub media_address: MediaAddress,
    /// When the registration happened.
    pub registered_at: DateTime<Utc>,
}

impl PresenceEntry {
    /// ID of the owning connection.
    pub fn connection_id(&self) -> ConnectionId {
        self.connection.id
    }

    /// Serializable view without the connection handle.
    pub fn snapshot(&self) -> PresenceSnapshot {
        PresenceSnapshot {
            user_id: self.user_id.clone(),
            connection_id: self.connection.id,
            media_address: self.media_address.clone(),
            registered_at: self.registered_at,
        }
    }
}

/// Serializable presence info.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PresenceSnapshot {
    /// User ID
    pub user_id: UserId,
    /// Owning connection
    pub connection_id: ConnectionId,
    /// Media address
    pub media_address: MediaAddress,
    /// Registration time
    pub registered_at: DateTime<Utc>,
}
