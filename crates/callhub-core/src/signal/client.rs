//! Events emitted by clients.

use serde::{Deserialize, Serialize};

use crate::types::{ChatId, MediaAddress, UserId};

/// Messages sent by the client to the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    /// Publish this connection as the reachable endpoint for a user.
    Register {
        /// User being registered.
        user_id: UserId,
        /// Address the peer-media library assigned to this client.
        media_address: MediaAddress,
    },
    /// Ask the server to ring another user.
    CallRequest {
        /// Callee.
        to: UserId,
        /// Caller.
        from: UserId,
        /// Display name shown on the callee's ringing screen.
        caller_name: String,
    },
    /// Accept a call that is ringing locally.
    CallAccept {
        /// The original caller.
        to: UserId,
        /// Callee's media address, used by the caller to open the session.
        media_address: MediaAddress,
    },
    /// Cancel, reject, or hang up.
    CallEnd {
        /// The other party.
        to: UserId,
    },
    /// Join a chat room.
    JoinChat {
        /// Room id.
        chat_id: ChatId,
    },
    /// Leave a chat room.
    LeaveChat {
        /// Room id.
        chat_id: ChatId,
    },
    /// Typing indicator for a chat room.
    Typing {
        /// Room id.
        chat_id: ChatId,
    },
    /// Pong response to a server ping.
    Pong {
        /// Echoed timestamp.
        timestamp: i64,
    },
}

impl ClientEvent {
    /// Returns the wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Register { .. } => "register",
            Self::CallRequest { .. } => "call-request",
            Self::CallAccept { .. } => "call-accept",
            Self::CallEnd { .. } => "call-end",
            Self::JoinChat { .. } => "join-chat",
            Self::LeaveChat { .. } => "leave-chat",
            Self::Typing { .. } => "typing",
            Self::Pong { .. } => "pong",
        }
    }
}
