//! Events pushed by the server.

use serde::{Deserialize, Serialize};

use crate::types::{ChatId, MediaAddress, UserId};

/// Messages sent by the server to the client.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    /// Someone is calling this client.
    IncomingCall {
        /// Caller.
        from: UserId,
        /// Caller's media address as registered.
        media_address: MediaAddress,
        /// Caller display name.
        caller_name: String,
    },
    /// The callee accepted; open the peer session to this address.
    CallAccepted {
        /// Callee's media address.
        media_address: MediaAddress,
    },
    /// The other party cancelled, rejected, or hung up.
    CallEnded {},
    /// Another member of a joined room is typing.
    UserTyping {
        /// Room id.
        chat_id: ChatId,
        /// Typing user.
        user_id: UserId,
    },
    /// Ping (server keepalive).
    Ping {
        /// Server timestamp (unix millis).
        timestamp: i64,
    },
    /// Error message.
    Error {
        /// Error code.
        code: String,
        /// Error description.
        message: String,
    },
}

impl ServerEvent {
    /// Returns the wire name of the event.
    pub fn name(&self) -> &'static str {
        match self {
            Self::IncomingCall { .. } => "incoming-call",
            Self::CallAccepted { .. } => "call-accepted",
            Self::CallEnded {} => "call-ended",
            Self::UserTyping { .. } => "user-typing",
            Self::Ping { .. } => "ping",
            Self::Error { .. } => "error",
        }
    }

    /// Builds an error frame.
    pub fn error(code: &str, message: impl Into<String>) -> Self {
        Self::Error {
            code: code.to_string(),
            message: message.into(),
        }
    }
}
