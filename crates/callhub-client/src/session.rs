//! Client-local call session types.

use serde::{Deserialize, Serialize};

use callhub_core::types::UserId;

/// Externally visible call status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallStatus {
    /// No call.
    #[default]
    Idle,
    /// Outgoing call waiting for the callee.
    Calling,
    /// Incoming call waiting for the local user.
    Ringing,
    /// Call established.
    Connected,
}

impl std::fmt::Display for CallStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Idle => "idle",
            Self::Calling => "calling",
            Self::Ringing => "ringing",
            Self::Connected => "connected",
        };
        f.write_str(s)
    }
}

/// The other party of a call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PeerInfo {
    /// Peer identity.
    pub user_id: UserId,
    /// Name shown in the UI.
    pub display_name: String,
}

/// Who this client is.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocalIdentity {
    /// Our user id (sent as `from` in call-request).
    pub user_id: UserId,
    /// Our display name (sent as `callerName`).
    pub display_name: String,
}

/// Read-only view of the call session, published after every transition.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct CallSnapshot {
    /// Current status
    pub status: CallStatus,
    /// Peer, present in every status except idle
    pub peer: Option<PeerInfo>,
    /// Whether a local capture is held
    pub has_capture: bool,
    /// Whether a peer media session is open
    pub has_session: bool,
}
