//! Result of routing one signaling event.

use std::fmt;

use callhub_core::types::{ConnectionId, UserId};

/// What happened to one relayed event.
///
/// A drop is a normal outcome, never an error: the sender is not told, and
/// the calling client relies on its own ring timeout.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RelayOutcome {
    /// Forwarded to the target's registered connection.
    Delivered {
        /// Target user
        to: UserId,
        /// Connection that received the event
        connection: ConnectionId,
    },
    /// Not forwarded.
    Dropped(DropReason),
}

impl RelayOutcome {
    /// Whether the event reached its target's queue.
    pub fn is_delivered(&self) -> bool {
        matches!(self, Self::Delivered { .. })
    }
}

/// Why an event was not forwarded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DropReason {
    /// Target has no presence entry.
    CalleeUnreachable,
    /// The caller's own registration is missing or belongs to another connection.
    CallerNotRegistered,
    /// `from` does not match the sending connection's identity.
    SpoofedCaller,
    /// Caller and callee are the same user.
    SelfCall,
    /// Target connection is gone or its buffer is full.
    SendFailed,
}

impl DropReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CalleeUnreachable => "callee_unreachable",
            Self::CallerNotRegistered => "caller_not_registered",
            Self::SpoofedCaller => "spoofed_caller",
            Self::SelfCall => "self_call",
            Self::SendFailed => "send_failed",
        }
    }
}

impl fmt::Display for DropReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
