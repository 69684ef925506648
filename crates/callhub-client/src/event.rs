//! Inputs of the call state machine.

use callhub_core::result::AppResult;
use callhub_core::signal::ServerEvent;
use callhub_core::types::UserId;

use crate::media::{CaptureStream, MediaEventKind, MediaSessionId, PeerSession};

/// Everything that can change the call session. All of it arrives on one
/// queue, so transitions never overlap.
#[derive(Debug)]
pub enum CallEvent {
    /// Local user starts a call.
    Dial {
        /// Callee
        to: UserId,
        /// Callee name for the UI
        display_name: String,
    },
    /// Local user accepts the ringing call.
    Accept,
    /// Local user rejects the ringing call.
    Reject,
    /// Local user cancels or ends the call.
    Hangup,
    /// Frame from the signaling server.
    Signal(ServerEvent),
    /// Inbound peer session offered by the media library.
    PeerOffered(Box<dyn PeerSession>),
    /// Peer session lifecycle callback.
    Media {
        /// Session the event belongs to
        session_id: MediaSessionId,
        /// What happened
        kind: MediaEventKind,
    },
    /// Capture acquisition finished.
    CaptureReady {
        /// Attempt that requested it
        attempt: u64,
        /// The capture or the failure
        result: AppResult<Box<dyn CaptureStream>>,
    },
    /// Ring timer fired.
    RingTimeout {
        /// Attempt that armed it
        attempt: u64,
    },
    /// Stop the agent, releasing everything.
    Shutdown,
}

impl CallEvent {
    /// Short name for logs.
    pub fn name(&self) -> &'static str {
        match self {
            Self::Dial { .. } => "dial",
            Self::Accept => "accept",
            Self::Reject => "reject",
            Self::Hangup => "hangup",
            Self::Signal(event) => event.name(),
            Self::PeerOffered(_) => "peer-offered",
            Self::Media { .. } => "media",
            Self::CaptureReady { .. } => "capture-ready",
            Self::RingTimeout { .. } => "ring-timeout",
            Self::Shutdown => "shutdown",
        }
    }
}
