//! Traits over the external peer-media library.
//!
//! The call machine never touches audio. It holds a [`CaptureStream`] while
//! the microphone is in use and a [`PeerSession`] while a direct session is
//! open, and hears about session lifecycle through a [`MediaEventSink`].

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use callhub_core::result::AppResult;
use callhub_core::types::MediaAddress;

use crate::event::CallEvent;

/// Backend-assigned identifier of a peer session. Unique per backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MediaSessionId(pub u64);

impl fmt::Display for MediaSessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "media-{}", self.0)
    }
}

/// An acquired local audio capture.
pub trait CaptureStream: Send + fmt::Debug {
    /// Stop every track and release the device. Consumes the capture, so it
    /// can only happen once.
    fn stop(self: Box<Self>);
}

/// A pending or established direct media session with the peer.
pub trait PeerSession: Send + fmt::Debug {
    /// Session id used to match lifecycle events.
    fn id(&self) -> MediaSessionId;

    /// Answer an inbound offer with the local capture.
    fn answer(&mut self, capture: &dyn CaptureStream, sink: MediaEventSink) -> AppResult<()>;

    /// Close the session (or decline the offer if never answered).
    fn close(self: Box<Self>);
}

/// The peer-media library.
#[async_trait]
pub trait MediaBackend: Send + Sync + fmt::Debug + 'static {
    /// Address other clients use to open a session to us.
    fn media_address(&self) -> MediaAddress;

    /// Acquire the microphone. May wait on a permission prompt and may fail.
    async fn acquire_capture(&self) -> AppResult<Box<dyn CaptureStream>>;

    /// Open an outbound session to `remote` using the local capture.
    fn open_session(
        &self,
        remote: &MediaAddress,
        capture: &dyn CaptureStream,
        sink: MediaEventSink,
    ) -> AppResult<Box<dyn PeerSession>>;
}

/// Lifecycle callbacks of a peer session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MediaEventKind {
    /// Remote audio is available; bind it for playback.
    RemoteStream,
    /// Session closed.
    Closed,
    /// Session failed.
    Error(String),
}

/// Posts media lifecycle events onto the call agent's queue.
///
/// Safe to call from any thread; events for sessions that are no longer
/// current are ignored by the machine.
#[derive(Debug, Clone)]
pub struct MediaEventSink {
    tx: mpsc::UnboundedSender<CallEvent>,
}

impl MediaEventSink {
    pub(crate) fn new(tx: mpsc::UnboundedSender<CallEvent>) -> Self {
        Self { tx }
    }

    fn post(&self, session_id: MediaSessionId, kind: MediaEventKind) {
        if self.tx.send(CallEvent::Media { session_id, kind }).is_err() {
            tracing::debug!(session = %session_id, "Call agent gone, media event dropped");
        }
    }

    /// Remote stream became available.
    pub fn remote_stream(&self, session_id: MediaSessionId) {
        self.post(session_id, MediaEventKind::RemoteStream);
    }

    /// Session closed.
    pub fn closed(&self, session_id: MediaSessionId) {
        self.post(session_id, MediaEventKind::Closed);
    }

    /// Session failed.
    pub fn error(&self, session_id: MediaSessionId, message: impl Into<String>) {
        self.post(session_id, MediaEventKind::Error(message.into()));
    }
}
