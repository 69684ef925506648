//! Call agent: the task that owns the state machine, and the handle the UI
//! and transport use to feed it.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::sync::{broadcast, mpsc, watch};
use tracing::{debug, info};

use callhub_core::config::CallConfig;
use callhub_core::error::AppError;
use callhub_core::result::AppResult;
use callhub_core::signal::{ClientEvent, ServerEvent};
use callhub_core::types::UserId;

use crate::event::CallEvent;
use crate::machine::{CallStateMachine, Effect};
use crate::media::{MediaBackend, MediaEventSink, PeerSession};
use crate::session::{CallSnapshot, CallStatus, LocalIdentity, PeerInfo};

/// Why a call went back to idle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EndReason {
    /// Local user cancelled or hung up.
    LocalHangup,
    /// Local user rejected the incoming call.
    Rejected,
    /// The peer ended it.
    RemoteEnded,
    /// Capture or peer session failed.
    MediaFailed,
    /// Nobody answered in time.
    Timeout,
}

/// User-facing notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum CallNotice {
    /// Someone is calling.
    Incoming {
        /// Caller
        peer: PeerInfo,
    },
    /// Call established.
    Connected {
        /// Peer
        peer: PeerInfo,
    },
    /// Remote audio can be played.
    RemoteStreamReady,
    /// Microphone could not be acquired.
    MediaUnavailable {
        /// Backend message
        message: String,
    },
    /// Call is over.
    Ended {
        /// Why
        reason: EndReason,
    },
}

/// Agent settings.
#[derive(Debug, Clone)]
pub struct AgentConfig {
    /// How long calling/ringing may last before giving up.
    pub ring_timeout: Duration,
    /// Notice channel capacity.
    pub notice_buffer: usize,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            ring_timeout: Duration::from_secs(30),
            notice_buffer: 32,
        }
    }
}

impl From<&CallConfig> for AgentConfig {
    fn from(config: &CallConfig) -> Self {
        Self {
            ring_timeout: Duration::from_secs(config.ring_timeout_seconds),
            ..Self::default()
        }
    }
}

/// Owns the [`CallStateMachine`] and runs every transition on one task.
#[derive(Debug)]
pub struct CallAgent {
    machine: CallStateMachine,
    backend: Arc<dyn MediaBackend>,
    events_tx: mpsc::UnboundedSender<CallEvent>,
    events_rx: mpsc::UnboundedReceiver<CallEvent>,
    outbound: mpsc::UnboundedSender<ClientEvent>,
    notices: broadcast::Sender<CallNotice>,
    snapshot: watch::Sender<CallSnapshot>,
    config: AgentConfig,
}

impl CallAgent {
    /// Builds an agent and its handle.
    ///
    /// `outbound` receives every frame the machine wants sent to the
    /// signaling server.
    pub fn new(
        identity: LocalIdentity,
        backend: Arc<dyn MediaBackend>,
        outbound: mpsc::UnboundedSender<ClientEvent>,
        config: AgentConfig,
    ) -> (Self, CallHandle) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (notices, _) = broadcast::channel(config.notice_buffer.max(1));
        let (snapshot, snapshot_rx) = watch::channel(CallSnapshot::default());

        let machine = CallStateMachine::new(
            identity.clone(),
            backend.clone(),
            MediaEventSink::new(events_tx.clone()),
        );

        let handle = CallHandle {
            identity,
            events: events_tx.clone(),
            notices: notices.clone(),
            snapshot: snapshot_rx,
        };

        let agent = Self {
            machine,
            backend,
            events_tx,
            events_rx,
            outbound,
            notices,
            snapshot,
            config,
        };
        (agent, handle)
    }

    /// Runs until [`CallHandle::shutdown`]. Media is released on exit.
    pub async fn run(mut self) {
        info!("Call agent started");

        while let Some(event) = self.events_rx.recv().await {
            if matches!(event, CallEvent::Shutdown) {
                self.machine.handle(event);
                self.publish();
                break;
            }

            let effects = self.machine.handle(event);
            for effect in effects {
                self.execute(effect);
            }
            self.publish();
        }

        info!("Call agent stopped");
    }

    fn publish(&self) {
        let next = self.machine.snapshot();
        self.snapshot.send_if_modified(|current| {
            if *current == next {
                false
            } else {
                *current = next;
                true
            }
        });
    }

    fn execute(&self, effect: Effect) {
        match effect {
            Effect::Send(event) => {
                debug!(event = event.name(), "Signaling out");
                if self.outbound.send(event).is_err() {
                    debug!("Signaling link closed, frame dropped");
                }
            }
            Effect::Notify(notice) => {
                let _ = self.notices.send(notice);
            }
            Effect::AcquireCapture { attempt } => {
                let backend = self.backend.clone();
                let tx = self.events_tx.clone();
                tokio::spawn(async move {
                    let result = backend.acquire_capture().await;
                    if let Err(mpsc::error::SendError(CallEvent::CaptureReady {
                        result: Ok(capture),
                        ..
                    })) = tx.send(CallEvent::CaptureReady { attempt, result })
                    {
                        // Agent is gone; nobody else will release it.
                        capture.stop();
                    }
                });
            }
            Effect::StartRingTimer { attempt } => {
                let tx = self.events_tx.clone();
                let timeout = self.config.ring_timeout;
                tokio::spawn(async move {
                    tokio::time::sleep(timeout).await;
                    let _ = tx.send(CallEvent::RingTimeout { attempt });
                });
            }
        }
    }
}

/// Cheap, cloneable front-end to a running [`CallAgent`].
#[derive(Debug, Clone)]
pub struct CallHandle {
    identity: LocalIdentity,
    events: mpsc::UnboundedSender<CallEvent>,
    notices: broadcast::Sender<CallNotice>,
    snapshot: watch::Receiver<CallSnapshot>,
}

impl CallHandle {
    fn post(&self, event: CallEvent) -> AppResult<()> {
        self.events
            .send(event)
            .map_err(|_| AppError::service_unavailable("Call agent is not running"))
    }

    /// Our identity.
    pub fn identity(&self) -> &LocalIdentity {
        &self.identity
    }

    /// Start a call.
    pub fn call(&self, to: UserId, display_name: impl Into<String>) -> AppResult<()> {
        self.post(CallEvent::Dial {
            to,
            display_name: display_name.into(),
        })
    }

    /// Accept the ringing call.
    pub fn accept(&self) -> AppResult<()> {
        self.post(CallEvent::Accept)
    }

    /// Reject the ringing call.
    pub fn reject(&self) -> AppResult<()> {
        self.post(CallEvent::Reject)
    }

    /// Cancel or end the current call.
    pub fn hangup(&self) -> AppResult<()> {
        self.post(CallEvent::Hangup)
    }

    /// Feed a frame received from the signaling server.
    pub fn deliver_signal(&self, event: ServerEvent) -> AppResult<()> {
        self.post(CallEvent::Signal(event))
    }

    /// Hand over an inbound session offered by the media library.
    pub fn peer_offered(&self, session: Box<dyn PeerSession>) -> AppResult<()> {
        self.post(CallEvent::PeerOffered(session))
    }

    /// Sink for media lifecycle callbacks.
    pub fn media_sink(&self) -> MediaEventSink {
        MediaEventSink::new(self.events.clone())
    }

    /// Current session view.
    pub fn snapshot(&self) -> CallSnapshot {
        self.snapshot.borrow().clone()
    }

    /// Watch the session view.
    pub fn watch(&self) -> watch::Receiver<CallSnapshot> {
        self.snapshot.clone()
    }

    /// Subscribe to notices.
    pub fn subscribe(&self) -> broadcast::Receiver<CallNotice> {
        self.notices.subscribe()
    }

    /// Wait until the session reaches `status`.
    pub async fn wait_for_status(&self, status: CallStatus) -> AppResult<CallSnapshot> {
        let mut rx = self.snapshot.clone();
        let snapshot = rx
            .wait_for(|s| s.status == status)
            .await
            .map_err(|_| AppError::service_unavailable("Call agent is not running"))?;
        Ok(snapshot.clone())
    }

    /// Stop the agent.
    pub fn shutdown(&self) -> AppResult<()> {
        self.post(CallEvent::Shutdown)
    }
}
