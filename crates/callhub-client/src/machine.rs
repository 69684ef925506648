//! Call state machine: the local view of one call's lifecycle.
//!
//! `idle → calling → connected → idle` for outgoing calls and
//! `idle → ringing → connected → idle` for incoming ones, with a direct
//! return to idle from any state on cancel, remote hangup, media failure or
//! ring timeout. Events that do not fit the current state are ignored.
//!
//! Capture acquisition is the one suspension point. The machine asks for it
//! through [`Effect::AcquireCapture`] and parks in an interstitial phase
//! (`Dialing`, `Answering`) until the matching [`CallEvent::CaptureReady`]
//! arrives. Every reset bumps the attempt counter, so a capture or timer
//! from an abandoned attempt is recognized and released.

use std::sync::Arc;

use tracing::{debug, info, warn};

use callhub_core::signal::{ClientEvent, ServerEvent};
use callhub_core::types::{MediaAddress, UserId};

use crate::agent::{CallNotice, EndReason};
use crate::event::CallEvent;
use crate::media::{
    CaptureStream, MediaBackend, MediaEventKind, MediaEventSink, MediaSessionId, PeerSession,
};
use crate::session::{CallSnapshot, CallStatus, LocalIdentity, PeerInfo};

/// Side effects requested by a transition. The agent executes them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Effect {
    /// Send a frame to the signaling server.
    Send(ClientEvent),
    /// Tell the UI.
    Notify(CallNotice),
    /// Start acquiring the capture for this attempt.
    AcquireCapture {
        /// Attempt id echoed in `CaptureReady`
        attempt: u64,
    },
    /// Arm the ring timer for this attempt.
    StartRingTimer {
        /// Attempt id echoed in `RingTimeout`
        attempt: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Idle,
    /// Outgoing, capture pending. Reported as calling.
    Dialing,
    /// Outgoing, call-request sent.
    Calling,
    /// Incoming, waiting for the local user.
    Ringing,
    /// Incoming, accepted, capture pending. Reported as ringing.
    Answering,
    Connected,
}

/// Owns the call session and every media handle attached to it.
#[derive(Debug)]
pub struct CallStateMachine {
    identity: LocalIdentity,
    backend: Arc<dyn MediaBackend>,
    sink: MediaEventSink,
    phase: Phase,
    attempt: u64,
    peer: Option<PeerInfo>,
    capture: Option<Box<dyn CaptureStream>>,
    session: Option<Box<dyn PeerSession>>,
    /// Inbound offer received before it could be answered.
    pending_offer: Option<Box<dyn PeerSession>>,
}

impl CallStateMachine {
    /// Creates an idle machine.
    pub fn new(identity: LocalIdentity, backend: Arc<dyn MediaBackend>, sink: MediaEventSink) -> Self {
        Self {
            identity,
            backend,
            sink,
            phase: Phase::Idle,
            attempt: 0,
            peer: None,
            capture: None,
            session: None,
            pending_offer: None,
        }
    }

    /// Externally visible status.
    pub fn status(&self) -> CallStatus {
        match self.phase {
            Phase::Idle => CallStatus::Idle,
            Phase::Dialing | Phase::Calling => CallStatus::Calling,
            Phase::Ringing | Phase::Answering => CallStatus::Ringing,
            Phase::Connected => CallStatus::Connected,
        }
    }

    /// Current peer, if any.
    pub fn peer(&self) -> Option<&PeerInfo> {
        self.peer.as_ref()
    }

    /// Read-only view of the session.
    pub fn snapshot(&self) -> CallSnapshot {
        CallSnapshot {
            status: self.status(),
            peer: self.peer.clone(),
            has_capture: self.capture.is_some(),
            has_session: self.session.is_some(),
        }
    }

    /// Applies one event. Returns the side effects for the agent to run.
    pub fn handle(&mut self, event: CallEvent) -> Vec<Effect> {
        let before = self.phase;
        let name = event.name();

        let effects = match event {
            CallEvent::Dial { to, display_name } => self.on_dial(to, display_name),
            CallEvent::Accept => self.on_accept(),
            CallEvent::Reject => self.on_reject(),
            CallEvent::Hangup => self.on_hangup(),
            CallEvent::Signal(signal) => self.on_signal(signal),
            CallEvent::PeerOffered(offer) => self.on_peer_offered(offer),
            CallEvent::Media { session_id, kind } => self.on_media(session_id, kind),
            CallEvent::CaptureReady { attempt, result } => match result {
                Ok(capture) => self.on_capture_ready(attempt, capture),
                Err(e) => self.on_capture_failed(attempt, e.message),
            },
            CallEvent::RingTimeout { attempt } => self.on_ring_timeout(attempt),
            CallEvent::Shutdown => {
                self.reset();
                Vec::new()
            }
        };

        if before != self.phase {
            debug!(event = name, from = ?before, to = ?self.phase, "Call transition");
        }
        effects
    }

    fn on_dial(&mut self, to: UserId, display_name: String) -> Vec<Effect> {
        if self.phase != Phase::Idle {
            debug!(to = %to, status = %self.status(), "Dial ignored, already in a call");
            return Vec::new();
        }
        if to == self.identity.user_id || to.is_blank() {
            debug!(to = %to, "Dial ignored, invalid callee");
            return Vec::new();
        }

        self.attempt += 1;
        self.phase = Phase::Dialing;
        self.peer = Some(PeerInfo {
            user_id: to,
            display_name,
        });
        vec![Effect::AcquireCapture {
            attempt: self.attempt,
        }]
    }

    fn on_accept(&mut self) -> Vec<Effect> {
        if self.phase != Phase::Ringing {
            return Vec::new();
        }
        self.phase = Phase::Answering;
        vec![Effect::AcquireCapture {
            attempt: self.attempt,
        }]
    }

    fn on_reject(&mut self) -> Vec<Effect> {
        match self.phase {
            Phase::Ringing | Phase::Answering => self.end_locally(EndReason::Rejected),
            _ => Vec::new(),
        }
    }

    fn on_hangup(&mut self) -> Vec<Effect> {
        match self.phase {
            Phase::Idle => Vec::new(),
            // call-request not sent yet, so there is nobody to tell.
            Phase::Dialing => {
                self.reset();
                vec![Effect::Notify(CallNotice::Ended {
                    reason: EndReason::LocalHangup,
                })]
            }
            Phase::Ringing | Phase::Answering => self.end_locally(EndReason::Rejected),
            Phase::Calling | Phase::Connected => self.end_locally(EndReason::LocalHangup),
        }
    }

    fn on_signal(&mut self, signal: ServerEvent) -> Vec<Effect> {
        match signal {
            ServerEvent::IncomingCall {
                from,
                media_address: _,
                caller_name,
            } => self.on_incoming_call(from, caller_name),
            ServerEvent::CallAccepted { media_address } => self.on_call_accepted(media_address),
            ServerEvent::CallEnded {} => self.on_call_ended(),
            other => {
                debug!(event = other.name(), "Signal not handled by the call machine");
                Vec::new()
            }
        }
    }

    fn on_incoming_call(&mut self, from: UserId, caller_name: String) -> Vec<Effect> {
        if self.phase != Phase::Idle {
            // Single call at a time. No busy signal: the second caller
            // finds out through their own ring timeout.
            info!(from = %from, status = %self.status(), "Incoming call dropped, line busy");
            return Vec::new();
        }

        self.attempt += 1;
        self.phase = Phase::Ringing;
        let peer = PeerInfo {
            user_id: from,
            display_name: caller_name,
        };
        self.peer = Some(peer.clone());
        vec![
            Effect::Notify(CallNotice::Incoming { peer }),
            Effect::StartRingTimer {
                attempt: self.attempt,
            },
        ]
    }

    fn on_call_accepted(&mut self, media_address: MediaAddress) -> Vec<Effect> {
        if self.phase != Phase::Calling {
            return Vec::new();
        }
        let Some(capture) = self.capture.as_deref() else {
            return self.fail(EndReason::MediaFailed, "no capture held while calling");
        };

        match self
            .backend
            .open_session(&media_address, capture, self.sink.clone())
        {
            Ok(session) => {
                self.session = Some(session);
                self.phase = Phase::Connected;
                self.connected_notice()
            }
            Err(e) => self.fail(EndReason::MediaFailed, &e.message),
        }
    }

    fn on_call_ended(&mut self) -> Vec<Effect> {
        if self.phase == Phase::Idle {
            return Vec::new();
        }
        self.reset();
        vec![Effect::Notify(CallNotice::Ended {
            reason: EndReason::RemoteEnded,
        })]
    }

    fn on_peer_offered(&mut self, mut offer: Box<dyn PeerSession>) -> Vec<Effect> {
        match self.phase {
            Phase::Ringing | Phase::Answering => {
                if let Some(previous) = self.pending_offer.replace(offer) {
                    previous.close();
                }
                Vec::new()
            }
            // Accepted before the offer arrived: answer it now.
            Phase::Connected if self.session.is_none() && self.pending_offer.is_none() => {
                let Some(capture) = self.capture.as_deref() else {
                    offer.close();
                    return Vec::new();
                };
                match offer.answer(capture, self.sink.clone()) {
                    Ok(()) => {
                        self.session = Some(offer);
                        Vec::new()
                    }
                    Err(e) => {
                        offer.close();
                        self.fail(EndReason::MediaFailed, &e.message)
                    }
                }
            }
            _ => {
                debug!(session = %offer.id(), "Unexpected peer offer declined");
                offer.close();
                Vec::new()
            }
        }
    }

    fn on_media(&mut self, session_id: MediaSessionId, kind: MediaEventKind) -> Vec<Effect> {
        let current = self.session.as_ref().is_some_and(|s| s.id() == session_id);
        if current {
            return match kind {
                MediaEventKind::RemoteStream => vec![Effect::Notify(CallNotice::RemoteStreamReady)],
                MediaEventKind::Closed => {
                    self.reset();
                    vec![Effect::Notify(CallNotice::Ended {
                        reason: EndReason::RemoteEnded,
                    })]
                }
                MediaEventKind::Error(message) => {
                    warn!(session = %session_id, error = %message, "Peer session failed");
                    self.reset();
                    vec![Effect::Notify(CallNotice::Ended {
                        reason: EndReason::MediaFailed,
                    })]
                }
            };
        }

        // Caller withdrew the offer before we answered.
        let pending = self
            .pending_offer
            .as_ref()
            .is_some_and(|s| s.id() == session_id);
        if pending && kind != MediaEventKind::RemoteStream {
            if let Some(offer) = self.pending_offer.take() {
                offer.close();
            }
            return Vec::new();
        }

        debug!(session = %session_id, "Media event for stale session ignored");
        Vec::new()
    }

    fn on_capture_ready(&mut self, attempt: u64, capture: Box<dyn CaptureStream>) -> Vec<Effect> {
        if attempt != self.attempt || !matches!(self.phase, Phase::Dialing | Phase::Answering) {
            // The call was torn down while the capture was pending.
            debug!(attempt, current = self.attempt, "Late capture released");
            capture.stop();
            return Vec::new();
        }

        match self.phase {
            Phase::Dialing => {
                let Some(peer) = self.peer.clone() else {
                    capture.stop();
                    self.reset();
                    return Vec::new();
                };
                self.capture = Some(capture);
                self.phase = Phase::Calling;
                vec![
                    Effect::Send(ClientEvent::CallRequest {
                        to: peer.user_id,
                        from: self.identity.user_id.clone(),
                        caller_name: self.identity.display_name.clone(),
                    }),
                    Effect::StartRingTimer {
                        attempt: self.attempt,
                    },
                ]
            }
            _ => self.complete_answer(capture),
        }
    }

    fn complete_answer(&mut self, capture: Box<dyn CaptureStream>) -> Vec<Effect> {
        let Some(peer) = self.peer.clone() else {
            capture.stop();
            self.reset();
            return Vec::new();
        };
        self.capture = Some(capture);
        self.phase = Phase::Connected;

        let mut effects = vec![Effect::Send(ClientEvent::CallAccept {
            to: peer.user_id,
            media_address: self.backend.media_address(),
        })];

        if let Some(mut offer) = self.pending_offer.take() {
            let answered = match self.capture.as_deref() {
                Some(capture) => offer.answer(capture, self.sink.clone()),
                None => Ok(()),
            };
            match answered {
                Ok(()) => self.session = Some(offer),
                Err(e) => {
                    offer.close();
                    effects.extend(self.fail(EndReason::MediaFailed, &e.message));
                    return effects;
                }
            }
        }

        effects.extend(self.connected_notice());
        effects
    }

    fn on_capture_failed(&mut self, attempt: u64, message: String) -> Vec<Effect> {
        if attempt != self.attempt || !matches!(self.phase, Phase::Dialing | Phase::Answering) {
            return Vec::new();
        }

        // Nothing goes out: a dial never sent call-request, and a failed
        // accept leaves the caller to time out.
        warn!(error = %message, status = %self.status(), "Capture acquisition failed");
        self.reset();
        vec![
            Effect::Notify(CallNotice::MediaUnavailable { message }),
            Effect::Notify(CallNotice::Ended {
                reason: EndReason::MediaFailed,
            }),
        ]
    }

    fn on_ring_timeout(&mut self, attempt: u64) -> Vec<Effect> {
        if attempt != self.attempt || !matches!(self.phase, Phase::Calling | Phase::Ringing) {
            return Vec::new();
        }
        // Local only: call-ended names no sender, so a call-end from a
        // caller who gave up would end whatever call the peer is in now.
        info!(status = %self.status(), "Ring timeout");
        self.reset();
        vec![Effect::Notify(CallNotice::Ended {
            reason: EndReason::Timeout,
        })]
    }

    fn connected_notice(&self) -> Vec<Effect> {
        match &self.peer {
            Some(peer) => vec![Effect::Notify(CallNotice::Connected { peer: peer.clone() })],
            None => Vec::new(),
        }
    }

    /// Local teardown: tell the peer, then release everything.
    fn end_locally(&mut self, reason: EndReason) -> Vec<Effect> {
        let mut effects = Vec::new();
        if let Some(peer) = &self.peer {
            effects.push(Effect::Send(ClientEvent::CallEnd {
                to: peer.user_id.clone(),
            }));
        }
        self.reset();
        effects.push(Effect::Notify(CallNotice::Ended { reason }));
        effects
    }

    /// Local media failure after the peer was engaged.
    fn fail(&mut self, reason: EndReason, message: &str) -> Vec<Effect> {
        warn!(error = %message, "Call failed");
        self.end_locally(reason)
    }

    /// Back to idle. Releases the capture, closes sessions, clears the peer,
    /// and invalidates anything still in flight for the old attempt.
    fn reset(&mut self) {
        self.attempt += 1;
        self.phase = Phase::Idle;
        self.peer = None;
        self.release_media();
    }

    fn release_media(&mut self) {
        if let Some(session) = self.session.take() {
            session.close();
        }
        if let Some(offer) = self.pending_offer.take() {
            offer.close();
        }
        if let Some(capture) = self.capture.take() {
            capture.stop();
        }
    }
}

impl Drop for CallStateMachine {
    fn drop(&mut self) {
        self.release_media();
    }
}
