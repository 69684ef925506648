//! Call relay: routes call-request, call-accept and call-end between users.

use std::sync::Arc;

use tracing::{debug, warn};

use callhub_core::signal::ServerEvent;
use callhub_core::types::{ConnectionId, MediaAddress, UserId};

use crate::connection::handle::ConnectionHandle;
use crate::metrics::RealtimeMetrics;
use crate::presence::registry::PresenceRegistry;

use super::outcome::{DropReason, RelayOutcome};

/// Stateless router keyed by the presence registry.
///
/// Each inbound event produces at most one outbound event. Nothing about a
/// call is remembered between hops.
#[derive(Debug, Clone)]
pub struct CallRelay {
    presence: Arc<PresenceRegistry>,
    metrics: Arc<RealtimeMetrics>,
}

impl CallRelay {
    /// Creates a relay over a shared registry.
    pub fn new(presence: Arc<PresenceRegistry>, metrics: Arc<RealtimeMetrics>) -> Self {
        Self { presence, metrics }
    }

    /// Registry this relay resolves against.
    pub fn presence(&self) -> &Arc<PresenceRegistry> {
        &self.presence
    }

    /// `call-request{to, from, callerName}` → `incoming-call` to `to`.
    ///
    /// The caller's media address comes from the caller's own registration,
    /// which must be held by the sending connection.
    pub fn call_request(
        &self,
        sender: &ConnectionHandle,
        to: &UserId,
        from: &UserId,
        caller_name: &str,
    ) -> RelayOutcome {
        self.metrics.call_requested();

        if *from != sender.user_id {
            warn!(
                conn_id = %sender.id,
                user_id = %sender.user_id,
                from = %from,
                "call-request with spoofed caller dropped"
            );
            return self.drop_event("call-request", to, DropReason::SpoofedCaller);
        }

        if to == from {
            return self.drop_event("call-request", to, DropReason::SelfCall);
        }

        let media_address = match self.presence.resolve(from) {
            Some(entry) if entry.connection_id() == sender.id => entry.media_address,
            _ => return self.drop_event("call-request", to, DropReason::CallerNotRegistered),
        };

        self.forward(
            "call-request",
            to,
            ServerEvent::IncomingCall {
                from: from.clone(),
                media_address,
                caller_name: caller_name.to_string(),
            },
        )
    }

    /// `call-accept{to, mediaAddress}` → `call-accepted{mediaAddress}` to `to`.
    pub fn call_accept(
        &self,
        sender: &ConnectionHandle,
        to: &UserId,
        media_address: &MediaAddress,
    ) -> RelayOutcome {
        debug!(conn_id = %sender.id, from = %sender.user_id, to = %to, "call-accept");
        self.forward(
            "call-accept",
            to,
            ServerEvent::CallAccepted {
                media_address: media_address.clone(),
            },
        )
    }

    /// `call-end{to}` → `call-ended{}` to `to`.
    pub fn call_end(&self, sender: &ConnectionHandle, to: &UserId) -> RelayOutcome {
        debug!(conn_id = %sender.id, from = %sender.user_id, to = %to, "call-end");
        self.forward("call-end", to, ServerEvent::CallEnded {})
    }

    /// Connection close: registry cleanup only, nothing is sent.
    pub fn connection_closed(&self, conn_id: &ConnectionId) -> Option<UserId> {
        self.presence.remove(conn_id)
    }

    fn forward(&self, kind: &'static str, to: &UserId, event: ServerEvent) -> RelayOutcome {
        let Some(target) = self.presence.resolve(to) else {
            return self.drop_event(kind, to, DropReason::CalleeUnreachable);
        };

        if !target.connection.send(event) {
            return self.drop_event(kind, to, DropReason::SendFailed);
        }

        self.metrics.call_relayed();
        debug!(kind, to = %to, conn_id = %target.connection.id, "Signaling event relayed");
        RelayOutcome::Delivered {
            to: to.clone(),
            connection: target.connection.id,
        }
    }

    fn drop_event(&self, kind: &'static str, to: &UserId, reason: DropReason) -> RelayOutcome {
        self.metrics.event_dropped();
        debug!(kind, to = %to, reason = %reason, "Signaling event dropped");
        RelayOutcome::Dropped(reason)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    struct Peer {
        handle: Arc<ConnectionHandle>,
        rx: mpsc::Receiver<ServerEvent>,
    }

    fn peer(user: &str) -> Peer {
        let (tx, rx) = mpsc::channel(8);
        let handle = Arc::new(ConnectionHandle::new(UserId::from(user), user.into(), tx));
        Peer { handle, rx }
    }

    fn relay() -> CallRelay {
        CallRelay::new(
            Arc::new(PresenceRegistry::new()),
            Arc::new(RealtimeMetrics::new()),
        )
    }

    fn register(relay: &CallRelay, peer: &Peer, media: &str) {
        relay.presence().register(
            peer.handle.user_id.clone(),
            peer.handle.clone(),
            MediaAddress::from(media),
        );
    }

    #[test]
    fn test_call_request_delivers_incoming_call_with_caller_media() {
        let relay = relay();
        let a = peer("userA");
        let mut b = peer("userB");
        register(&relay, &a, "mediaA");
        register(&relay, &b, "mediaB");

        let outcome = relay.call_request(
            &a.handle,
            &UserId::from("userB"),
            &UserId::from("userA"),
            "Alice",
        );

        assert_eq!(
            outcome,
            RelayOutcome::Delivered {
                to: UserId::from("userB"),
                connection: b.handle.id
            }
        );
        assert_eq!(
            b.rx.try_recv().ok(),
            Some(ServerEvent::IncomingCall {
                from: UserId::from("userA"),
                media_address: MediaAddress::from("mediaA"),
                caller_name: "Alice".to_string(),
            })
        );
    }

    #[test]
    fn test_call_request_to_absent_user_is_silently_dropped() {
        let relay = relay();
        let mut a = peer("userA");
        register(&relay, &a, "mediaA");

        let outcome = relay.call_request(
            &a.handle,
            &UserId::from("ghost"),
            &UserId::from("userA"),
            "Alice",
        );

        assert_eq!(outcome, RelayOutcome::Dropped(DropReason::CalleeUnreachable));
        assert!(a.rx.try_recv().is_err());
    }

    #[test]
    fn test_spoofed_caller_is_dropped() {
        let relay = relay();
        let a = peer("userA");
        let mut b = peer("userB");
        let c = peer("userC");
        register(&relay, &a, "mediaA");
        register(&relay, &b, "mediaB");
        register(&relay, &c, "mediaC");

        let outcome = relay.call_request(
            &c.handle,
            &UserId::from("userB"),
            &UserId::from("userA"),
            "Alice",
        );

        assert_eq!(outcome, RelayOutcome::Dropped(DropReason::SpoofedCaller));
        assert!(b.rx.try_recv().is_err());
    }

    #[test]
    fn test_unregistered_caller_is_dropped() {
        let relay = relay();
        let a = peer("userA");
        let mut b = peer("userB");
        register(&relay, &b, "mediaB");

        let outcome = relay.call_request(
            &a.handle,
            &UserId::from("userB"),
            &UserId::from("userA"),
            "Alice",
        );

        assert_eq!(outcome, RelayOutcome::Dropped(DropReason::CallerNotRegistered));
        assert!(b.rx.try_recv().is_err());
    }

    #[test]
    fn test_accept_and_end_are_forwarded() {
        let relay = relay();
        let mut a = peer("userA");
        let b = peer("userB");
        register(&relay, &a, "mediaA");
        register(&relay, &b, "mediaB");

        assert!(
            relay
                .call_accept(&b.handle, &UserId::from("userA"), &MediaAddress::from("mediaB"))
                .is_delivered()
        );
        assert_eq!(
            a.rx.try_recv().ok(),
            Some(ServerEvent::CallAccepted {
                media_address: MediaAddress::from("mediaB")
            })
        );

        assert!(relay.call_end(&b.handle, &UserId::from("userA")).is_delivered());
        assert_eq!(a.rx.try_recv().ok(), Some(ServerEvent::CallEnded {}));
    }

    #[test]
    fn test_connection_close_only_cleans_registry() {
        let relay = relay();
        let mut a = peer("userA");
        register(&relay, &a, "mediaA");

        assert_eq!(relay.connection_closed(&a.handle.id), Some(UserId::from("userA")));
        assert!(relay.presence().resolve(&UserId::from("userA")).is_none());
        assert!(a.rx.try_recv().is_err());

        assert_eq!(
            relay.call_end(&a.handle, &UserId::from("userA")),
            RelayOutcome::Dropped(DropReason::CalleeUnreachable)
        );
    }
}
