//! Two clients calling each other through the signaling engine.

mod helpers;

use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::Duration;

use callhub_client::{CallNotice, CallSnapshot, CallStatus, EndReason};
use callhub_core::config::RealtimeConfig;
use callhub_core::result::AppResult;
use callhub_core::signal::{ClientEvent, ServerEvent};
use callhub_core::types::{MediaAddress, UserId};
use callhub_realtime::RealtimeEngine;
use callhub_realtime::connection::authenticator::AuthenticatedConnection;

use helpers::{Peer, Switchboard, eventually};

async fn within(fut: impl Future<Output = AppResult<CallSnapshot>>) -> CallSnapshot {
    tokio::time::timeout(Duration::from_secs(5), fut)
        .await
        .expect("status not reached in time")
        .expect("agent stopped")
}

fn setup() -> (RealtimeEngine, Arc<Switchboard>) {
    (
        RealtimeEngine::new(RealtimeConfig::default()),
        Arc::new(Switchboard::default()),
    )
}

#[tokio::test]
async fn test_call_connects_and_hangup_releases_media() {
    let (engine, board) = setup();
    let alice = Peer::join(&engine, &board, "alice", "Alice").await;
    let bob = Peer::join(&engine, &board, "bob", "Bob").await;
    let mut bob_notices = bob.calls.subscribe();
    let mut alice_notices = alice.calls.subscribe();

    alice.calls.call(bob.user_id.clone(), "Bob").unwrap();

    let ringing = within(bob.calls.wait_for_status(CallStatus::Ringing)).await;
    let caller = ringing.peer.expect("ringing peer");
    assert_eq!(caller.user_id, alice.user_id);
    assert_eq!(caller.display_name, "Alice");
    assert!(!ringing.has_capture);
    match bob_notices.recv().await.unwrap() {
        CallNotice::Incoming { peer } => assert_eq!(peer.user_id, alice.user_id),
        other => panic!("unexpected notice: {other:?}"),
    }
    assert_eq!(alice.calls.snapshot().status, CallStatus::Calling);

    bob.calls.accept().unwrap();

    within(alice.calls.wait_for_status(CallStatus::Connected)).await;
    within(bob.calls.wait_for_status(CallStatus::Connected)).await;

    let (a, b) = (alice.calls.clone(), bob.calls.clone());
    eventually("both sessions open", move || {
        a.snapshot().has_session && b.snapshot().has_session
    })
    .await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while let Ok(notice) = alice_notices.recv().await {
            if notice == CallNotice::RemoteStreamReady {
                return;
            }
        }
        panic!("notice channel closed");
    })
    .await
    .expect("remote stream never reported");

    let metrics = engine.metrics.snapshot();
    assert_eq!(metrics.calls_requested, 1);
    assert!(metrics.calls_relayed >= 2);

    alice.calls.hangup().unwrap();

    within(alice.calls.wait_for_status(CallStatus::Idle)).await;
    let ended = within(bob.calls.wait_for_status(CallStatus::Idle)).await;
    assert!(ended.peer.is_none());

    let (ca, cb) = (alice.counters.clone(), bob.counters.clone());
    eventually("media released", move || ca.balanced() && cb.balanced()).await;
    assert_eq!(alice.counters.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(bob.counters.acquired.load(Ordering::SeqCst), 1);
    assert_eq!(bob.counters.opened.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rejected_call_returns_both_sides_to_idle() {
    let (engine, board) = setup();
    let alice = Peer::join(&engine, &board, "alice", "Alice").await;
    let bob = Peer::join(&engine, &board, "bob", "Bob").await;
    let mut alice_notices = alice.calls.subscribe();

    alice.calls.call(bob.user_id.clone(), "Bob").unwrap();
    within(bob.calls.wait_for_status(CallStatus::Ringing)).await;

    bob.calls.reject().unwrap();

    within(bob.calls.wait_for_status(CallStatus::Idle)).await;
    within(alice.calls.wait_for_status(CallStatus::Idle)).await;

    let mut reason = None;
    while let Ok(notice) = alice_notices.recv().await {
        if let CallNotice::Ended { reason: r } = notice {
            reason = Some(r);
            break;
        }
    }
    assert_eq!(reason, Some(EndReason::RemoteEnded));

    let (ca, cb) = (alice.counters.clone(), bob.counters.clone());
    eventually("media released", move || ca.balanced() && cb.balanced()).await;
    assert_eq!(bob.counters.acquired.load(Ordering::SeqCst), 0);
}

#[tokio::test(start_paused = true)]
async fn test_call_to_offline_user_times_out() {
    let (engine, board) = setup();
    let alice = Peer::join(&engine, &board, "alice", "Alice").await;
    let mut notices = alice.calls.subscribe();

    alice.calls.call(UserId::from("nobody"), "Nobody").unwrap();

    let (a, m) = (alice.calls.clone(), engine.metrics.clone());
    eventually("call-request dropped", move || {
        a.snapshot().status == CallStatus::Calling && m.snapshot().events_dropped >= 1
    })
    .await;

    let idle = tokio::time::timeout(
        Duration::from_secs(60),
        alice.calls.wait_for_status(CallStatus::Idle),
    )
    .await
    .expect("ring timeout did not fire")
    .expect("agent stopped");
    assert!(!idle.has_capture);

    let mut reason = None;
    while let Ok(notice) = notices.try_recv() {
        if let CallNotice::Ended { reason: r } = notice {
            reason = Some(r);
        }
    }
    assert_eq!(reason, Some(EndReason::Timeout));
    assert!(alice.counters.balanced());
}

#[tokio::test]
async fn test_reconnect_keeps_newest_connection_reachable() {
    let (engine, board) = setup();
    let alice = Peer::join(&engine, &board, "alice", "Alice").await;

    let carol = UserId::from("carol");
    let auth = || AuthenticatedConnection {
        user_id: carol.clone(),
        username: "Carol".into(),
    };
    let register = serde_json::to_string(&ClientEvent::Register {
        user_id: carol.clone(),
        media_address: MediaAddress::from("media-carol"),
    })
    .unwrap();

    let (old, mut old_rx) = engine.connections.open(auth());
    engine.connections.handle_inbound(&old.id, &register).await;
    let (new, mut new_rx) = engine.connections.open(auth());
    engine.connections.handle_inbound(&new.id, &register).await;

    // The old socket finally notices it is dead.
    engine.connections.unregister(&old.id);

    let entry = engine.presence.resolve(&carol).expect("carol still registered");
    assert_eq!(entry.connection_id(), new.id);

    alice.calls.call(carol.clone(), "Carol").unwrap();

    let frame = tokio::time::timeout(Duration::from_secs(5), new_rx.recv())
        .await
        .expect("no frame on new connection")
        .expect("channel closed");
    assert_eq!(
        frame,
        ServerEvent::IncomingCall {
            from: alice.user_id.clone(),
            media_address: MediaAddress::from("media-alice"),
            caller_name: "Alice".into(),
        }
    );
    assert!(old_rx.try_recv().is_err());
}

#[tokio::test(start_paused = true)]
async fn test_busy_callee_keeps_call_when_second_caller_gives_up() {
    let (engine, board) = setup();
    let alice = Peer::join(&engine, &board, "alice", "Alice").await;
    let bob = Peer::join(&engine, &board, "bob", "Bob").await;
    let carol = Peer::join(&engine, &board, "carol", "Carol").await;

    alice.calls.call(bob.user_id.clone(), "Bob").unwrap();
    within(bob.calls.wait_for_status(CallStatus::Ringing)).await;
    bob.calls.accept().unwrap();
    within(alice.calls.wait_for_status(CallStatus::Connected)).await;
    within(bob.calls.wait_for_status(CallStatus::Connected)).await;

    carol.calls.call(bob.user_id.clone(), "Bob").unwrap();

    let (c, m) = (carol.calls.clone(), engine.metrics.clone());
    eventually("second call-request relayed", move || {
        c.snapshot().status == CallStatus::Calling && m.snapshot().calls_requested >= 2
    })
    .await;

    tokio::time::timeout(
        Duration::from_secs(60),
        carol.calls.wait_for_status(CallStatus::Idle),
    )
    .await
    .expect("ring timeout did not fire")
    .expect("agent stopped");

    tokio::time::sleep(Duration::from_secs(1)).await;

    let snapshot = bob.calls.snapshot();
    assert_eq!(snapshot.status, CallStatus::Connected);
    assert_eq!(
        snapshot.peer.map(|p| p.user_id),
        Some(alice.user_id.clone())
    );
    assert_eq!(alice.calls.snapshot().status, CallStatus::Connected);
    assert!(carol.counters.balanced());
}
