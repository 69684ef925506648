//! Integration tests for the HTTP surface and WebSocket signaling.

mod helpers;

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use http::StatusCode;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::{self, Message};

use callhub_client::transport::{Registration, SignalingClient};
use callhub_core::signal::{ClientEvent, ServerEvent};
use callhub_core::types::{MediaAddress, UserId};

type RawSocket =
    tokio_tungstenite::WebSocketStream<tokio_tungstenite::MaybeTlsStream<tokio::net::TcpStream>>;

async fn send(socket: &mut RawSocket, event: &ClientEvent) {
    let text = serde_json::to_string(event).unwrap();
    socket.send(Message::text(text)).await.unwrap();
}

/// Next non-ping event from the server.
async fn next_event(socket: &mut RawSocket) -> ServerEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Text(text))) => {
                    let event: ServerEvent = serde_json::from_str(text.as_str()).unwrap();
                    if !matches!(event, ServerEvent::Ping { .. }) {
                        return event;
                    }
                }
                Some(Ok(_)) => {}
                other => panic!("socket ended: {other:?}"),
            }
        }
    })
    .await
    .expect("no event in time")
}

#[tokio::test]
async fn test_health_check() {
    let app = helpers::TestApp::new();

    let response = app.get("/api/health").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["status"], "ok");
}

#[tokio::test]
async fn test_detailed_health_check() {
    let app = helpers::TestApp::new();

    let response = app.get("/api/health/detailed").await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["data"]["ws_connections"], 0);
    assert_eq!(response.body["data"]["registered_users"], 0);
    assert!(response.body["data"]["metrics"].is_object());
}

#[tokio::test]
async fn test_ws_upgrade_without_token() {
    let app = helpers::TestApp::new();

    let response = app.get("/ws").await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.body["error"], "UNAUTHORIZED");
}

#[tokio::test]
async fn test_ws_upgrade_with_bad_token() {
    let app = helpers::TestApp::new();

    let response = app.get("/ws?token=not-a-jwt").await;

    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_valid_token_without_upgrade_headers_is_not_unauthorized() {
    let app = helpers::TestApp::new();
    let token = app.token("alice", "Alice");

    let response = app.get(&format!("/ws?token={}", token)).await;

    assert_ne!(response.status, StatusCode::UNAUTHORIZED);
    assert!(response.status.is_client_error());
}

#[tokio::test]
async fn test_socket_rejects_bad_token_before_upgrade() {
    let app = helpers::TestApp::new();
    let url = app.spawn_server().await;

    let result = tokio_tungstenite::connect_async(format!("{}?token=forged", url)).await;

    match result {
        Err(tungstenite::Error::Http(response)) => {
            assert_eq!(response.status().as_u16(), 401)
        }
        Err(other) => panic!("unexpected error: {other}"),
        Ok(_) => panic!("upgrade should be refused"),
    }
}

#[tokio::test]
async fn test_register_as_someone_else_gets_error_frame() {
    let app = helpers::TestApp::new();
    let url = app.spawn_server().await;
    let token = app.token("mallory", "Mallory");

    let (mut socket, _) = tokio_tungstenite::connect_async(format!("{}?token={}", url, token))
        .await
        .unwrap();
    send(
        &mut socket,
        &ClientEvent::Register {
            user_id: UserId::from("alice"),
            media_address: MediaAddress::from("media-x"),
        },
    )
    .await;

    match next_event(&mut socket).await {
        ServerEvent::Error { code, .. } => assert_eq!(code, "AUTHENTICATION"),
        other => panic!("unexpected event: {other:?}"),
    }
    assert!(!app.state.realtime.presence.is_registered(&UserId::from("alice")));
}

#[tokio::test]
async fn test_call_request_relayed_over_sockets() {
    let app = helpers::TestApp::new();
    let url = app.spawn_server().await;
    let presence = app.state.realtime.presence.clone();

    // Bob through the client transport.
    let (_bob_out_tx, bob_out_rx) = mpsc::unbounded_channel();
    let bob = SignalingClient::new(url.as_str(), app.token("bob", "Bob"))
        .connect(
            Registration {
                user_id: UserId::from("bob"),
                media_address: MediaAddress::from("media-bob"),
            },
            None,
            bob_out_rx,
        )
        .await
        .unwrap();
    let mut bob_frames = bob.subscribe();

    // Alice on a raw socket.
    let (mut alice, _) =
        tokio_tungstenite::connect_async(format!("{}?token={}", url, app.token("alice", "Alice")))
            .await
            .unwrap();
    send(
        &mut alice,
        &ClientEvent::Register {
            user_id: UserId::from("alice"),
            media_address: MediaAddress::from("media-alice"),
        },
    )
    .await;

    let p = presence.clone();
    helpers::eventually("both registered", move || {
        p.is_registered(&UserId::from("alice")) && p.is_registered(&UserId::from("bob"))
    })
    .await;

    send(
        &mut alice,
        &ClientEvent::CallRequest {
            to: UserId::from("bob"),
            from: UserId::from("alice"),
            caller_name: "Alice".into(),
        },
    )
    .await;

    let incoming = tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            let event = bob_frames.recv().await.unwrap();
            if !matches!(event, ServerEvent::Ping { .. }) {
                return event;
            }
        }
    })
    .await
    .expect("bob got nothing");
    assert_eq!(
        incoming,
        ServerEvent::IncomingCall {
            from: UserId::from("alice"),
            media_address: MediaAddress::from("media-alice"),
            caller_name: "Alice".into(),
        }
    );

    // Closing Bob's link removes him from presence.
    bob.close();
    bob.join().await.unwrap();
    let p = presence.clone();
    helpers::eventually("bob unregistered", move || {
        !p.is_registered(&UserId::from("bob"))
    })
    .await;
    assert!(presence.is_registered(&UserId::from("alice")));
}
