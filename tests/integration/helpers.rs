//! Shared test helpers for integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use axum::Router;
use axum::body::Body;
use http::{Request, StatusCode};
use serde_json::Value;
use tokio::sync::mpsc;
use tower::ServiceExt;

use callhub_api::{AppState, build_app};
use callhub_auth::JwtEncoder;
use callhub_client::media::{CaptureStream, MediaBackend, MediaEventSink, MediaSessionId, PeerSession};
use callhub_client::{AgentConfig, CallAgent, CallHandle, LocalIdentity};
use callhub_core::config::AppConfig;
use callhub_core::error::AppError;
use callhub_core::result::AppResult;
use callhub_core::signal::{ClientEvent, ServerEvent};
use callhub_core::types::{ConnectionId, MediaAddress, UserId};
use callhub_realtime::RealtimeEngine;
use callhub_realtime::connection::authenticator::AuthenticatedConnection;

/// Test application context
pub struct TestApp {
    /// The Axum router for making test requests
    pub router: Router,
    /// State shared with the router
    pub state: AppState,
    /// Application config
    pub config: AppConfig,
}

impl TestApp {
    /// Create a new test application with default configuration
    pub fn new() -> Self {
        let mut config = AppConfig::default();
        config.auth.jwt_secret = "integration-test-secret".to_string();
        let state = AppState::new(config.clone());
        let router = build_app(state.clone());
        Self {
            router,
            state,
            config,
        }
    }

    /// Mint a token for `user_id`
    pub fn token(&self, user_id: &str, name: &str) -> String {
        JwtEncoder::new(&self.config.auth)
            .issue(&UserId::from(user_id), name)
            .expect("Failed to issue token")
    }

    /// Send a GET request through the router
    pub async fn get(&self, path: &str) -> TestResponse {
        let req = Request::builder()
            .method("GET")
            .uri(path)
            .body(Body::empty())
            .expect("Failed to build request");

        let response = self
            .router
            .clone()
            .oneshot(req)
            .await
            .expect("Failed to send request");

        let status = response.status();
        let body_bytes = axum::body::to_bytes(response.into_body(), 1024 * 1024)
            .await
            .expect("Failed to read body");

        let body: Value = serde_json::from_slice(&body_bytes).unwrap_or(Value::Null);

        TestResponse { status, body }
    }

    /// Serve the app on an ephemeral local port; returns the `ws://` URL
    pub async fn spawn_server(&self) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0")
            .await
            .expect("Failed to bind");
        let addr = listener.local_addr().expect("Failed to read local addr");
        let router = self.router.clone();
        tokio::spawn(async move {
            axum::serve(listener, router).await.expect("Server failed");
        });
        format!("ws://{}/ws", addr)
    }
}

/// Test response wrapper
#[derive(Debug)]
pub struct TestResponse {
    /// HTTP status code
    pub status: StatusCode,
    /// Parsed JSON body
    pub body: Value,
}

/// Poll `check` until it holds, failing the test after a few seconds.
pub async fn eventually(what: &str, mut check: impl FnMut() -> bool) {
    for _ in 0..500 {
        if check() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("Timed out waiting for: {}", what);
}

/// Acquire/release and open/close counts for one client's media.
#[derive(Debug, Default)]
pub struct MediaCounters {
    pub acquired: AtomicUsize,
    pub released: AtomicUsize,
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
}

impl MediaCounters {
    /// Every capture released and every session closed.
    pub fn balanced(&self) -> bool {
        self.acquired.load(Ordering::SeqCst) == self.released.load(Ordering::SeqCst)
            && self.opened.load(Ordering::SeqCst) == self.closed.load(Ordering::SeqCst)
    }
}

/// In-process stand-in for the peer-media network: opening a session to an
/// address hands the matching offer to whichever client owns that address.
#[derive(Debug, Default)]
pub struct Switchboard {
    clients: Mutex<HashMap<MediaAddress, (CallHandle, Arc<MediaCounters>)>>,
    next_session: AtomicU64,
}

impl Switchboard {
    fn attach(&self, address: MediaAddress, calls: CallHandle, counters: Arc<MediaCounters>) {
        self.clients
            .lock()
            .expect("switchboard lock")
            .insert(address, (calls, counters));
    }

    fn lookup(&self, address: &MediaAddress) -> Option<(CallHandle, Arc<MediaCounters>)> {
        self.clients
            .lock()
            .expect("switchboard lock")
            .get(address)
            .cloned()
    }

    fn next_id(&self) -> MediaSessionId {
        MediaSessionId(self.next_session.fetch_add(1, Ordering::SeqCst) + 1)
    }
}

#[derive(Debug)]
struct TestCapture(Arc<MediaCounters>);

impl CaptureStream for TestCapture {
    fn stop(self: Box<Self>) {
        self.0.released.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct TestSession {
    id: MediaSessionId,
    counters: Arc<MediaCounters>,
}

impl TestSession {
    fn open(id: MediaSessionId, counters: &Arc<MediaCounters>) -> Self {
        counters.opened.fetch_add(1, Ordering::SeqCst);
        Self {
            id,
            counters: counters.clone(),
        }
    }
}

impl PeerSession for TestSession {
    fn id(&self) -> MediaSessionId {
        self.id
    }

    fn answer(&mut self, _capture: &dyn CaptureStream, sink: MediaEventSink) -> AppResult<()> {
        sink.remote_stream(self.id);
        Ok(())
    }

    fn close(self: Box<Self>) {
        self.counters.closed.fetch_add(1, Ordering::SeqCst);
    }
}

#[derive(Debug)]
struct TestBackend {
    address: MediaAddress,
    counters: Arc<MediaCounters>,
    board: Arc<Switchboard>,
}

#[async_trait]
impl MediaBackend for TestBackend {
    fn media_address(&self) -> MediaAddress {
        self.address.clone()
    }

    async fn acquire_capture(&self) -> AppResult<Box<dyn CaptureStream>> {
        self.counters.acquired.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(TestCapture(self.counters.clone())))
    }

    fn open_session(
        &self,
        remote: &MediaAddress,
        _capture: &dyn CaptureStream,
        sink: MediaEventSink,
    ) -> AppResult<Box<dyn PeerSession>> {
        let (remote_calls, remote_counters) = self
            .board
            .lookup(remote)
            .ok_or_else(|| AppError::media(format!("No peer at {}", remote)))?;

        let offer = TestSession::open(self.board.next_id(), &remote_counters);
        remote_calls.peer_offered(Box::new(offer))?;

        let session = TestSession::open(self.board.next_id(), &self.counters);
        sink.remote_stream(session.id);
        Ok(Box::new(session))
    }
}

/// One client wired to the engine: agent, connection, and both pumps.
pub struct Peer {
    pub user_id: UserId,
    pub calls: CallHandle,
    pub counters: Arc<MediaCounters>,
    pub conn_id: ConnectionId,
}

impl Peer {
    /// Opens a connection for `user_id`, starts its call agent, and waits
    /// until the register frame has reached the presence registry.
    pub async fn join(
        engine: &RealtimeEngine,
        board: &Arc<Switchboard>,
        user_id: &str,
        display_name: &str,
    ) -> Self {
        let user = UserId::from(user_id);
        let address = MediaAddress::from(format!("media-{}", user_id));
        let counters = Arc::new(MediaCounters::default());

        let (connection, mut server_rx) = engine.connections.open(AuthenticatedConnection {
            user_id: user.clone(),
            username: display_name.to_string(),
        });
        let conn_id = connection.id;

        let backend = Arc::new(TestBackend {
            address: address.clone(),
            counters: counters.clone(),
            board: board.clone(),
        });
        let (outbound_tx, mut outbound_rx) = mpsc::unbounded_channel();
        let (agent, calls) = CallAgent::new(
            LocalIdentity {
                user_id: user.clone(),
                display_name: display_name.to_string(),
            },
            backend,
            outbound_tx.clone(),
            AgentConfig::default(),
        );
        board.attach(address.clone(), calls.clone(), counters.clone());
        tokio::spawn(agent.run());

        // Client -> server, through the same JSON path a socket would use.
        let connections = engine.connections.clone();
        tokio::spawn(async move {
            while let Some(event) = outbound_rx.recv().await {
                let text = serde_json::to_string(&event).expect("encode client event");
                connections.handle_inbound(&conn_id, &text).await;
            }
        });

        // Server -> client.
        let inbound = calls.clone();
        tokio::spawn(async move {
            while let Some(event) = server_rx.recv().await {
                if matches!(event, ServerEvent::Ping { .. }) {
                    continue;
                }
                if inbound.deliver_signal(event).is_err() {
                    break;
                }
            }
        });

        outbound_tx
            .send(ClientEvent::Register {
                user_id: user.clone(),
                media_address: address,
            })
            .expect("queue register");
        let presence = engine.presence.clone();
        let registered = user.clone();
        eventually("registration", move || presence.is_registered(&registered)).await;

        Self {
            user_id: user,
            calls,
            counters,
            conn_id,
        }
    }
}
