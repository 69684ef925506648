//! WebSocket upgrade handler.

use axum::extract::ws::rejection::WebSocketUpgradeRejection;
use axum::extract::ws::{Message, WebSocket};
use axum::extract::{Query, State, WebSocketUpgrade};
use axum::response::{IntoResponse, Response};
use axum_extra::extract::CookieJar;
use futures::{SinkExt, StreamExt};
use tracing::{debug, info, warn};

use callhub_realtime::connection::authenticator::AuthenticatedConnection;
use callhub_realtime::connection::heartbeat::run_heartbeat;
use callhub_realtime::message::serializer::serialize_outbound;

use crate::error::ApiError;
use crate::state::AppState;

/// Query parameters for WebSocket authentication.
#[derive(Debug, Default, serde::Deserialize)]
pub struct WsQuery {
    /// Identity token. Falls back to the token cookie when absent.
    pub token: Option<String>,
}

/// GET /ws?token={jwt}: WebSocket upgrade
///
/// The token is checked before the upgrade, so a bad token gets a plain 401.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<WsQuery>,
    jar: CookieJar,
    ws: Result<WebSocketUpgrade, WebSocketUpgradeRejection>,
) -> Response {
    let cookie_token = jar
        .get(&state.config.auth.token_cookie)
        .map(|c| c.value().to_string());
    let token = query.token.or(cookie_token);

    let auth = match state.authenticator.authenticate(token.as_deref()) {
        Ok(auth) => auth,
        Err(e) => {
            debug!(error = %e, "WebSocket upgrade rejected");
            return ApiError::from(e).into_response();
        }
    };

    let ws = match ws {
        Ok(ws) => ws,
        Err(rejection) => return rejection.into_response(),
    };

    let max_bytes = state.config.realtime.max_message_bytes;
    ws.max_message_size(max_bytes)
        .on_upgrade(move |socket| handle_ws_connection(state, auth, socket))
}

/// Handles an established WebSocket connection.
async fn handle_ws_connection(state: AppState, auth: AuthenticatedConnection, socket: WebSocket) {
    let (mut ws_tx, mut ws_rx) = socket.split();

    let connections = state.realtime.connections.clone();
    let (handle, mut outbound_rx) = connections.open(auth);
    let conn_id = handle.id;
    let closed = handle.closed_token();

    // Outbound forwarder
    let outbound_task = tokio::spawn(async move {
        while let Some(event) = outbound_rx.recv().await {
            let text = match serialize_outbound(&event) {
                Ok(text) => text,
                Err(e) => {
                    warn!(error = %e, "Failed to serialize outbound event");
                    continue;
                }
            };
            if ws_tx.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
        let _ = ws_tx.send(Message::Close(None)).await;
    });

    let heartbeat_task = tokio::spawn(run_heartbeat(
        handle.clone(),
        connections.heartbeat_config(),
    ));

    // Inbound loop; ends on client close, socket error, or server-side close.
    loop {
        tokio::select! {
            _ = closed.cancelled() => {
                debug!(conn_id = %conn_id, "Connection closed by server");
                break;
            }
            frame = ws_rx.next() => match frame {
                Some(Ok(Message::Text(text))) => {
                    connections.handle_inbound(&conn_id, text.as_str()).await;
                }
                Some(Ok(Message::Close(_))) | None => break,
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(conn_id = %conn_id, error = %e, "WebSocket error");
                    break;
                }
            },
        }
    }

    // Cleanup: presence entry goes with the connection (if still owned).
    heartbeat_task.abort();
    connections.unregister(&conn_id);
    outbound_task.abort();

    info!(conn_id = %conn_id, user_id = %handle.user_id, "WebSocket session ended");
}
