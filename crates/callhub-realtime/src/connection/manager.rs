//! Connection manager: handles connection lifecycle and inbound frame dispatch.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use callhub_core::config::RealtimeConfig;
use callhub_core::error::AppError;
use callhub_core::signal::{ClientEvent, ServerEvent};
use callhub_core::types::{ChatId, ConnectionId, MediaAddress, UserId};

use crate::message::{serializer, validator};
use crate::metrics::RealtimeMetrics;
use crate::relay::router::CallRelay;
use crate::room::registry::RoomRegistry;

use super::authenticator::AuthenticatedConnection;
use super::handle::ConnectionHandle;
use super::heartbeat::HeartbeatConfig;
use super::pool::ConnectionPool;

/// Manages all active WebSocket connections.
#[derive(Debug)]
pub struct ConnectionManager {
    /// Connection pool.
    pool: Arc<ConnectionPool>,
    /// Call relay (owns the presence registry reference).
    relay: CallRelay,
    /// Chat rooms.
    rooms: Arc<RoomRegistry>,
    /// Metrics.
    metrics: Arc<RealtimeMetrics>,
    /// Configuration.
    config: RealtimeConfig,
}

impl ConnectionManager {
    /// Creates a new connection manager.
    pub fn new(
        config: RealtimeConfig,
        relay: CallRelay,
        rooms: Arc<RoomRegistry>,
        metrics: Arc<RealtimeMetrics>,
    ) -> Self {
        Self {
            pool: Arc::new(ConnectionPool::new()),
            relay,
            rooms,
            metrics,
            config,
        }
    }

    /// Accepts a new authenticated connection.
    ///
    /// The connection is not callable until the client sends `register`.
    /// Returns the handle and the receiver for outbound events.
    pub fn open(
        &self,
        auth: AuthenticatedConnection,
    ) -> (Arc<ConnectionHandle>, mpsc::Receiver<ServerEvent>) {
        let (tx, rx) = mpsc::channel(self.config.channel_buffer_size);
        let handle = Arc::new(ConnectionHandle::new(auth.user_id, auth.username, tx));

        self.pool.add(handle.clone());
        self.metrics.connection_opened();

        info!(
            conn_id = %handle.id,
            user_id = %handle.user_id,
            "WebSocket connection opened"
        );

        (handle, rx)
    }

    /// Tears a connection down: pool, presence entry (if still owned), rooms.
    pub fn unregister(&self, conn_id: &ConnectionId) {
        let Some(handle) = self.pool.remove(conn_id) else {
            return;
        };
        handle.mark_closed();

        let went_offline = self.relay.connection_closed(conn_id);
        let rooms_left = self.rooms.leave_all(*conn_id);
        self.metrics.connection_closed();

        info!(
            conn_id = %conn_id,
            user_id = %handle.user_id,
            offline = went_offline.is_some(),
            rooms_left,
            "WebSocket connection closed"
        );
    }

    /// Processes one inbound text frame from a client.
    ///
    /// Malformed frames are answered with an `error` frame on the same
    /// connection; nothing else is affected.
    pub async fn handle_inbound(&self, conn_id: &ConnectionId, raw_message: &str) {
        let Some(handle) = self.pool.get(conn_id) else {
            warn!(conn_id = %conn_id, "Message from unknown connection");
            return;
        };

        handle.touch().await;

        if let Err(e) = validator::validate_inbound(raw_message, self.config.max_message_bytes) {
            handle.send(ServerEvent::error("INVALID_MESSAGE", e.message));
            return;
        }

        let event = match serializer::deserialize_inbound(raw_message) {
            Ok(event) => event,
            Err(e) => {
                debug!(conn_id = %conn_id, error = %e, "Undecodable frame");
                handle.send(ServerEvent::error(
                    "INVALID_MESSAGE",
                    format!("Failed to parse message: {e}"),
                ));
                return;
            }
        };

        self.metrics.message_received();

        if let Err(e) = self.dispatch(&handle, event).await {
            handle.send(ServerEvent::error(&e.kind.to_string(), e.message));
        }
    }

    async fn dispatch(
        &self,
        handle: &Arc<ConnectionHandle>,
        event: ClientEvent,
    ) -> Result<(), AppError> {
        match event {
            ClientEvent::Register {
                user_id,
                media_address,
            } => self.handle_register(handle, user_id, media_address),
            ClientEvent::CallRequest {
                to,
                from,
                caller_name,
            } => {
                self.relay.call_request(handle, &to, &from, &caller_name);
                Ok(())
            }
            ClientEvent::CallAccept { to, media_address } => {
                self.relay.call_accept(handle, &to, &media_address);
                Ok(())
            }
            ClientEvent::CallEnd { to } => {
                self.relay.call_end(handle, &to);
                Ok(())
            }
            ClientEvent::JoinChat { chat_id } => self.handle_join(handle, chat_id),
            ClientEvent::LeaveChat { chat_id } => {
                self.rooms.leave(&chat_id, handle.id);
                debug!(conn_id = %handle.id, chat_id = %chat_id, "Left chat");
                Ok(())
            }
            ClientEvent::Typing { chat_id } => {
                self.handle_typing(handle, &chat_id);
                Ok(())
            }
            ClientEvent::Pong { .. } => {
                handle.record_pong().await;
                Ok(())
            }
        }
    }

    fn handle_register(
        &self,
        handle: &Arc<ConnectionHandle>,
        user_id: UserId,
        media_address: MediaAddress,
    ) -> Result<(), AppError> {
        if user_id != handle.user_id {
            warn!(
                conn_id = %handle.id,
                user_id = %handle.user_id,
                claimed = %user_id,
                "Register for a different identity rejected"
            );
            return Err(AppError::authentication(
                "Cannot register as a different user",
            ));
        }
        if media_address.is_blank() {
            return Err(AppError::validation("mediaAddress must not be empty"));
        }

        self.relay
            .presence()
            .register(user_id, handle.clone(), media_address);

        // Closed while registering: undo so no entry outlives its connection.
        if !handle.is_alive() {
            self.relay.connection_closed(&handle.id);
        }
        Ok(())
    }

    fn handle_join(&self, handle: &ConnectionHandle, chat_id: ChatId) -> Result<(), AppError> {
        validator::validate_chat_id(&chat_id)?;

        if self.rooms.is_member(&chat_id, handle.id) {
            return Ok(());
        }
        let current = self.rooms.membership_count(handle.id);
        if current >= self.config.max_rooms_per_connection {
            return Err(AppError::validation(format!(
                "Maximum rooms ({}) reached",
                self.config.max_rooms_per_connection
            )));
        }

        self.rooms.join(chat_id.clone(), handle.id);
        debug!(conn_id = %handle.id, chat_id = %chat_id, "Joined chat");
        Ok(())
    }

    fn handle_typing(&self, handle: &ConnectionHandle, chat_id: &ChatId) {
        if !self.rooms.is_member(chat_id, handle.id) {
            debug!(conn_id = %handle.id, chat_id = %chat_id, "Typing in a room not joined");
            return;
        }

        let event = ServerEvent::UserTyping {
            chat_id: chat_id.clone(),
            user_id: handle.user_id.clone(),
        };
        let mut sent = 0u64;
        for member in self.rooms.members_except(chat_id, handle.id) {
            if let Some(target) = self.pool.get(&member) {
                if target.send(event.clone()) {
                    sent += 1;
                }
            }
        }
        self.metrics.message_sent_count(sent);
    }

    /// Closes all connections.
    pub fn close_all(&self) {
        let all = self.pool.all_connections();
        for conn in &all {
            self.unregister(&conn.id);
        }
        info!(count = all.len(), "All connections closed");
    }

    /// Heartbeat settings for new connections.
    pub fn heartbeat_config(&self) -> HeartbeatConfig {
        HeartbeatConfig::from(&self.config)
    }

    /// Returns the total connection count.
    pub fn connection_count(&self) -> usize {
        self.pool.connection_count()
    }
}
