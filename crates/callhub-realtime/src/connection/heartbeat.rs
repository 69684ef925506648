//! Ping/pong heartbeat for WebSocket keepalive.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::time;

use callhub_core::config::RealtimeConfig;
use callhub_core::signal::ServerEvent;

use super::handle::ConnectionHandle;

/// Heartbeat configuration
#[derive(Debug, Clone)]
pub struct HeartbeatConfig {
    /// Interval between pings
    pub ping_interval: Duration,
    /// Grace period for the pong after a ping
    pub ping_timeout: Duration,
}

impl HeartbeatConfig {
    /// Longest silence tolerated since the last pong.
    pub fn deadline(&self) -> Duration {
        self.ping_interval + self.ping_timeout
    }
}

impl From<&RealtimeConfig> for HeartbeatConfig {
    fn from(config: &RealtimeConfig) -> Self {
        Self {
            ping_interval: Duration::from_secs(config.ping_interval_seconds),
            ping_timeout: Duration::from_secs(config.ping_timeout_seconds),
        }
    }
}

/// Run heartbeat loop for a connection.
///
/// Sends periodic pings and checks for pong responses. Closes the
/// connection when no pong arrived within one interval plus the timeout;
/// closing wakes the socket task, which then runs the normal disconnect
/// path (including presence cleanup). A zero interval disables the loop.
pub async fn run_heartbeat(handle: Arc<ConnectionHandle>, config: HeartbeatConfig) {
    if config.ping_interval.is_zero() {
        tracing::debug!(conn_id = %handle.id, "Heartbeat disabled");
        return;
    }
    let mut interval = time::interval(config.ping_interval);
    let closed = handle.closed_token();

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = closed.cancelled() => break,
        }

        if !handle.is_alive() {
            break;
        }

        let elapsed = Utc::now() - handle.last_pong().await;
        if let Ok(elapsed_std) = elapsed.to_std() {
            if elapsed_std > config.deadline() {
                tracing::warn!(
                    conn_id = %handle.id,
                    user_id = %handle.user_id,
                    "Heartbeat timeout (last pong {:?} ago)",
                    elapsed_std
                );
                handle.mark_closed();
                break;
            }
        }

        let ping = ServerEvent::Ping {
            timestamp: Utc::now().timestamp_millis(),
        };

        if !handle.send(ping) && !handle.is_alive() {
            tracing::debug!(conn_id = %handle.id, "Ping send failed, connection gone");
            break;
        }
    }

    tracing::debug!(conn_id = %handle.id, "Heartbeat loop ended");
}
