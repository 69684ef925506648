//! Top-level signaling engine that ties together all subsystems.

use std::sync::Arc;

use tokio::sync::broadcast;
use tracing::info;

use callhub_core::config::RealtimeConfig;

use crate::connection::manager::ConnectionManager;
use crate::metrics::RealtimeMetrics;
use crate::presence::registry::PresenceRegistry;
use crate::relay::router::CallRelay;
use crate::room::registry::RoomRegistry;

/// Central engine that owns the presence registry and everything routed
/// through it. Built once at startup and shared by `Arc`/clone.
#[derive(Clone)]
pub struct RealtimeEngine {
    /// Connection manager.
    pub connections: Arc<ConnectionManager>,
    /// Presence registry.
    pub presence: Arc<PresenceRegistry>,
    /// Call relay.
    pub relay: CallRelay,
    /// Chat rooms.
    pub rooms: Arc<RoomRegistry>,
    /// Metrics collector.
    pub metrics: Arc<RealtimeMetrics>,
    /// Shutdown signal sender.
    shutdown_tx: broadcast::Sender<()>,
}

impl std::fmt::Debug for RealtimeEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RealtimeEngine")
            .field("connections", &self.connections.connection_count())
            .field("registered", &self.presence.len())
            .finish()
    }
}

impl RealtimeEngine {
    /// Creates a new engine with all subsystems.
    pub fn new(config: RealtimeConfig) -> Self {
        let (shutdown_tx, _) = broadcast::channel(1);

        let metrics = Arc::new(RealtimeMetrics::new());
        let presence = Arc::new(PresenceRegistry::new());
        let relay = CallRelay::new(presence.clone(), metrics.clone());
        let rooms = Arc::new(RoomRegistry::new());
        let connections = Arc::new(ConnectionManager::new(
            config,
            relay.clone(),
            rooms.clone(),
            metrics.clone(),
        ));

        info!("Signaling engine initialized");

        Self {
            connections,
            presence,
            relay,
            rooms,
            metrics,
            shutdown_tx,
        }
    }

    /// Returns a shutdown receiver for graceful shutdown coordination.
    pub fn shutdown_receiver(&self) -> broadcast::Receiver<()> {
        self.shutdown_tx.subscribe()
    }

    /// Closes every connection and notifies shutdown subscribers.
    pub fn shutdown(&self) {
        info!("Shutting down signaling engine");
        let _ = self.shutdown_tx.send(());
        self.connections.close_all();
        info!("Signaling engine shut down");
    }
}
