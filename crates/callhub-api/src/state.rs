//! Shared application state passed to every handler.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use callhub_auth::jwt::JwtDecoder;
use callhub_core::config::AppConfig;
use callhub_realtime::RealtimeEngine;
use callhub_realtime::connection::authenticator::WsAuthenticator;

/// Application state (cheap to clone).
#[derive(Debug, Clone)]
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<AppConfig>,
    /// Token authenticator for socket upgrades.
    pub authenticator: WsAuthenticator,
    /// Signaling engine.
    pub realtime: RealtimeEngine,
    /// Process start time.
    pub started_at: DateTime<Utc>,
}

impl AppState {
    /// Builds the state from configuration.
    pub fn new(config: AppConfig) -> Self {
        let decoder = Arc::new(JwtDecoder::new(&config.auth));
        let realtime = RealtimeEngine::new(config.realtime.clone());
        Self {
            config: Arc::new(config),
            authenticator: WsAuthenticator::new(decoder),
            realtime,
            started_at: Utc::now(),
        }
    }
}
