//! Client-side call settings.

use serde::{Deserialize, Serialize};

/// Settings used by the client call agent.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CallConfig {
    /// Seconds an unanswered call may stay in `calling` or `ringing`
    /// before it is torn down locally.
    #[serde(default = "default_ring_timeout")]
    pub ring_timeout_seconds: u64,
    /// WebSocket URL of the signaling server.
    #[serde(default = "default_signaling_url")]
    pub signaling_url: String,
}

impl Default for CallConfig {
    fn default() -> Self {
        Self {
            ring_timeout_seconds: default_ring_timeout(),
            signaling_url: default_signaling_url(),
        }
    }
}

fn default_ring_timeout() -> u64 {
    30
}

fn default_signaling_url() -> String {
    "ws://127.0.0.1:3000/ws".to_string()
}
