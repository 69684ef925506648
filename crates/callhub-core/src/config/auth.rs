//! Token validation configuration.

use serde::{Deserialize, Serialize};

/// Settings for validating the identity token presented at WebSocket upgrade.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthConfig {
    /// HMAC secret shared with the login service that issues tokens.
    #[serde(default = "default_secret")]
    pub jwt_secret: String,
    /// Lifetime of tokens minted by the CLI, in minutes.
    #[serde(default = "default_ttl")]
    pub token_ttl_minutes: u64,
    /// Cookie name checked when no `token` query parameter is given.
    #[serde(default = "default_cookie")]
    pub token_cookie: String,
    /// Allowed clock skew in seconds.
    #[serde(default = "default_leeway")]
    pub leeway_seconds: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            jwt_secret: default_secret(),
            token_ttl_minutes: default_ttl(),
            token_cookie: default_cookie(),
            leeway_seconds: default_leeway(),
        }
    }
}

fn default_secret() -> String {
    "change-me-in-production".to_string()
}

fn default_ttl() -> u64 {
    60 * 24
}

fn default_cookie() -> String {
    "jwt".to_string()
}

fn default_leeway() -> u64 {
    5
}
