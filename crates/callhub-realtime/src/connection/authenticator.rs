//! WebSocket authentication: validates the identity token presented at upgrade.

use std::sync::Arc;

use callhub_auth::jwt::JwtDecoder;
use callhub_core::error::AppError;
use callhub_core::types::UserId;

/// Authenticated connection info extracted from the token.
#[derive(Debug, Clone)]
pub struct AuthenticatedConnection {
    /// User ID.
    pub user_id: UserId,
    /// Display name.
    pub username: String,
}

/// Authenticates WebSocket connections using JWT tokens.
#[derive(Clone)]
pub struct WsAuthenticator {
    /// JWT decoder.
    decoder: Arc<JwtDecoder>,
}

impl std::fmt::Debug for WsAuthenticator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WsAuthenticator").finish()
    }
}

impl WsAuthenticator {
    /// Creates a new WebSocket authenticator.
    pub fn new(decoder: Arc<JwtDecoder>) -> Self {
        Self { decoder }
    }

    /// Authenticates a connection from a token (query parameter or cookie).
    pub fn authenticate(&self, token: Option<&str>) -> Result<AuthenticatedConnection, AppError> {
        let token = token
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .ok_or_else(|| AppError::authentication("Missing identity token"))?;

        let claims = self.decoder.decode(token)?;
        let username = if claims.username.is_empty() {
            claims.sub.to_string()
        } else {
            claims.username.clone()
        };

        Ok(AuthenticatedConnection {
            user_id: claims.sub,
            username,
        })
    }
}
