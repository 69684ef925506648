//! # callhub-auth
//!
//! Identity tokens for CallHub. The login service that issues tokens lives
//! outside this workspace; the signaling server only needs to validate
//! them at WebSocket upgrade. The encoder exists for the CLI and for tests.

pub mod jwt;

pub use jwt::{Claims, JwtDecoder, JwtEncoder};
