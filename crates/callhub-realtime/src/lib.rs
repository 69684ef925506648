//! # callhub-realtime
//!
//! Server side of CallHub signaling. Provides:
//!
//! - WebSocket connection management with token authentication
//! - The presence registry mapping each user to their live connection and
//!   media address
//! - The stateless call relay that routes call-request, call-accept, and
//!   call-end between two users
//! - Chat rooms with typing indicators
//! - Heartbeat and engine metrics

pub mod connection;
pub mod message;
pub mod metrics;
pub mod presence;
pub mod relay;
pub mod room;
pub mod server;

pub use connection::manager::ConnectionManager;
pub use presence::registry::PresenceRegistry;
pub use relay::router::CallRelay;
pub use room::registry::RoomRegistry;
pub use server::RealtimeEngine;
