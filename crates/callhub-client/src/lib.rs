//! # callhub-client
//!
//! Client side of CallHub signaling:
//!
//! - [`machine::CallStateMachine`]: the local view of one call, driven by a
//!   serialized event queue
//! - [`agent::CallAgent`] / [`agent::CallHandle`]: the task that owns the
//!   machine and the handle the UI talks to
//! - [`media`]: traits over the external peer-media library
//! - [`transport::SignalingClient`]: the WebSocket link to the server

pub mod agent;
pub mod event;
pub mod machine;
pub mod media;
pub mod session;
pub mod transport;

pub use agent::{AgentConfig, CallAgent, CallHandle, CallNotice, EndReason};
pub use machine::CallStateMachine;
pub use session::{CallSnapshot, CallStatus, LocalIdentity, PeerInfo};
