//! Chat rooms joined over the signaling socket (typing indicators).

pub mod membership;
pub mod registry;

pub use registry::RoomRegistry;
