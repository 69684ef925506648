//! Shared identifier types.

pub mod id;

pub use id::{ChatId, ConnectionId, MediaAddress, UserId};
