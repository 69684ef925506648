//! Presence registry: who can currently be called, and how to reach them.

pub mod entry;
pub mod registry;

pub use entry::{PresenceEntry, PresenceSnapshot};
pub use registry::PresenceRegistry;
