//! Stateless call signaling relay.

pub mod outcome;
pub mod router;

pub use outcome::{DropReason, RelayOutcome};
pub use router::CallRelay;
