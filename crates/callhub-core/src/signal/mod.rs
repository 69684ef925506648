//! Signaling wire protocol.
//!
//! Every frame on the event channel is a JSON object of the form
//! `{"event": "<kebab-case-name>", "data": {...}}` with camelCase payload
//! fields. [`ClientEvent`] flows client → server, [`ServerEvent`] flows
//! server → client.

pub mod client;
pub mod server;

pub use client::ClientEvent;
pub use server::ServerEvent;
