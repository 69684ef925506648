//! Inbound frame validation and the JSON codec for signaling events.

pub mod serializer;
pub mod validator;
