//! # callhub-core
//!
//! Core crate for CallHub. Contains configuration schemas, typed
//! identifiers, the signaling wire protocol shared by server and client,
//! and the unified error system.
//!
//! This crate has **no** internal dependencies on other CallHub crates.

pub mod config;
pub mod error;
pub mod result;
pub mod signal;
pub mod types;

pub use error::AppError;
pub use result::AppResult;
