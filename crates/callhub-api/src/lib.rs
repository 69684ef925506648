//! # callhub-api
//!
//! HTTP layer for CallHub built on Axum.
//!
//! Provides the `/ws` signaling upgrade (token from query or cookie),
//! health endpoints, CORS, error mapping, and the server lifecycle.

pub mod app;
pub mod dto;
pub mod error;
pub mod handlers;
pub mod middleware;
pub mod router;
pub mod state;

pub use app::{build_app, run_server};
pub use error::ApiError;
pub use state::AppState;
