//! API server implementation
//!
//! Provides REST endpoints for monitoring and administering the rotation engine.

pub mod handlers;
pub mod middleware;
pub mod routes;
pub mod server;

pub use server::{ApiServer, AppState};
