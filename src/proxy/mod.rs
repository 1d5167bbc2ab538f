//! Proxy rotation engine
//!
//! This module provides the rotation functionality including:
//! - Scored round-robin selection over the proxy pool
//! - Cooldowns for proxies that just failed
//! - Per-attempt execution and failure classification
//! - Request retries with optional exponential backoff

pub mod backoff;
pub mod cooldown;
pub mod engine;
pub mod executor;
pub mod selector;
pub mod state;
pub mod transport;

#[cfg(test)]
pub(crate) mod testing;

pub use cooldown::CooldownRegistry;
pub use engine::RotationEngine;
pub use executor::{AttemptFailure, FailureCategory, Outcome, RequestExecutor};
pub use selector::{score, ProxySelector};
pub use state::{RotationState, SharedState};
pub use transport::{HttpTransport, ProxyResponse, ReqwestTransport, TransportConfig, TransportError};
