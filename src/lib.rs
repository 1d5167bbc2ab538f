//! Proxy Rotator - Resilient Proxy Rotation Engine
//!
//! Sends HTTP requests through a pool of upstream proxies.
//!
//! ## Features
//!
//! - Scored round-robin selection (success rate and latency)
//! - Cooldown blacklisting of failing proxies with lazy rehabilitation
//! - Retries on a different proxy with optional exponential backoff
//! - HTTP, HTTPS, SOCKS4 and SOCKS5 upstream proxies
//! - Status snapshots for dashboards and an admin API

pub mod api;
pub mod config;
pub mod error;
pub mod models;
pub mod proxy;

pub use config::Config;
pub use error::{Result, RotatorError};
pub use models::{EngineStatus, RequestOptions};
pub use proxy::{ProxyResponse, RotationEngine};
