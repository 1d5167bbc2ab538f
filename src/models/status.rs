//! Monitoring snapshot returned by `RotationEngine::get_status`

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::Serialize;

use super::health::ProxyHealthRecord;
use crate::proxy::executor::FailureCategory;

/// Point-in-time view of the engine, taken under the state lock
#[derive(Debug, Clone, Serialize)]
pub struct EngineStatus {
    pub total_successes: u64,
    pub total_failures: u64,
    /// Seconds until each blacklisted proxy becomes eligible again (0 when already expired)
    pub blacklist_seconds_remaining: BTreeMap<String, f64>,
    pub proxy_stats: BTreeMap<String, ProxyStats>,
    /// Pool members in rotation order
    pub configured_proxies: Vec<String>,
    /// Most recent failed attempt, kept for diagnostics
    pub last_failure: Option<FailureSummary>,
}

/// Per-proxy statistics inside [`EngineStatus`]
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ProxyStats {
    pub successes: u64,
    pub failures: u64,
    pub success_rate: f64,
    /// Serialized as `null` while the proxy has no successes
    pub average_latency: f64,
    pub last_error: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl From<&ProxyHealthRecord> for ProxyStats {
    fn from(record: &ProxyHealthRecord) -> Self {
        Self {
            successes: record.successes,
            failures: record.failures,
            success_rate: record.success_rate(),
            average_latency: record.average_latency(),
            last_error: record.last_error.clone(),
            last_used_at: record.last_used_at,
        }
    }
}

/// The last classified failure seen by the engine
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct FailureSummary {
    pub proxy: String,
    pub category: FailureCategory,
    /// HTTP status for `proxy-auth-required` and `http-error`
    pub status: Option<u16>,
    pub error: String,
    pub at: DateTime<Utc>,
}
