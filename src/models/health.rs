//! Per-proxy health counters

use std::collections::HashMap;
use std::time::Duration;

use chrono::{DateTime, Utc};

/// Health records keyed by proxy identifier
pub type HealthTable = HashMap<String, ProxyHealthRecord>;

/// Outcome counters for a single proxy
///
/// Counters only ever grow. Latency is accumulated for every attempt,
/// successful or not, but averaged over successes only.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ProxyHealthRecord {
    pub successes: u64,
    pub failures: u64,
    pub total_latency_seconds: f64,
    pub last_error: Option<String>,
    pub last_used_at: Option<DateTime<Utc>>,
}

impl ProxyHealthRecord {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of completed attempts through this proxy
    pub fn attempts(&self) -> u64 {
        self.successes + self.failures
    }

    /// Fraction of attempts that succeeded, 0 when the proxy is untested
    pub fn success_rate(&self) -> f64 {
        let total = self.attempts();
        if total == 0 {
            0.0
        } else {
            self.successes as f64 / total as f64
        }
    }

    /// Average latency in seconds, `f64::INFINITY` until the first success
    pub fn average_latency(&self) -> f64 {
        if self.successes == 0 {
            f64::INFINITY
        } else {
            self.total_latency_seconds / self.successes as f64
        }
    }

    pub fn record_success(&mut self, elapsed: Duration) {
        self.successes += 1;
        self.total_latency_seconds += elapsed.as_secs_f64();
        self.last_error = None;
        self.last_used_at = Some(Utc::now());
    }

    pub fn record_failure(&mut self, elapsed: Duration, error: impl Into<String>) {
        self.failures += 1;
        self.total_latency_seconds += elapsed.as_secs_f64();
        self.last_error = Some(error.into());
        self.last_used_at = Some(Utc::now());
    }
}
