//! Mutable state shared by the engine and its executor
//!
//! Everything lives behind one mutex. The lock is taken for selection,
//! for the bookkeeping after an attempt, and for snapshots, and is never
//! held across an await point.

use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::Utc;
use parking_lot::Mutex;
use tracing::{debug, info, warn};

use super::cooldown::CooldownRegistry;
use super::executor::AttemptFailure;
use super::selector::ProxySelector;
use crate::models::{
    redact, EngineSettings, EngineStatus, FailureSummary, HealthTable, ProxyHealthRecord,
    ProxyStats,
};

pub type SharedState = Arc<Mutex<RotationState>>;

#[derive(Debug)]
pub struct RotationState {
    pub selector: ProxySelector,
    pub cooldowns: CooldownRegistry,
    pub health: HealthTable,
    pub settings: EngineSettings,
    pub total_successes: u64,
    pub total_failures: u64,
    pub last_failure: Option<FailureSummary>,
}

impl RotationState {
    pub fn new<I, S>(proxies: I, settings: EngineSettings) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let selector = ProxySelector::new(proxies);
        let health = selector
            .proxies()
            .iter()
            .map(|proxy| (proxy.clone(), ProxyHealthRecord::new()))
            .collect();

        Self {
            selector,
            cooldowns: CooldownRegistry::new(),
            health,
            settings,
            total_successes: 0,
            total_failures: 0,
            last_failure: None,
        }
    }

    pub fn shared<I, S>(proxies: I, settings: EngineSettings) -> SharedState
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Arc::new(Mutex::new(Self::new(proxies, settings)))
    }

    pub fn select(&mut self) -> Option<String> {
        self.selector.select(&mut self.cooldowns, &mut self.health)
    }

    /// Add a proxy to the pool with a fresh health record
    pub fn add_proxy(&mut self, proxy: String) -> bool {
        if !self.selector.add(proxy.clone()) {
            return false;
        }
        self.health.entry(proxy).or_default();
        true
    }

    /// Remove a proxy together with its cooldown entry and health record
    pub fn remove_proxy(&mut self, proxy: &str) -> bool {
        if !self.selector.remove(proxy) {
            return false;
        }
        self.cooldowns.remove(proxy);
        self.health.remove(proxy);
        true
    }

    pub fn record_success(&mut self, proxy: &str, elapsed: Duration) {
        self.total_successes += 1;

        let Some(record) = self.pool_record(proxy) else {
            return;
        };
        record.record_success(elapsed);
        info!(
            proxy = %redact(proxy),
            elapsed_secs = elapsed.as_secs_f64(),
            success_rate = record.success_rate(),
            "Request succeeded"
        );
    }

    /// Record a failed attempt and put the proxy on cooldown
    pub fn record_failure(&mut self, proxy: &str, failure: &AttemptFailure) {
        self.total_failures += 1;

        if let Some(record) = self.pool_record(proxy) {
            record.record_failure(failure.elapsed, failure.error.clone());
            warn!(
                proxy = %redact(proxy),
                elapsed_secs = failure.elapsed.as_secs_f64(),
                category = %failure.category,
                error = %failure.error,
                success_rate = record.success_rate(),
                "Request failed"
            );
        }

        self.blacklist(proxy, &failure.reason(), Some(&failure.error));

        self.last_failure = Some(FailureSummary {
            proxy: proxy.to_string(),
            category: failure.category,
            status: failure.status.map(|s| s.as_u16()),
            error: failure.error.clone(),
            at: Utc::now(),
        });
    }

    /// Put `proxy` on cooldown for the current cooldown period
    ///
    /// Non-members are honoured too; their entries are pruned once expired.
    pub fn blacklist(&mut self, proxy: &str, reason: &str, error: Option<&str>) {
        self.prune_departed(Instant::now());
        let cooldown = self.settings.cooldown;
        self.cooldowns.blacklist(proxy, reason, error, cooldown);
    }

    /// Drop expired cooldown entries of proxies that are not in the pool
    fn prune_departed(&mut self, now: Instant) {
        let selector = &self.selector;
        let dropped = self
            .cooldowns
            .prune_expired_at(now, |proxy| selector.contains(proxy));
        if dropped > 0 {
            debug!(dropped, "Pruned expired cooldowns of proxies outside the pool");
        }
    }

    /// Health record for a current pool member
    ///
    /// A proxy removed while its attempt was in flight gets no record back.
    fn pool_record(&mut self, proxy: &str) -> Option<&mut ProxyHealthRecord> {
        if !self.selector.contains(proxy) {
            debug!(proxy = %redact(proxy), "Proxy left the pool; not recording health");
            return None;
        }
        Some(self.health.entry(proxy.to_string()).or_default())
    }

    pub fn snapshot(&mut self) -> EngineStatus {
        self.snapshot_at(Instant::now())
    }

    pub fn snapshot_at(&mut self, now: Instant) -> EngineStatus {
        self.prune_departed(now);
        EngineStatus {
            total_successes: self.total_successes,
            total_failures: self.total_failures,
            blacklist_seconds_remaining: self.cooldowns.remaining_at(now),
            proxy_stats: self
                .health
                .iter()
                .map(|(proxy, record)| (proxy.clone(), ProxyStats::from(record)))
                .collect(),
            configured_proxies: self.selector.proxies().to_vec(),
            last_failure: self.last_failure.clone(),
        }
    }
}
