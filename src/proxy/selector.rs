//! Scored round-robin proxy selection
//!
//! The pool is a ring. Each call walks one full revolution starting at the
//! cursor, skips proxies on cooldown, scores the rest and returns the best
//! one. Ties go to the candidate met first, so with equal scores the
//! selector degrades to plain round-robin.

use std::time::Instant;

use tracing::{debug, warn};

use super::cooldown::CooldownRegistry;
use crate::models::{redact, HealthTable, ProxyHealthRecord};

/// Score lost per second of average latency
pub const LATENCY_PENALTY: f64 = 0.05;
/// Average latency above this many seconds is not penalized further
pub const LATENCY_CAP_SECS: f64 = 60.0;

/// Rank a proxy by its success rate minus a capped latency penalty
///
/// An untested proxy has an infinite average latency and scores -3.0, below
/// any proxy with a reasonable record of successes.
pub fn score(record: &ProxyHealthRecord) -> f64 {
    record.success_rate() - LATENCY_PENALTY * record.average_latency().min(LATENCY_CAP_SECS)
}

/// Owns the proxy ring and the rotation cursor
#[derive(Debug, Default)]
pub struct ProxySelector {
    ring: Vec<String>,
    cursor: usize,
}

impl ProxySelector {
    /// Build a ring in insertion order, dropping duplicates
    pub fn new<I, S>(proxies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut selector = Self::default();
        for proxy in proxies {
            selector.add(proxy);
        }
        selector
    }

    /// Append a proxy; returns false if it is already present
    pub fn add(&mut self, proxy: impl Into<String>) -> bool {
        let proxy = proxy.into();
        if self.contains(&proxy) {
            return false;
        }
        self.ring.push(proxy);
        true
    }

    /// Remove a proxy, keeping the cursor on the same next candidate
    pub fn remove(&mut self, proxy: &str) -> bool {
        let Some(idx) = self.ring.iter().position(|p| p == proxy) else {
            return false;
        };
        self.ring.remove(idx);

        if idx < self.cursor {
            self.cursor -= 1;
        }
        if self.cursor >= self.ring.len() {
            self.cursor = 0;
        }
        true
    }

    pub fn contains(&self, proxy: &str) -> bool {
        self.ring.iter().any(|p| p == proxy)
    }

    pub fn len(&self) -> usize {
        self.ring.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ring.is_empty()
    }

    /// Pool members in ring order
    pub fn proxies(&self) -> &[String] {
        &self.ring
    }

    /// Ring index where the next revolution starts
    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn select(&mut self, cooldowns: &mut CooldownRegistry, health: &mut HealthTable) -> Option<String> {
        self.select_at(cooldowns, health, Instant::now())
    }

    /// Pick the best eligible proxy over one revolution of the ring
    ///
    /// Returns `None` when the pool is empty or every member is cooling
    /// down. The cursor moves past the returned proxy; when nothing is
    /// returned the full revolution leaves it where it was.
    pub fn select_at(
        &mut self,
        cooldowns: &mut CooldownRegistry,
        health: &mut HealthTable,
        now: Instant,
    ) -> Option<String> {
        let len = self.ring.len();
        if len == 0 {
            warn!("No proxies configured");
            return None;
        }

        let start = self.cursor % len;
        let mut best: Option<(usize, f64)> = None;

        for offset in 0..len {
            let idx = (start + offset) % len;
            let candidate = &self.ring[idx];

            if !cooldowns.is_available_at(candidate, now) {
                continue;
            }

            let record = health.entry(candidate.clone()).or_default();
            let candidate_score = score(record);
            if best.map_or(true, |(_, best_score)| candidate_score > best_score) {
                best = Some((idx, candidate_score));
            }
        }

        match best {
            Some((idx, best_score)) => {
                self.cursor = (idx + 1) % len;
                let selected = self.ring[idx].clone();
                debug!(proxy = %redact(&selected), score = best_score, "Selected proxy");
                Some(selected)
            }
            None => {
                warn!(pool_size = len, "All proxies are on cooldown; no proxy available");
                None
            }
        }
    }
}
