//! Temporary exclusion of failing proxies
//!
//! Entries are evicted lazily, the first time a check observes them as
//! expired. There is no background sweep.

use std::collections::{BTreeMap, HashMap};
use std::time::{Duration, Instant};

use tracing::{debug, info};

use crate::models::redact;

/// Cap for cooldowns too large to add to an `Instant`
const MAX_COOLDOWN: Duration = Duration::from_secs(u32::MAX as u64);

/// Maps a proxy to the instant its blacklist expires
#[derive(Debug, Default)]
pub struct CooldownRegistry {
    entries: HashMap<String, Instant>,
}

impl CooldownRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Put `proxy` on cooldown, overwriting any earlier expiry
    ///
    /// Proxies that are not (or no longer) in the pool are accepted too.
    pub fn blacklist(&mut self, proxy: &str, reason: &str, error: Option<&str>, cooldown: Duration) {
        self.blacklist_at(proxy, reason, error, cooldown, Instant::now());
    }

    pub fn blacklist_at(
        &mut self,
        proxy: &str,
        reason: &str,
        error: Option<&str>,
        cooldown: Duration,
        now: Instant,
    ) {
        let until = now
            .checked_add(cooldown)
            .unwrap_or_else(|| now + MAX_COOLDOWN);
        self.entries.insert(proxy.to_string(), until);

        info!(
            proxy = %redact(proxy),
            reason = if reason.is_empty() { "unspecified" } else { reason },
            error = error.unwrap_or(""),
            cooldown_secs = cooldown.as_secs_f64(),
            "Blacklisted proxy"
        );
    }

    /// Whether `proxy` may be selected; evicts the entry if it just expired
    pub fn is_available(&mut self, proxy: &str) -> bool {
        self.is_available_at(proxy, Instant::now())
    }

    pub fn is_available_at(&mut self, proxy: &str, now: Instant) -> bool {
        let Some(&until) = self.entries.get(proxy) else {
            return true;
        };

        if now < until {
            debug!(
                proxy = %redact(proxy),
                remaining_secs = (until - now).as_secs_f64(),
                "Proxy still on cooldown"
            );
            return false;
        }

        self.entries.remove(proxy);
        info!(proxy = %redact(proxy), "Rehabilitated proxy after cooldown");
        true
    }

    /// Drop any entry for `proxy`
    pub fn remove(&mut self, proxy: &str) -> bool {
        self.entries.remove(proxy).is_some()
    }

    /// Seconds remaining per entry, clamped at zero; does not evict
    pub fn remaining_at(&self, now: Instant) -> BTreeMap<String, f64> {
        self.entries
            .iter()
            .map(|(proxy, until)| {
                (
                    proxy.clone(),
                    until.saturating_duration_since(now).as_secs_f64(),
                )
            })
            .collect()
    }

    /// Drop expired entries for which `keep` returns false
    ///
    /// Returns how many entries were dropped.
    pub fn prune_expired_at(&mut self, now: Instant, keep: impl Fn(&str) -> bool) -> usize {
        let before = self.entries.len();
        self.entries.retain(|proxy, until| now < *until || keep(proxy));
        before - self.entries.len()
    }

    pub fn contains(&self, proxy: &str) -> bool {
        self.entries.contains_key(proxy)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
