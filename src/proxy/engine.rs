//! Rotation engine
//!
//! Ties selection, execution and cooldowns together behind one public
//! surface. A `request()` call walks the retry state machine:
//! select a proxy, attempt, and on failure (the proxy is already on
//! cooldown by then) optionally back off and select again.

use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, error, info, warn};
use url::Url;

use super::backoff::backoff_delay;
use super::executor::{Outcome, RequestExecutor};
use super::state::{RotationState, SharedState};
use super::transport::{HttpTransport, ProxyResponse, ReqwestTransport, TransportConfig};
use crate::config::EngineConfig;
use crate::error::{Result, RotatorError};
use crate::models::{
    redact, EngineSettings, EngineStatus, RequestOptions, SettingsUpdate, Timeouts,
};

/// Scored round-robin proxy rotation with failure cooldowns
pub struct RotationEngine {
    state: SharedState,
    executor: RequestExecutor,
    /// Set when the engine owns its reqwest transport, so removed proxies
    /// can drop their cached clients
    reqwest: Option<Arc<ReqwestTransport>>,
}

impl RotationEngine {
    /// Create an engine backed by a [`ReqwestTransport`]
    ///
    /// Fails only if no HTTP client can be built.
    pub fn new<I, S>(proxies: I, settings: EngineSettings, transport: TransportConfig) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let reqwest = Arc::new(ReqwestTransport::new(transport)?);
        let mut engine = Self::with_transport(proxies, settings, reqwest.clone());
        engine.reqwest = Some(reqwest);
        Ok(engine)
    }

    /// Create an engine on top of any [`HttpTransport`]
    pub fn with_transport<I, S>(
        proxies: I,
        settings: EngineSettings,
        transport: Arc<dyn HttpTransport>,
    ) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let state = RotationState::shared(proxies, settings);
        {
            let state = state.lock();
            info!(
                proxies = state.selector.len(),
                cooldown_secs = settings.cooldown.as_secs_f64(),
                "Rotation engine initialized"
            );
        }

        Self {
            executor: RequestExecutor::new(transport, state.clone()),
            state,
            reqwest: None,
        }
    }

    pub fn from_config(config: &EngineConfig) -> Result<Self> {
        Self::new(
            config.proxies.iter().cloned(),
            config.settings(),
            config.transport(),
        )
    }

    /// GET `url` through the pool, retrying on a different proxy after failures
    ///
    /// Returns `Ok(None)` when the attempts are used up or no proxy is
    /// available; details are in [`RotationEngine::get_status`]. `Err` is
    /// only returned for a malformed target URL, before any proxy is used.
    pub async fn request(&self, url: &str, options: &RequestOptions) -> Result<Option<ProxyResponse>> {
        let target = validate_target(url)?;
        let timeouts = options
            .timeouts
            .unwrap_or_else(|| self.state.lock().settings.timeouts);

        let max_attempts = options.max_retries;
        let mut attempts = 0;

        while attempts < max_attempts {
            let Some(proxy) = self.select() else {
                warn!(url = %target, attempts, "No proxy available for request");
                return Ok(None);
            };

            debug!(
                "Requesting {} through proxy {} (attempt {}/{})",
                target,
                redact(&proxy),
                attempts + 1,
                max_attempts
            );

            match self.executor.attempt(target.as_str(), &proxy, timeouts).await {
                Outcome::Success { response, .. } => return Ok(Some(response)),
                Outcome::Failure(failure) => {
                    attempts += 1;
                    warn!(
                        "Request through {} failed: {} (attempt {}/{})",
                        redact(&proxy),
                        failure.reason(),
                        attempts,
                        max_attempts
                    );

                    if attempts < max_attempts {
                        let delay = backoff_delay(options.backoff_base, options.backoff_cap, attempts);
                        if !delay.is_zero() {
                            debug!(delay_secs = delay.as_secs_f64(), "Backing off before next attempt");
                            tokio::time::sleep(delay).await;
                        }
                    }
                }
            }
        }

        let last_failure = self.state.lock().last_failure.clone();
        error!(
            url = %target,
            attempts,
            last_error = last_failure.as_ref().map(|f| f.error.as_str()).unwrap_or(""),
            "All request attempts failed"
        );
        Ok(None)
    }

    /// Next proxy by scored rotation, or `None` if none is available
    pub fn select(&self) -> Option<String> {
        self.state.lock().select()
    }

    /// Put a proxy on cooldown for the current cooldown period
    pub fn blacklist(&self, proxy: &str, reason: &str) {
        self.state.lock().blacklist(proxy, reason, None);
    }

    pub fn is_available(&self, proxy: &str) -> bool {
        self.state.lock().cooldowns.is_available(proxy)
    }

    /// Append proxies not already in the pool; returns how many were added
    pub fn add_proxies<I, S>(&self, proxies: I) -> usize
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut state = self.state.lock();
        let mut added = 0;
        for proxy in proxies {
            if state.add_proxy(proxy.into()) {
                added += 1;
            }
        }
        if added > 0 {
            info!(added, total = state.selector.len(), "Added proxies");
        }
        added
    }

    /// Remove a proxy with its cooldown and health; false if it was absent
    pub fn remove_proxy(&self, proxy: &str) -> bool {
        let removed = self.state.lock().remove_proxy(proxy);
        if removed {
            if let Some(reqwest) = &self.reqwest {
                reqwest.evict(proxy);
            }
            info!(proxy = %redact(proxy), "Removed proxy");
        }
        removed
    }

    /// Default timeouts for requests that do not override them
    pub fn set_timeouts(&self, connect: Duration, read: Duration) {
        self.state.lock().settings.timeouts = Timeouts::new(connect, read);
        info!(
            connect_secs = connect.as_secs_f64(),
            read_secs = read.as_secs_f64(),
            "Updated timeouts"
        );
    }

    /// Cooldown for proxies blacklisted from now on
    ///
    /// Proxies already on cooldown keep their expiry.
    pub fn set_cooldown(&self, cooldown: Duration) {
        self.state.lock().settings.cooldown = cooldown;
        info!(cooldown_secs = cooldown.as_secs_f64(), "Updated cooldown");
    }

    /// Apply a partial settings change atomically and return the result
    pub fn update_settings(&self, update: SettingsUpdate) -> EngineSettings {
        let settings = {
            let mut state = self.state.lock();
            update.apply(&mut state.settings);
            state.settings
        };
        info!(
            cooldown_secs = settings.cooldown.as_secs_f64(),
            connect_secs = settings.timeouts.connect.as_secs_f64(),
            read_secs = settings.timeouts.read.as_secs_f64(),
            "Updated settings"
        );
        settings
    }

    pub fn settings(&self) -> EngineSettings {
        self.state.lock().settings
    }

    pub fn get_status(&self) -> EngineStatus {
        self.state.lock().snapshot()
    }
}

/// Accept only absolute http(s) URLs
fn validate_target(url: &str) -> Result<Url> {
    let target = Url::parse(url)?;
    match target.scheme() {
        "http" | "https" if target.host_str().is_some() => Ok(target),
        "http" | "https" => Err(RotatorError::InvalidUrl(format!("'{}': missing host", url))),
        other => Err(RotatorError::InvalidUrl(format!(
            "'{}': unsupported scheme '{}'",
            url, other
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::DEFAULT_COOLDOWN;
    use crate::proxy::executor::FailureCategory;
    use crate::proxy::testing::ScriptedTransport;
    use std::time::Instant;

    const URL: &str = "http://example.test/data";

    fn engine(proxies: &[&str], cooldown: Duration) -> (RotationEngine, Arc<ScriptedTransport>) {
        let transport = Arc::new(ScriptedTransport::new());
        let engine = RotationEngine::with_transport(
            proxies.iter().copied(),
            EngineSettings::with_cooldown(cooldown),
            transport.clone(),
        );
        (engine, transport)
    }

    #[tokio::test]
    async fn test_failures_rotate_to_a_working_proxy() {
        let (engine, transport) = engine(
            &["http://fail1", "http://timeout2", "http://ok3"],
            Duration::from_secs(60),
        );

        let response = engine.request(URL, &RequestOptions::new(3)).await.unwrap();
        let response = response.expect("ok3 should answer");
        assert_eq!(response.proxy, "http://ok3");
        assert_eq!(response.text(), "ok");

        let status = engine.get_status();
        assert_eq!(status.total_successes, 1);
        assert_eq!(status.total_failures, 2);
        assert!(status.blacklist_seconds_remaining.contains_key("http://fail1"));
        assert!(status.blacklist_seconds_remaining.contains_key("http://timeout2"));
        assert_eq!(
            transport.calls(),
            vec!["http://fail1", "http://timeout2", "http://ok3"]
        );
    }

    #[tokio::test]
    async fn test_http_error_is_a_failure() {
        let (engine, _) = engine(&["http://http500proxy", "http://okproxy"], Duration::from_secs(60));

        let response = engine.request(URL, &RequestOptions::new(2)).await.unwrap();
        assert_eq!(response.unwrap().proxy, "http://okproxy");

        let status = engine.get_status();
        assert!(status.total_failures >= 1);
        assert_eq!(status.total_successes, 1);
        assert_eq!(
            status.last_failure.unwrap().category,
            FailureCategory::HttpError
        );
    }

    #[tokio::test]
    async fn test_exhaustion_returns_none_after_max_retries() {
        let (engine, transport) = engine(
            &["http://fail1", "http://fail2", "http://fail3", "http://fail4"],
            Duration::from_secs(60),
        );

        let response = engine.request(URL, &RequestOptions::new(2)).await.unwrap();
        assert!(response.is_none());
        assert_eq!(transport.calls().len(), 2);
        assert_eq!(engine.get_status().total_failures, 2);
    }

    #[tokio::test]
    async fn test_exhaustion_stops_when_pool_runs_dry() {
        let (engine, transport) = engine(&["http://fail1", "http://fail2"], Duration::from_secs(60));

        let response = engine.request(URL, &RequestOptions::new(5)).await.unwrap();
        assert!(response.is_none());
        assert_eq!(transport.calls(), vec!["http://fail1", "http://fail2"]);
    }

    #[tokio::test]
    async fn test_same_proxy_never_attempted_twice_in_a_row() {
        // Near-zero cooldown lets the failed proxy rejoin quickly
        let (engine, transport) = engine(
            &["http://fail1", "http://fail2", "http://fail3"],
            Duration::from_nanos(1),
        );

        let response = engine.request(URL, &RequestOptions::new(6)).await.unwrap();
        assert!(response.is_none());

        let calls = transport.calls();
        assert_eq!(calls.len(), 6);
        for pair in calls.windows(2) {
            assert_ne!(pair[0], pair[1]);
        }
    }

    #[tokio::test]
    async fn test_zero_retries_makes_no_attempt() {
        let (engine, transport) = engine(&["http://ok1"], Duration::from_secs(60));
        let response = engine.request(URL, &RequestOptions::new(0)).await.unwrap();
        assert!(response.is_none());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_empty_pool_returns_none() {
        let (engine, transport) = engine(&[], Duration::from_secs(60));
        let response = engine.request(URL, &RequestOptions::default()).await.unwrap();
        assert!(response.is_none());
        assert!(transport.calls().is_empty());
    }

    #[tokio::test]
    async fn test_invalid_url_touches_no_proxy() {
        let (engine, transport) = engine(&["http://ok1"], Duration::from_secs(60));

        for url in ["not a url", "ftp://example.test/file", "/relative/path"] {
            let err = engine.request(url, &RequestOptions::default()).await.unwrap_err();
            assert!(matches!(err, RotatorError::InvalidUrl(_)), "{}", url);
        }
        assert!(transport.calls().is_empty());
        assert_eq!(engine.get_status().total_failures, 0);
    }

    #[tokio::test]
    async fn test_backoff_delays_between_attempts() {
        let (engine, _) = engine(
            &["http://fail1", "http://fail2", "http://ok3"],
            Duration::from_secs(60),
        );
        let options = RequestOptions::new(3)
            .with_backoff(Duration::from_millis(50), Duration::from_secs(1));

        let start = Instant::now();
        let response = engine.request(URL, &options).await.unwrap();
        assert!(response.is_some());
        // 50ms after the first failure, 100ms after the second
        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_no_backoff_after_final_attempt() {
        let (engine, _) = engine(&["http://fail1"], Duration::from_secs(60));
        let options = RequestOptions::new(1)
            .with_backoff(Duration::from_secs(5), Duration::from_secs(5));

        let start = Instant::now();
        assert!(engine.request(URL, &options).await.unwrap().is_none());
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_counters_are_monotonic() {
        let (engine, _) = engine(&["http://ok1", "http://fail2"], Duration::from_nanos(1));

        let mut previous = (0, 0);
        for _ in 0..6 {
            let _ = engine.request(URL, &RequestOptions::new(2)).await.unwrap();
            let status = engine.get_status();
            assert!(status.total_successes >= previous.0);
            assert!(status.total_failures >= previous.1);
            previous = (status.total_successes, status.total_failures);

            for stats in status.proxy_stats.values() {
                assert!(stats.success_rate >= 0.0 && stats.success_rate <= 1.0);
            }
        }
        let status = engine.get_status();
        let attempts: u64 = status
            .proxy_stats
            .values()
            .map(|s| s.successes + s.failures)
            .sum();
        assert_eq!(attempts, status.total_successes + status.total_failures);
    }

    #[tokio::test]
    async fn test_blacklist_and_expiry_through_engine() {
        let (engine, _) = engine(
            &["http://p1", "http://p2", "http://p3"],
            Duration::from_millis(200),
        );
        engine.blacklist("http://p2", "manual");
        assert!(!engine.is_available("http://p2"));

        let picks: Vec<_> = (0..3).filter_map(|_| engine.select()).collect();
        assert_eq!(picks, vec!["http://p1", "http://p3", "http://p1"]);

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(engine.select().as_deref(), Some("http://p2"));
    }

    #[tokio::test]
    async fn test_add_and_remove_proxies() {
        let (engine, _) = engine(&["http://p1"], DEFAULT_COOLDOWN);

        assert_eq!(engine.add_proxies(["http://p1", "http://p2", "http://p3"]), 2);
        assert_eq!(engine.add_proxies(["http://p2"]), 0);
        assert_eq!(
            engine.get_status().configured_proxies,
            vec!["http://p1", "http://p2", "http://p3"]
        );

        engine.blacklist("http://p2", "manual");
        assert!(engine.remove_proxy("http://p2"));
        assert!(!engine.remove_proxy("http://p2"));

        let status = engine.get_status();
        assert!(!status.blacklist_seconds_remaining.contains_key("http://p2"));
        assert!(!status.proxy_stats.contains_key("http://p2"));
        assert_eq!(status.configured_proxies, vec!["http://p1", "http://p3"]);
    }

    #[tokio::test]
    async fn test_set_cooldown_is_not_retroactive() {
        let (engine, _) = engine(&["http://p1", "http://p2"], Duration::from_secs(100));
        engine.blacklist("http://p1", "manual");

        engine.set_cooldown(Duration::from_secs(5));
        engine.blacklist("http://p2", "manual");

        let remaining = engine.get_status().blacklist_seconds_remaining;
        assert!(remaining["http://p1"] > 90.0);
        assert!(remaining["http://p2"] <= 5.0);
        assert_eq!(engine.settings().cooldown, Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_set_timeouts_updates_defaults() {
        let (engine, _) = engine(&["http://p1"], DEFAULT_COOLDOWN);
        engine.set_timeouts(Duration::from_secs(2), Duration::from_secs(4));
        assert_eq!(
            engine.settings().timeouts,
            Timeouts::new(Duration::from_secs(2), Duration::from_secs(4))
        );
    }

    #[tokio::test]
    async fn test_update_settings_applies_partial_change() {
        let (engine, _) = engine(&["http://p1"], Duration::from_secs(100));
        let updated = engine.update_settings(SettingsUpdate {
            cooldown: Some(Duration::from_secs(9)),
            connect_timeout: Some(Duration::from_secs(3)),
            read_timeout: None,
        });

        assert_eq!(updated, engine.settings());
        assert_eq!(updated.cooldown, Duration::from_secs(9));
        assert_eq!(updated.timeouts.connect, Duration::from_secs(3));
        assert_eq!(updated.timeouts.read, Timeouts::default().read);

        engine.blacklist("http://p1", "manual");
        assert!(engine.get_status().blacklist_seconds_remaining["http://p1"] <= 9.0);
    }

    #[tokio::test]
    async fn test_status_serializes_untested_latency_as_null() {
        let (engine, _) = engine(&["http://p1"], DEFAULT_COOLDOWN);
        let value = serde_json::to_value(engine.get_status()).unwrap();
        assert!(value["proxy_stats"]["http://p1"]["average_latency"].is_null());
        assert_eq!(value["configured_proxies"][0], "http://p1");
    }

    #[tokio::test]
    async fn test_concurrent_requests_share_state() {
        let transport = Arc::new(ScriptedTransport::new().with_delay(Duration::from_millis(5)));
        let engine = Arc::new(RotationEngine::with_transport(
            ["http://ok1", "http://ok2", "http://fail3", "http://ok4"],
            EngineSettings::with_cooldown(Duration::from_secs(60)),
            transport.clone(),
        ));

        let tasks: Vec<_> = (0..16)
            .map(|_| {
                let engine = engine.clone();
                tokio::spawn(async move { engine.request(URL, &RequestOptions::new(3)).await })
            })
            .collect();

        let mut succeeded = 0;
        for task in tasks {
            if task.await.unwrap().unwrap().is_some() {
                succeeded += 1;
            }
        }

        let status = engine.get_status();
        assert_eq!(succeeded, 16);
        assert_eq!(status.total_successes, 16);
        // Only fail3 can fail, and never after its first failure lands
        assert!(status.total_failures >= 1);
        assert_eq!(status.last_failure.unwrap().proxy, "http://fail3");
        assert_eq!(status.proxy_stats["http://fail3"].successes, 0);
        assert_eq!(
            (status.total_successes + status.total_failures) as usize,
            transport.calls().len()
        );
    }

    #[tokio::test]
    async fn test_new_builds_reqwest_transport() {
        let engine = RotationEngine::new(
            ["http://127.0.0.1:9"],
            EngineSettings::default(),
            TransportConfig::default(),
        )
        .unwrap();
        assert!(engine.reqwest.is_some());
        assert!(engine.remove_proxy("http://127.0.0.1:9"));
    }
}
