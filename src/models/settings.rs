use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default cooldown applied to a failing proxy
pub const DEFAULT_COOLDOWN: Duration = Duration::from_secs(300);
/// Default connect timeout per attempt
pub const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(15);
/// Default read timeout per attempt
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);
/// Default number of attempts per request
pub const DEFAULT_MAX_RETRIES: u32 = 3;
/// Default upper bound for exponential backoff
pub const DEFAULT_BACKOFF_CAP: Duration = Duration::from_secs(30);

/// Connect/read timeout pair used for one attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    pub connect: Duration,
    pub read: Duration,
}

impl Timeouts {
    pub fn new(connect: Duration, read: Duration) -> Self {
        Self { connect, read }
    }

    /// Upper bound on the whole attempt
    pub fn total(&self) -> Duration {
        self.connect.saturating_add(self.read)
    }
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            connect: DEFAULT_CONNECT_TIMEOUT,
            read: DEFAULT_READ_TIMEOUT,
        }
    }
}

/// Engine-wide settings that can be changed at runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct EngineSettings {
    /// Cooldown applied to proxies blacklisted from now on
    pub cooldown: Duration,
    /// Timeouts used when a request does not override them
    pub timeouts: Timeouts,
}

impl EngineSettings {
    pub fn with_cooldown(cooldown: Duration) -> Self {
        Self {
            cooldown,
            ..Self::default()
        }
    }
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            cooldown: DEFAULT_COOLDOWN,
            timeouts: Timeouts::default(),
        }
    }
}

/// Partial change to [`EngineSettings`]; `None` keeps the current value
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SettingsUpdate {
    pub cooldown: Option<Duration>,
    pub connect_timeout: Option<Duration>,
    pub read_timeout: Option<Duration>,
}

impl SettingsUpdate {
    pub fn apply(&self, settings: &mut EngineSettings) {
        if let Some(cooldown) = self.cooldown {
            settings.cooldown = cooldown;
        }
        if let Some(connect) = self.connect_timeout {
            settings.timeouts.connect = connect;
        }
        if let Some(read) = self.read_timeout {
            settings.timeouts.read = read;
        }
    }
}

/// Serializable view of [`EngineSettings`] in seconds
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SettingsView {
    pub cooldown_seconds: f64,
    pub connect_timeout_seconds: f64,
    pub read_timeout_seconds: f64,
}

impl From<EngineSettings> for SettingsView {
    fn from(settings: EngineSettings) -> Self {
        Self {
            cooldown_seconds: settings.cooldown.as_secs_f64(),
            connect_timeout_seconds: settings.timeouts.connect.as_secs_f64(),
            read_timeout_seconds: settings.timeouts.read.as_secs_f64(),
        }
    }
}

/// Per-call options for [`crate::proxy::RotationEngine::request`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RequestOptions {
    /// Maximum number of attempts, each through a different proxy
    pub max_retries: u32,
    /// Base delay for exponential backoff; zero disables backoff
    pub backoff_base: Duration,
    /// Upper bound for a single backoff delay
    pub backoff_cap: Duration,
    /// Overrides the engine's default timeouts for this call
    pub timeouts: Option<Timeouts>,
}

impl RequestOptions {
    pub fn new(max_retries: u32) -> Self {
        Self {
            max_retries,
            ..Self::default()
        }
    }

    pub fn with_backoff(mut self, base: Duration, cap: Duration) -> Self {
        self.backoff_base = base;
        self.backoff_cap = cap;
        self
    }

    pub fn with_timeouts(mut self, timeouts: Timeouts) -> Self {
        self.timeouts = Some(timeouts);
        self
    }
}

impl Default for RequestOptions {
    fn default() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            backoff_base: Duration::ZERO,
            backoff_cap: DEFAULT_BACKOFF_CAP,
            timeouts: None,
        }
    }
}
