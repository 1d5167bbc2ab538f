use crate::error::{Result, RotatorError};
use crate::models::{parse_proxy_identifier, EngineSettings, RequestOptions, Timeouts};
use crate::proxy::TransportConfig;
use std::env;
use std::fs;
use std::time::Duration;

/// Application configuration loaded from environment variables
#[derive(Debug, Clone)]
pub struct Config {
    /// Rotation engine configuration
    pub engine: EngineConfig,
    /// API server configuration
    pub api: ApiServerConfig,
    /// Logging configuration
    pub log: LogConfig,
}

#[derive(Debug, Clone, PartialEq)]
pub struct EngineConfig {
    /// Initial pool, normalized, in configuration order
    pub proxies: Vec<String>,
    /// Cooldown after a failure (default: 300s)
    pub cooldown: Duration,
    /// Connect timeout per attempt (default: 15s)
    pub connect_timeout: Duration,
    /// Read timeout per attempt (default: 30s)
    pub read_timeout: Duration,
    /// Attempts per request (default: 3)
    pub max_retries: u32,
    /// Backoff base delay; zero disables backoff (default: 0)
    pub backoff_base: Duration,
    /// Backoff upper bound (default: 30s)
    pub backoff_cap: Duration,
    /// Redirects followed per attempt (default: 10)
    pub max_redirects: usize,
    /// User-Agent sent with every request
    pub user_agent: Option<String>,
}

#[derive(Debug, Clone)]
pub struct ApiServerConfig {
    /// Port for the API server (default: 8001)
    pub port: u16,
    /// Host to bind to (default: 0.0.0.0)
    pub host: String,
    /// Allowed CORS origins (comma-separated, empty = localhost only)
    pub cors_origins: Vec<String>,
}

#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Log level (debug, info, warn, error)
    pub level: String,
    /// Output format (json, pretty)
    pub format: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Config {
            engine: EngineConfig::from_env()?,
            api: ApiServerConfig {
                port: get_env_or("API_PORT", "8001").parse().map_err(|_| {
                    RotatorError::InvalidConfig("API_PORT must be a valid port number".into())
                })?,
                host: get_env_or("API_HOST", "0.0.0.0"),
                cors_origins: split_list(&get_env_or("CORS_ORIGINS", "")),
            },
            log: LogConfig {
                level: get_env_or("LOG_LEVEL", "info"),
                format: get_env_or("LOG_FORMAT", "json"),
            },
        })
    }

    /// Get the API server address
    pub fn api_addr(&self) -> String {
        format!("{}:{}", self.api.host, self.api.port)
    }
}

impl EngineConfig {
    pub fn from_env() -> Result<Self> {
        let connect_timeout = get_secs("ROTATOR_CONNECT_TIMEOUT", "15")?;
        let read_timeout = get_secs("ROTATOR_READ_TIMEOUT", "30")?;
        if connect_timeout.is_zero() || read_timeout.is_zero() {
            return Err(RotatorError::InvalidConfig(
                "ROTATOR_CONNECT_TIMEOUT and ROTATOR_READ_TIMEOUT must be positive".into(),
            ));
        }

        Ok(EngineConfig {
            proxies: load_proxies()?,
            cooldown: get_secs("ROTATOR_COOLDOWN_SECS", "300")?,
            connect_timeout,
            read_timeout,
            max_retries: get_env_or("ROTATOR_MAX_RETRIES", "3").parse().map_err(|_| {
                RotatorError::InvalidConfig("ROTATOR_MAX_RETRIES must be a valid number".into())
            })?,
            backoff_base: get_secs("ROTATOR_BACKOFF_BASE", "0")?,
            backoff_cap: get_secs("ROTATOR_BACKOFF_CAP", "30")?,
            max_redirects: get_env_or("ROTATOR_MAX_REDIRECTS", "10")
                .parse()
                .map_err(|_| {
                    RotatorError::InvalidConfig(
                        "ROTATOR_MAX_REDIRECTS must be a valid number".into(),
                    )
                })?,
            user_agent: env::var("ROTATOR_USER_AGENT")
                .ok()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty()),
        })
    }

    pub fn settings(&self) -> EngineSettings {
        EngineSettings {
            cooldown: self.cooldown,
            timeouts: Timeouts::new(self.connect_timeout, self.read_timeout),
        }
    }

    pub fn transport(&self) -> TransportConfig {
        TransportConfig {
            max_redirects: self.max_redirects,
            user_agent: self.user_agent.clone(),
        }
    }

    /// Request options used when a caller does not pass its own
    pub fn request_options(&self) -> RequestOptions {
        RequestOptions::new(self.max_retries).with_backoff(self.backoff_base, self.backoff_cap)
    }
}

/// Collect proxies from `ROTATOR_PROXIES` then `ROTATOR_PROXIES_FILE`
fn load_proxies() -> Result<Vec<String>> {
    let mut raw = split_list(&get_env_or("ROTATOR_PROXIES", ""));

    let path = get_env_or("ROTATOR_PROXIES_FILE", "");
    if !path.trim().is_empty() {
        let contents = fs::read_to_string(path.trim()).map_err(|e| {
            RotatorError::InvalidConfig(format!(
                "ROTATOR_PROXIES_FILE '{}' could not be read: {}",
                path.trim(),
                e
            ))
        })?;
        raw.extend(
            contents
                .lines()
                .map(str::trim)
                .filter(|line| !line.is_empty() && !line.starts_with('#'))
                .map(String::from),
        );
    }

    raw.iter()
        .map(|entry| {
            parse_proxy_identifier(entry)
                .map_err(|e| RotatorError::InvalidConfig(format!("invalid proxy in pool: {}", e)))
        })
        .collect()
}

/// Parse a non-negative number of seconds
fn get_secs(key: &str, default: &str) -> Result<Duration> {
    let value = get_env_or(key, default);
    value
        .trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| {
            RotatorError::InvalidConfig(format!(
                "{} must be a non-negative number of seconds",
                key
            ))
        })
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

/// Get environment variable with a default value
fn get_env_or(key: &str, default: &str) -> String {
    env::var(key).unwrap_or_else(|_| default.to_string())
}
