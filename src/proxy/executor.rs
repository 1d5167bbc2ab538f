//! One attempt through one proxy
//!
//! The executor sends the request, classifies the outcome, and records it
//! against the proxy. Every failure puts the proxy on cooldown straight
//! away; nothing is propagated to the caller.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::FutureExt;
use http::StatusCode;
use serde::Serialize;

use super::state::SharedState;
use super::transport::{HttpTransport, ProxyResponse, TransportError};
use crate::models::Timeouts;

/// Why an attempt failed, in the order the executor distinguishes them
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum FailureCategory {
    /// Upstream answered 407
    ProxyAuthRequired,
    /// Any other 4xx/5xx status
    HttpError,
    /// Connect/read timeout or a proxy-level refusal
    TimeoutOrProxyError,
    /// Lower-level transport failure
    ConnectionError,
    TooManyRedirects,
    GenericRequestFailure,
    /// Anything outside the transport's expected error surface
    UnexpectedError,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::ProxyAuthRequired => "proxy-auth-required",
            FailureCategory::HttpError => "http-error",
            FailureCategory::TimeoutOrProxyError => "timeout-or-proxy-error",
            FailureCategory::ConnectionError => "connection-error",
            FailureCategory::TooManyRedirects => "too-many-redirects",
            FailureCategory::GenericRequestFailure => "generic-request-failure",
            FailureCategory::UnexpectedError => "unexpected-error",
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl From<&TransportError> for FailureCategory {
    fn from(err: &TransportError) -> Self {
        match err {
            TransportError::ProxyAuthRequired(_) => FailureCategory::ProxyAuthRequired,
            TransportError::Timeout(_) | TransportError::Proxy(_) => {
                FailureCategory::TimeoutOrProxyError
            }
            TransportError::Connect(_) => FailureCategory::ConnectionError,
            TransportError::TooManyRedirects(_) => FailureCategory::TooManyRedirects,
            TransportError::Request(_) => FailureCategory::GenericRequestFailure,
            TransportError::Other(_) => FailureCategory::UnexpectedError,
        }
    }
}

/// A classified failed attempt
#[derive(Debug, Clone, PartialEq)]
pub struct AttemptFailure {
    pub category: FailureCategory,
    /// Present for `ProxyAuthRequired` and `HttpError`
    pub status: Option<StatusCode>,
    pub elapsed: Duration,
    pub error: String,
}

impl AttemptFailure {
    /// Blacklist reason, e.g. `http-error (503)`
    pub fn reason(&self) -> String {
        match self.status {
            Some(status) => format!("{} ({})", self.category, status.as_u16()),
            None => self.category.to_string(),
        }
    }
}

/// Result of a single attempt
#[derive(Debug)]
pub enum Outcome {
    Success {
        response: ProxyResponse,
        elapsed: Duration,
    },
    Failure(AttemptFailure),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success { .. })
    }
}

/// Performs attempts and keeps the shared health/cooldown state current
#[derive(Clone)]
pub struct RequestExecutor {
    transport: Arc<dyn HttpTransport>,
    state: SharedState,
}

impl RequestExecutor {
    pub fn new(transport: Arc<dyn HttpTransport>, state: SharedState) -> Self {
        Self { transport, state }
    }

    /// Send `url` through `proxy`, classify the outcome and record it
    pub async fn attempt(&self, url: &str, proxy: &str, timeouts: Timeouts) -> Outcome {
        let start = Instant::now();
        let result = AssertUnwindSafe(self.transport.get(url, proxy, timeouts))
            .catch_unwind()
            .await;
        let outcome = classify(result, start.elapsed());

        let mut state = self.state.lock();
        match &outcome {
            Outcome::Success { elapsed, .. } => state.record_success(proxy, *elapsed),
            Outcome::Failure(failure) => state.record_failure(proxy, failure),
        }

        outcome
    }
}

type TransportResult = std::result::Result<ProxyResponse, TransportError>;

fn classify(result: std::thread::Result<TransportResult>, elapsed: Duration) -> Outcome {
    match result {
        Ok(Ok(response)) => {
            let status = response.status;
            if status == StatusCode::PROXY_AUTHENTICATION_REQUIRED {
                Outcome::Failure(AttemptFailure {
                    category: FailureCategory::ProxyAuthRequired,
                    status: Some(status),
                    elapsed,
                    error: "proxy authentication required (407)".to_string(),
                })
            } else if status.is_client_error() || status.is_server_error() {
                Outcome::Failure(AttemptFailure {
                    category: FailureCategory::HttpError,
                    status: Some(status),
                    elapsed,
                    error: format!("HTTP {}", status),
                })
            } else {
                Outcome::Success { response, elapsed }
            }
        }
        Ok(Err(err)) => {
            let category = FailureCategory::from(&err);
            let status = (category == FailureCategory::ProxyAuthRequired)
                .then_some(StatusCode::PROXY_AUTHENTICATION_REQUIRED);
            Outcome::Failure(AttemptFailure {
                category,
                status,
                elapsed,
                error: err.to_string(),
            })
        }
        Err(panic) => Outcome::Failure(AttemptFailure {
            category: FailureCategory::UnexpectedError,
            status: None,
            elapsed,
            error: format!("transport panicked: {}", panic_message(&*panic)),
        }),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic".to_string()
    }
}
