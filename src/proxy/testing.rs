//! Scripted transport for unit tests
//!
//! Behaviour is chosen by a marker inside the proxy identifier, so a test
//! pool like `["http://ok-1", "http://fail-2"]` reads as its own script.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use http::{HeaderMap, StatusCode};
use parking_lot::Mutex;

use super::transport::{HttpTransport, ProxyResponse, TransportError};
use crate::models::Timeouts;

#[derive(Debug, Default)]
pub struct ScriptedTransport {
    calls: Mutex<Vec<String>>,
    delay: Option<Duration>,
}

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Sleep this long before answering every request
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Proxies in the order they were used
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn respond(url: &str, proxy: &str, status: StatusCode, body: &'static str) -> ProxyResponse {
        ProxyResponse {
            status,
            headers: HeaderMap::new(),
            body: Bytes::from_static(body.as_bytes()),
            final_url: url.to_string(),
            proxy: proxy.to_string(),
            elapsed: Duration::from_millis(1),
        }
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn get(
        &self,
        url: &str,
        proxy: &str,
        _timeouts: Timeouts,
    ) -> Result<ProxyResponse, TransportError> {
        self.calls.lock().push(proxy.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let detail = format!("scripted failure via {}", proxy);
        if proxy.contains("panic") {
            panic!("scripted panic");
        } else if proxy.contains("tunnel407") {
            Err(TransportError::ProxyAuthRequired(detail))
        } else if proxy.contains("auth407") {
            Ok(Self::respond(url, proxy, StatusCode::PROXY_AUTHENTICATION_REQUIRED, ""))
        } else if proxy.contains("http500") {
            Ok(Self::respond(url, proxy, StatusCode::INTERNAL_SERVER_ERROR, "boom"))
        } else if proxy.contains("http404") {
            Ok(Self::respond(url, proxy, StatusCode::NOT_FOUND, "missing"))
        } else if proxy.contains("timeout") {
            Err(TransportError::Timeout(detail))
        } else if proxy.contains("proxyerr") {
            Err(TransportError::Proxy(detail))
        } else if proxy.contains("fail") {
            Err(TransportError::Connect(detail))
        } else if proxy.contains("redirect") {
            Err(TransportError::TooManyRedirects(detail))
        } else if proxy.contains("badreq") {
            Err(TransportError::Request(detail))
        } else if proxy.contains("weird") {
            Err(TransportError::Other(detail))
        } else {
            Ok(Self::respond(url, proxy, StatusCode::OK, "ok"))
        }
    }
}
