//! HTTP transport used to send a single GET through a proxy
//!
//! The engine never speaks HTTP itself. It drives an [`HttpTransport`], by
//! default [`ReqwestTransport`], and classifies what comes back.

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use dashmap::DashMap;
use http::{HeaderMap, StatusCode};
use reqwest::{redirect, Client};
use serde::de::DeserializeOwned;
use thiserror::Error;
use tracing::{debug, info};

use crate::error::{Result, RotatorError};
use crate::models::{redact, Timeouts};

/// Default redirect limit for [`ReqwestTransport`]
pub const DEFAULT_MAX_REDIRECTS: usize = 10;

/// A fully read response received through a proxy
#[derive(Debug, Clone)]
pub struct ProxyResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
    /// URL after following redirects
    pub final_url: String,
    /// Proxy the response came through
    pub proxy: String,
    pub elapsed: Duration,
}

impl ProxyResponse {
    /// Body decoded as UTF-8, replacing invalid sequences
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}

/// Transport-level failure, before any HTTP status is known
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("proxy authentication required: {0}")]
    ProxyAuthRequired(String),

    #[error("timed out: {0}")]
    Timeout(String),

    #[error("proxy error: {0}")]
    Proxy(String),

    #[error("connection error: {0}")]
    Connect(String),

    #[error("too many redirects: {0}")]
    TooManyRedirects(String),

    #[error("request failed: {0}")]
    Request(String),

    #[error("unexpected error: {0}")]
    Other(String),
}

/// Sends one GET request through one proxy
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn get(
        &self,
        url: &str,
        proxy: &str,
        timeouts: Timeouts,
    ) -> std::result::Result<ProxyResponse, TransportError>;
}

/// Options for [`ReqwestTransport`]
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub max_redirects: usize,
    pub user_agent: Option<String>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            max_redirects: DEFAULT_MAX_REDIRECTS,
            user_agent: None,
        }
    }
}

/// reqwest-backed transport with one cached client per proxy
///
/// reqwest fixes the connect timeout when a client is built, so a cached
/// client is rebuilt when the requested connect timeout changes.
pub struct ReqwestTransport {
    config: TransportConfig,
    clients: DashMap<String, (Duration, Client)>,
}

impl ReqwestTransport {
    /// Create the transport, failing eagerly if no HTTP client can be built
    pub fn new(config: TransportConfig) -> Result<Self> {
        Client::builder()
            .build()
            .map_err(|e| RotatorError::HttpClientUnavailable(e.to_string()))?;

        Ok(Self {
            config,
            clients: DashMap::new(),
        })
    }

    /// Drop cached clients for proxies that left the pool
    pub fn evict(&self, proxy: &str) {
        self.clients.remove(proxy);
    }

    /// Number of cached clients
    pub fn cached_clients(&self) -> usize {
        self.clients.len()
    }

    fn client_for(
        &self,
        proxy: &str,
        connect_timeout: Duration,
    ) -> std::result::Result<Client, TransportError> {
        if let Some(entry) = self.clients.get(proxy) {
            let (cached_timeout, client) = entry.value();
            if *cached_timeout == connect_timeout {
                return Ok(client.clone());
            }
        }

        let upstream = reqwest::Proxy::all(proxy).map_err(|e| {
            TransportError::Proxy(format!("invalid proxy '{}': {}", redact(proxy), e))
        })?;

        let mut builder = Client::builder()
            .proxy(upstream)
            .connect_timeout(connect_timeout)
            .redirect(redirect::Policy::limited(self.config.max_redirects))
            .pool_idle_timeout(Duration::from_secs(90));
        if let Some(user_agent) = &self.config.user_agent {
            builder = builder.user_agent(user_agent.as_str());
        }
        let client = builder
            .build()
            .map_err(|e| TransportError::Other(format!("failed to build client: {}", e)))?;

        info!(
            proxy = %redact(proxy),
            connect_timeout_secs = connect_timeout.as_secs_f64(),
            "Created proxy client"
        );
        self.clients
            .insert(proxy.to_string(), (connect_timeout, client.clone()));
        Ok(client)
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn get(
        &self,
        url: &str,
        proxy: &str,
        timeouts: Timeouts,
    ) -> std::result::Result<ProxyResponse, TransportError> {
        let start = Instant::now();
        let client = self.client_for(proxy, timeouts.connect)?;

        let response = client
            .get(url)
            .timeout(timeouts.total())
            .send()
            .await
            .map_err(classify_reqwest_error)?;

        let status = response.status();
        let headers = response.headers().clone();
        let final_url = response.url().to_string();
        let body = response.bytes().await.map_err(classify_reqwest_error)?;

        debug!(
            proxy = %redact(proxy),
            status = status.as_u16(),
            bytes = body.len(),
            "Response received"
        );

        Ok(ProxyResponse {
            status,
            headers,
            body,
            final_url,
            proxy: proxy.to_string(),
            elapsed: start.elapsed(),
        })
    }
}

/// Map a reqwest error onto the transport error kinds
pub fn classify_reqwest_error(err: reqwest::Error) -> TransportError {
    let detail = error_chain(&err);

    if err.is_timeout() {
        TransportError::Timeout(detail)
    } else if err.is_redirect() {
        TransportError::TooManyRedirects(detail)
    } else if err.is_connect() {
        classify_connect_failure(detail)
    } else if err.is_builder() {
        TransportError::Other(detail)
    } else {
        TransportError::Request(detail)
    }
}

/// Tell proxy-level connect failures apart from plain connection errors
///
/// A 407 answer to CONNECT surfaces as "tunnel error: proxy authorization
/// required" without the status code.
fn classify_connect_failure(detail: String) -> TransportError {
    let lower = detail.to_lowercase();
    if lower.contains("407")
        || lower.contains("proxy authorization required")
        || lower.contains("proxy authentication required")
    {
        TransportError::ProxyAuthRequired(detail)
    } else if lower.contains("proxy") || lower.contains("tunnel") || lower.contains("socks") {
        TransportError::Proxy(detail)
    } else {
        TransportError::Connect(detail)
    }
}

/// Render an error and all of its sources on one line
fn error_chain(err: &dyn std::error::Error) -> String {
    let mut message = err.to_string();
    let mut source = err.source();
    while let Some(cause) = source {
        let text = cause.to_string();
        if !message.contains(&text) {
            message.push_str(": ");
            message.push_str(&text);
        }
        source = cause.source();
    }
    message
}

#[cfg(test)]
mod tests {
    use super::*;

    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};

    fn short_timeouts() -> Timeouts {
        Timeouts::new(Duration::from_secs(1), Duration::from_millis(300))
    }

    async fn read_request(stream: &mut TcpStream) -> String {
        let mut buf = Vec::new();
        let mut chunk = [0u8; 1024];
        loop {
            let n = stream.read(&mut chunk).await.unwrap();
            if n == 0 {
                break;
            }
            buf.extend_from_slice(&chunk[..n]);
            if buf.windows(4).any(|w| w == b"\r\n\r\n") {
                break;
            }
        }
        String::from_utf8_lossy(&buf).into_owned()
    }

    /// Minimal forward proxy answering every request with a canned response
    async fn spawn_fake_proxy(response: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut client, _)) = listener.accept().await {
                let request = read_request(&mut client).await;
                assert!(request.starts_with("GET "));
                assert!(request.contains("/ping"));
                client.write_all(response.as_bytes()).await.unwrap();
                let _ = client.shutdown().await;
            }
        });
        format!("http://{}", addr)
    }

    #[test]
    fn test_connect_failure_classification() {
        assert!(matches!(
            classify_connect_failure("unsuccessful tunnel: 407 Proxy Authentication Required".into()),
            TransportError::ProxyAuthRequired(_)
        ));
        assert!(matches!(
            classify_connect_failure(
                "client error (Connect): tunnel error: proxy authorization required".into()
            ),
            TransportError::ProxyAuthRequired(_)
        ));
        assert!(matches!(
            classify_connect_failure("error trying to connect: unsuccessful tunnel".into()),
            TransportError::Proxy(_)
        ));
        assert!(matches!(
            classify_connect_failure("tcp connect error: Connection refused".into()),
            TransportError::Connect(_)
        ));
    }

    #[test]
    fn test_response_helpers() {
        let response = ProxyResponse {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            body: Bytes::from_static(br#"{"ok":true}"#),
            final_url: "http://example.test/".to_string(),
            proxy: "http://p1".to_string(),
            elapsed: Duration::ZERO,
        };
        assert_eq!(response.text(), r#"{"ok":true}"#);
        let value: serde_json::Value = response.json().unwrap();
        assert_eq!(value["ok"], true);
    }

    #[tokio::test]
    async fn test_get_through_fake_proxy() {
        let proxy = spawn_fake_proxy(
            "HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\npong",
        )
        .await;
        let transport = ReqwestTransport::new(TransportConfig::default()).unwrap();

        let response = transport
            .get("http://example.test/ping", &proxy, short_timeouts())
            .await
            .unwrap();

        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.text(), "pong");
        assert_eq!(response.proxy, proxy);
        assert_eq!(transport.cached_clients(), 1);

        transport.evict(&proxy);
        assert_eq!(transport.cached_clients(), 0);
    }

    #[tokio::test]
    async fn test_proxy_status_is_returned_not_raised() {
        let proxy = spawn_fake_proxy(
            "HTTP/1.1 407 Proxy Authentication Required\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        )
        .await;
        let transport = ReqwestTransport::new(TransportConfig::default()).unwrap();

        let response = transport
            .get("http://example.test/ping", &proxy, short_timeouts())
            .await
            .unwrap();
        assert_eq!(response.status, StatusCode::PROXY_AUTHENTICATION_REQUIRED);
    }

    #[tokio::test]
    async fn test_tunnel_auth_rejection_is_proxy_auth_required() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            while let Ok((mut client, _)) = listener.accept().await {
                let request = read_request(&mut client).await;
                assert!(request.starts_with("CONNECT example.test:443"));
                client
                    .write_all(
                        b"HTTP/1.1 407 Proxy Authentication Required\r\nProxy-Authenticate: Basic realm=\"test\"\r\nContent-Length: 0\r\n\r\n",
                    )
                    .await
                    .unwrap();
                let _ = client.shutdown().await;
            }
        });

        let transport = ReqwestTransport::new(TransportConfig::default()).unwrap();
        let err = transport
            .get("https://example.test/ping", &format!("http://{}", addr), short_timeouts())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::ProxyAuthRequired(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_one_client_per_proxy_across_timeouts() {
        let proxy = spawn_fake_proxy(
            "HTTP/1.1 200 OK\r\nContent-Length: 4\r\nConnection: close\r\n\r\npong",
        )
        .await;
        let transport = ReqwestTransport::new(TransportConfig::default()).unwrap();

        for millis in 0..5 {
            let timeouts = Timeouts::new(
                Duration::from_millis(1000 + millis),
                Duration::from_millis(300),
            );
            transport
                .get("http://example.test/ping", &proxy, timeouts)
                .await
                .unwrap();
            assert_eq!(transport.cached_clients(), 1);
        }

        // Switching back and forth never adds a second client
        transport
            .get("http://example.test/ping", &proxy, short_timeouts())
            .await
            .unwrap();
        assert_eq!(transport.cached_clients(), 1);
    }

    #[tokio::test]
    async fn test_silent_proxy_times_out() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (stream, _) = listener.accept().await.unwrap();
            tokio::time::sleep(Duration::from_secs(5)).await;
            drop(stream);
        });

        let transport = ReqwestTransport::new(TransportConfig::default()).unwrap();
        let err = transport
            .get("http://example.test/ping", &format!("http://{}", addr), short_timeouts())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Timeout(_)), "got {:?}", err);
    }

    #[tokio::test]
    async fn test_refused_proxy_is_a_connect_failure() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let transport = ReqwestTransport::new(TransportConfig::default()).unwrap();
        let err = transport
            .get("http://example.test/ping", &format!("http://{}", addr), short_timeouts())
            .await
            .unwrap_err();
        assert!(
            matches!(err, TransportError::Connect(_) | TransportError::Proxy(_)),
            "got {:?}",
            err
        );
    }

    #[tokio::test]
    async fn test_invalid_proxy_identifier() {
        let transport = ReqwestTransport::new(TransportConfig::default()).unwrap();
        let err = transport
            .get("http://example.test/ping", "not a proxy", short_timeouts())
            .await
            .unwrap_err();
        assert!(matches!(err, TransportError::Proxy(_)), "got {:?}", err);
    }
}
