use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Unified error type for the proxy rotator
///
/// Ordinary network failures through a proxy never become a `RotatorError`;
/// they are recorded against the proxy and the proxy is put on cooldown.
#[derive(Error, Debug)]
pub enum RotatorError {
    // Proxy errors
    #[error("Invalid proxy address: {0}")]
    InvalidProxyAddress(String),

    #[error("Unsupported proxy protocol: {0}")]
    UnsupportedProtocol(String),

    #[error("Request exhausted all available proxies")]
    RequestExhausted,

    // Request errors
    #[error("Invalid target URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Not found: {0}")]
    NotFound(String),

    // Configuration errors
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("HTTP client unavailable: {0}")]
    HttpClientUnavailable(String),

    // I/O errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Internal errors
    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias for proxy rotator operations
pub type Result<T> = std::result::Result<T, RotatorError>;

impl RotatorError {
    /// Get the HTTP status code for this error
    pub fn status_code(&self) -> StatusCode {
        match self {
            // 400 Bad Request
            RotatorError::InvalidRequest(_)
            | RotatorError::InvalidUrl(_)
            | RotatorError::InvalidProxyAddress(_)
            | RotatorError::UnsupportedProtocol(_)
            | RotatorError::InvalidConfig(_) => StatusCode::BAD_REQUEST,

            // 404 Not Found
            RotatorError::NotFound(_) => StatusCode::NOT_FOUND,

            // 502 Bad Gateway
            RotatorError::RequestExhausted => StatusCode::BAD_GATEWAY,

            // 500 Internal Server Error
            RotatorError::Io(_)
            | RotatorError::HttpClientUnavailable(_)
            | RotatorError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Check if this is a client error (4xx)
    pub fn is_client_error(&self) -> bool {
        self.status_code().is_client_error()
    }

    /// Check if this is a server error (5xx)
    pub fn is_server_error(&self) -> bool {
        self.status_code().is_server_error()
    }
}

// Implement IntoResponse for API error responses
impl IntoResponse for RotatorError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let body = json!({
            "error": self.to_string(),
        });

        (status, Json(body)).into_response()
    }
}

// Convert from URL parse errors
impl From<url::ParseError> for RotatorError {
    fn from(err: url::ParseError) -> Self {
        RotatorError::InvalidUrl(err.to_string())
    }
}
