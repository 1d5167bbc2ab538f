//! Fetch a URL through the rotating pool

use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::{Deserialize, Serialize};

use crate::api::server::AppState;
use crate::error::{Result, RotatorError};
use crate::models::redact;

#[derive(Debug, Deserialize)]
pub struct FetchRequest {
    pub url: String,
    pub max_retries: Option<u32>,
    pub backoff_base_seconds: Option<f64>,
    pub backoff_cap_seconds: Option<f64>,
}

#[derive(Debug, Serialize)]
pub struct FetchResponse {
    /// Proxy that served the response, credentials masked
    pub proxy: String,
    pub status: u16,
    pub final_url: String,
    pub elapsed_ms: u64,
    pub body: String,
}

/// Run one engine request; 502 when every attempt failed
pub async fn fetch(
    State(state): State<AppState>,
    Json(req): Json<FetchRequest>,
) -> Result<impl IntoResponse> {
    let mut options = state.config.engine.request_options();
    if let Some(max_retries) = req.max_retries {
        options.max_retries = max_retries;
    }
    if let Some(secs) = req.backoff_base_seconds {
        options.backoff_base = secs_field("backoff_base_seconds", secs)?;
    }
    if let Some(secs) = req.backoff_cap_seconds {
        options.backoff_cap = secs_field("backoff_cap_seconds", secs)?;
    }

    let response = state
        .engine
        .request(&req.url, &options)
        .await?
        .ok_or(RotatorError::RequestExhausted)?;

    Ok(Json(FetchResponse {
        proxy: redact(&response.proxy),
        status: response.status.as_u16(),
        final_url: response.final_url.clone(),
        elapsed_ms: response.elapsed.as_millis() as u64,
        body: response.text(),
    }))
}

fn secs_field(field: &str, secs: f64) -> Result<Duration> {
    Duration::try_from_secs_f64(secs).map_err(|_| {
        RotatorError::InvalidRequest(format!("{} must be a non-negative number", field))
    })
}
