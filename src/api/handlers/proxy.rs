//! Proxy pool handlers

use axum::extract::{Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::api::server::AppState;
use crate::error::{Result, RotatorError};
use crate::models::{parse_proxy_identifier, redact};

#[derive(Debug, Deserialize)]
pub struct AddProxiesRequest {
    pub proxies: Vec<String>,
}

#[derive(Debug, Deserialize)]
pub struct ProxyQuery {
    pub proxy: String,
}

#[derive(Debug, Deserialize)]
pub struct BlacklistRequest {
    pub proxy: String,
    #[serde(default)]
    pub reason: Option<String>,
}

/// List the pool in rotation order
pub async fn list_proxies(State(state): State<AppState>) -> impl IntoResponse {
    let proxies = state.engine.get_status().configured_proxies;
    Json(json!({
        "total": proxies.len(),
        "proxies": proxies,
    }))
}

/// Add proxies; every entry is validated before any is added
pub async fn add_proxies(
    State(state): State<AppState>,
    Json(req): Json<AddProxiesRequest>,
) -> Result<impl IntoResponse> {
    if req.proxies.is_empty() {
        return Err(RotatorError::InvalidRequest("proxies must not be empty".into()));
    }

    let normalized = req
        .proxies
        .iter()
        .map(|raw| parse_proxy_identifier(raw))
        .collect::<Result<Vec<_>>>()?;

    let added = state.engine.add_proxies(normalized);
    let total = state.engine.get_status().configured_proxies.len();

    info!(added, total, "Proxies added via API");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "added": added,
            "total": total,
        })),
    ))
}

/// Remove a proxy from the pool
pub async fn remove_proxy(
    State(state): State<AppState>,
    Query(query): Query<ProxyQuery>,
) -> Result<impl IntoResponse> {
    let proxy = pool_identifier(&query.proxy);
    if !state.engine.remove_proxy(&proxy) {
        return Err(RotatorError::NotFound(format!(
            "Proxy {} not found",
            redact(&proxy)
        )));
    }

    Ok(StatusCode::NO_CONTENT)
}

/// Put a proxy on cooldown by hand
pub async fn blacklist_proxy(
    State(state): State<AppState>,
    Json(req): Json<BlacklistRequest>,
) -> Result<impl IntoResponse> {
    if req.proxy.trim().is_empty() {
        return Err(RotatorError::InvalidRequest("proxy must not be empty".into()));
    }

    let proxy = pool_identifier(&req.proxy);
    let reason = req.reason.as_deref().unwrap_or("manual");
    state.engine.blacklist(&proxy, reason);

    let remaining = state
        .engine
        .get_status()
        .blacklist_seconds_remaining
        .get(&proxy)
        .copied()
        .unwrap_or(0.0);

    Ok(Json(json!({
        "proxy": redact(&proxy),
        "reason": reason,
        "seconds_remaining": remaining,
    })))
}

/// Normalize the way `add_proxies` does; unparseable input stays as typed
fn pool_identifier(raw: &str) -> String {
    parse_proxy_identifier(raw).unwrap_or_else(|_| raw.trim().to_string())
}
