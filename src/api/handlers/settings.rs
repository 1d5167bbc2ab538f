//! Settings handlers

use std::time::Duration;

use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use serde::Deserialize;

use crate::api::server::AppState;
use crate::error::{Result, RotatorError};
use crate::models::{SettingsUpdate, SettingsView};

/// Partial settings update; omitted fields keep their value
#[derive(Debug, Deserialize)]
pub struct UpdateSettingsRequest {
    pub cooldown_seconds: Option<f64>,
    pub connect_timeout_seconds: Option<f64>,
    pub read_timeout_seconds: Option<f64>,
}

/// Get current engine settings
pub async fn get_settings(State(state): State<AppState>) -> impl IntoResponse {
    Json(SettingsView::from(state.engine.settings()))
}

/// Update cooldown and default timeouts
pub async fn update_settings(
    State(state): State<AppState>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<impl IntoResponse> {
    // Validate everything before applying anything
    let update = SettingsUpdate {
        cooldown: req
            .cooldown_seconds
            .map(|secs| positive_secs("cooldown_seconds", secs))
            .transpose()?,
        connect_timeout: req
            .connect_timeout_seconds
            .map(|secs| positive_secs("connect_timeout_seconds", secs))
            .transpose()?,
        read_timeout: req
            .read_timeout_seconds
            .map(|secs| positive_secs("read_timeout_seconds", secs))
            .transpose()?,
    };

    let settings = state.engine.update_settings(update);
    Ok(Json(SettingsView::from(settings)))
}

fn positive_secs(field: &str, secs: f64) -> Result<Duration> {
    match Duration::try_from_secs_f64(secs) {
        Ok(duration) if !duration.is_zero() => Ok(duration),
        _ => Err(RotatorError::InvalidRequest(format!(
            "{} must be a positive number of seconds",
            field
        ))),
    }
}
