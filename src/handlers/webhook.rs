use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use super::check_auth;
use crate::errors::AppError;
use crate::models::Platform;
use crate::services::events::DispatchResult;
use crate::services::webhooks::{self, RegistrationRequest, WebhookRegistration};
use crate::state::AppState;

/// Parses `raw` and rejects platforms other than the configured one.
fn active_platform(state: &AppState, raw: &str) -> Result<Platform, AppError> {
    let platform: Platform = raw.parse()?;
    if platform != state.platform.platform() {
        tracing::warn!(platform = %platform, configured = %state.platform.platform(), "request for inactive platform");
        return Err(AppError::UnsupportedPlatform(platform.to_string()));
    }
    Ok(platform)
}

// POST /webhooks/:platform
pub async fn receive(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<DispatchResult>, AppError> {
    let platform = active_platform(&state, &platform)?;

    let signature = headers
        .get(webhooks::signature_header(platform))
        .and_then(|v| v.to_str().ok());
    webhooks::verify_signature(platform, signature, &body, state.config.webhook_secret.as_deref())?;

    let event = match serde_json::from_slice::<Value>(&body)
        .map_err(|e| AppError::Validation(format!("invalid JSON body: {e}")))
        .and_then(|payload| webhooks::parse_webhook(platform, &payload))
    {
        Ok(event) => event,
        Err(e) => {
            state.monitor.record_webhook(platform, "unknown", false, Utc::now());
            return Err(e);
        }
    };

    let now = Utc::now();
    let result = state.dispatcher.dispatch(&event, now).await;
    state
        .monitor
        .record_webhook(platform, &event.event_type, result.error.is_none(), now);
    Ok(Json(result))
}

// POST /api/webhooks/:platform/registration
pub async fn register(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
    body: Option<Json<RegistrationRequest>>,
) -> Result<Json<WebhookRegistration>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let platform = active_platform(&state, &platform)?;

    let mut request = body.map(|Json(r)| r).unwrap_or_default();
    match platform {
        Platform::Mindbody if request.site_id.is_none() => {
            request.site_id = Some(state.config.mindbody_site_id.clone());
        }
        Platform::Phorest if request.branch_id.is_none() => {
            request.branch_id = state.config.phorest_branch_id.clone();
        }
        _ => {}
    }

    let registration = state
        .webhooks
        .register(platform, request, &state.public_base_url(), Utc::now())?;
    Ok(Json(registration))
}

// DELETE /api/webhooks/:platform/registration
pub async fn unregister(
    State(state): State<Arc<AppState>>,
    Path(platform): Path<String>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    let platform = active_platform(&state, &platform)?;

    state.webhooks.unregister(platform);
    Ok(Json(json!({
        "success": true,
        "message": format!("Successfully unregistered {} webhooks", platform.display_name()),
    })))
}
