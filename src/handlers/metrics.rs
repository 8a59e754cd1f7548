use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use super::check_auth;
use crate::errors::AppError;
use crate::services::monitoring::MetricsSnapshot;
use crate::state::AppState;

// GET /api/metrics
pub async fn get_metrics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<MetricsSnapshot>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    Ok(Json(state.monitor.snapshot(Utc::now())))
}

// POST /api/metrics/reset
pub async fn reset_metrics(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<Value>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    state.monitor.reset(Utc::now());
    tracing::info!("integration metrics reset");
    Ok(Json(json!({ "success": true })))
}
