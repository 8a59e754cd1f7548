use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<Arc<AppState>>) -> Json<Value> {
    let platform = state.platform.platform();
    Json(json!({
        "status": "ok",
        "platform": platform,
        "connected": state.platform.is_connected(),
        "integrations": state.monitor.health_report(&[platform], Utc::now()),
    }))
}
