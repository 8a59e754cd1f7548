use std::sync::{Arc, PoisonError};

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use serde::Deserialize;

use super::check_auth;
use crate::db::queries;
use crate::errors::AppError;
use crate::models::{MessageEdit, ScheduledMessage};
use crate::state::AppState;

#[derive(Deserialize)]
pub struct MessagesQuery {
    pub client_id: Option<String>,
}

// GET /api/messages?client_id=
pub async fn list_messages(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Query(query): Query<MessagesQuery>,
) -> Result<Json<Vec<ScheduledMessage>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let client_id = query
        .client_id
        .filter(|c| !c.is_empty())
        .ok_or_else(|| AppError::Validation("client_id is required".to_string()))?;

    let db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
    Ok(Json(queries::list_for_client(&db, &client_id)?))
}

// POST /api/messages/:id/cancel
pub async fn cancel_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ScheduledMessage>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let cancelled = {
        let db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
        queries::cancel_scheduled_message(&db, &id)?
    };
    tracing::info!(message_id = %id, "scheduled message cancelled");
    Ok(Json(cancelled))
}

// PUT /api/messages/:id
pub async fn edit_message(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(edit): Json<MessageEdit>,
) -> Result<Json<ScheduledMessage>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    if edit == MessageEdit::default() {
        return Err(AppError::Validation("no fields to update".to_string()));
    }

    let edited = {
        let db = state.db.lock().unwrap_or_else(PoisonError::into_inner);
        queries::edit_scheduled_message(&db, &id, &edit)?
    };
    tracing::info!(message_id = %id, "scheduled message edited");
    Ok(Json(edited))
}
