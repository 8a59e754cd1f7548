use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::HeaderMap;
use axum::Json;
use chrono::Utc;
use serde::Deserialize;

use super::check_auth;
use crate::errors::AppError;
use crate::models::RebookingSuggestion;
use crate::services::rebooking::SuggestionOptions;
use crate::state::AppState;

#[derive(Deserialize)]
pub struct SuggestionsQuery {
    pub days_ahead: Option<i64>,
    pub max_suggestions: Option<usize>,
    #[serde(default)]
    pub prefer_same_provider: bool,
    pub service_id: Option<String>,
}

// GET /api/customers/:id/suggestions
pub async fn get_suggestions(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
    Path(customer_id): Path<String>,
    Query(query): Query<SuggestionsQuery>,
) -> Result<Json<Vec<RebookingSuggestion>>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;

    let days_ahead = query.days_ahead.unwrap_or(state.config.suggestion_days_ahead);
    if days_ahead < 0 {
        return Err(AppError::Validation("days_ahead must not be negative".to_string()));
    }
    let options = SuggestionOptions {
        days_ahead,
        max_suggestions: query.max_suggestions.unwrap_or(state.config.max_suggestions),
        prefer_same_provider: query.prefer_same_provider,
        service_id: query.service_id,
    };

    let suggestions = state
        .rebooking
        .generate_suggestions(&customer_id, &options, Utc::now())
        .await?;
    Ok(Json(suggestions))
}
