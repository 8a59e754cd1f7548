use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;

use super::check_auth;
use crate::errors::AppError;
use crate::services::messaging::templates::TemplateCatalog;
use crate::state::AppState;

// GET /api/templates
pub async fn get_templates(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Json<TemplateCatalog>, AppError> {
    check_auth(&headers, &state.config.admin_token)?;
    Ok(Json(state.catalog.as_ref().clone()))
}
