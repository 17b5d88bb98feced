use axum::{
    extract::{rejection::QueryRejection, Query, State},
    Json,
};

use crate::error::{ApiError, ApiJson, Result};
use crate::interaction_log::{InteractionLogEntry, LogPage, LogQuery, NewLogEntry};
use crate::v1::registry::SuccessResponse;
use crate::AppState;

pub async fn list_logs(
    State(state): State<AppState>,
    query: std::result::Result<Query<LogQuery>, QueryRejection>,
) -> Result<Json<LogPage>> {
    let Query(query) = query.map_err(|e| ApiError::Validation(e.body_text()))?;
    Ok(Json(state.logs.query(&query).await))
}

pub async fn append_log(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NewLogEntry>,
) -> Json<InteractionLogEntry> {
    Json(state.logs.record(req).await)
}

pub async fn clear_logs(State(state): State<AppState>) -> Json<SuccessResponse> {
    state.logs.clear().await;
    tracing::info!("interaction log cleared");
    Json(SuccessResponse { success: true })
}
