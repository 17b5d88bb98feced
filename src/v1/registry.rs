use axum::{extract::State, Json};
use serde::{Deserialize, Serialize};

use crate::error::{ApiJson, Result};
use crate::registry::{EntryUpdate, NewEntry, RegistryEntry};
use crate::AppState;

#[derive(Debug, Deserialize)]
pub struct DeleteEntryRequest {
    #[serde(default)]
    pub id: String,
}

#[derive(Serialize)]
pub struct SuccessResponse {
    pub success: bool,
}

/// Every entry is re-probed before the list is returned.
pub async fn list_entries(State(state): State<AppState>) -> Json<Vec<RegistryEntry>> {
    Json(state.registry.refresh_all().await)
}

pub async fn create_entry(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<NewEntry>,
) -> Result<Json<RegistryEntry>> {
    let entry = state.registry.create(req).await?;
    Ok(Json(entry))
}

pub async fn update_entry(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<EntryUpdate>,
) -> Result<Json<RegistryEntry>> {
    let entry = state.registry.update(req).await?;
    Ok(Json(entry))
}

pub async fn delete_entry(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<DeleteEntryRequest>,
) -> Json<SuccessResponse> {
    state.registry.delete(&req.id).await;
    Json(SuccessResponse { success: true })
}
