//! Checklist API endpoints
//!
//! - GET /api/v1/checklist/get - List checklists
//! - GET /api/v1/checklist/get/{id} - Checklist by ID
//! - POST /api/v1/admin/checklist/create - Create (admin)
//! - PUT /api/v1/admin/checklist/update - Update, ID in the body (admin)
//! - DELETE /api/v1/admin/checklist/{id} - Delete (admin)

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::Deserialize;

use crate::api::middleware::{ApiError, ApiJson, ApiPath, AppState};
use crate::models::{Checklist, CreateChecklistInput, UpdateChecklistInput};

/// Request body for updating a checklist
#[derive(Debug, Deserialize)]
pub struct UpdateChecklistRequest {
    pub id: i64,
    #[serde(flatten)]
    pub changes: UpdateChecklistInput,
}

/// Routes under `/checklist`
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/get", get(list_checklists))
        .route("/get/{id}", get(get_checklist))
}

/// Routes under `/admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/checklist/create", post(create_checklist))
        .route("/checklist/update", put(update_checklist))
        .route("/checklist/{id}", delete(delete_checklist))
}

async fn list_checklists(
    State(state): State<AppState>,
) -> Result<Json<Vec<Checklist>>, ApiError> {
    Ok(Json(state.checklist_service.list().await?))
}

async fn get_checklist(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Checklist>, ApiError> {
    Ok(Json(state.checklist_service.get_by_id(id).await?))
}

async fn create_checklist(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<CreateChecklistInput>,
) -> Result<(StatusCode, Json<Checklist>), ApiError> {
    let checklist = state.checklist_service.create(body).await?;
    Ok((StatusCode::CREATED, Json(checklist)))
}

async fn update_checklist(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<UpdateChecklistRequest>,
) -> Result<Json<Checklist>, ApiError> {
    Ok(Json(
        state.checklist_service.update(body.id, body.changes).await?,
    ))
}

async fn delete_checklist(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.checklist_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}
