//! Admin user endpoints
//!
//! - GET /api/v1/admin/users - List users
//! - DELETE /api/v1/admin/users/{id} - Delete a user
//! - GET /api/v1/admin/users/{id}/courses - Courses granted to a user

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get},
    Json, Router,
};

use crate::api::middleware::{ApiError, ApiPath, AppState, AuthenticatedUser};
use crate::models::{Course, User};

/// Routes under `/admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/users", get(list_users))
        .route("/users/{id}", delete(delete_user))
        .route("/users/{id}/courses", get(user_courses))
}

async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>, ApiError> {
    Ok(Json(state.user_service.list().await?))
}

async fn delete_user(
    State(state): State<AppState>,
    admin: AuthenticatedUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    if admin.0.id == id {
        return Err(ApiError::validation_error("Admins cannot delete themselves"));
    }
    state.user_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn user_courses(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Vec<Course>>, ApiError> {
    Ok(Json(state.course_service.user_courses(id).await?))
}
