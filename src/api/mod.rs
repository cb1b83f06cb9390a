//! API layer - HTTP handlers and routing
//!
//! Routes live under `/api/v1` in three groups:
//! - public: sign up / sign in, articles, checklists, the course catalogue
//! - authenticated (`/auth`): logout, user info, courses with access checks
//! - admin (`/admin`): every mutation plus user management
//!
//! Uploaded files are served from `/uploads`, and `/health` pings the database.

pub mod articles;
pub mod auth;
pub mod checklists;
pub mod courses;
pub mod middleware;
pub mod upload;
pub mod users;

use anyhow::Context;
use axum::{
    extract::{DefaultBodyLimit, State},
    http::{header, HeaderValue, Method, StatusCode},
    middleware as axum_middleware,
    routing::get,
    Json, Router,
};
use serde_json::json;
use tower_http::{cors::CorsLayer, services::ServeDir, trace::TraceLayer};

use crate::config::Config;
use crate::services::upload::UPLOADS_URL_PREFIX;

pub use middleware::{ApiError, AppState, AuthenticatedUser};

/// Number of maximum-size files one admin upload request may carry
const MAX_FILES_PER_REQUEST: u64 = 10;

/// Build the `/api/v1` router
pub fn build_api_router(state: AppState, upload_body_limit: usize) -> Router<AppState> {
    // Admin routes (need admin role)
    let admin_routes = Router::new()
        .merge(articles::admin_router())
        .merge(checklists::admin_router())
        .merge(courses::admin_router())
        .merge(users::admin_router())
        .layer(DefaultBodyLimit::max(upload_body_limit))
        .route_layer(axum_middleware::from_fn(middleware::require_admin))
        .route_layer(axum_middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ));

    // Protected routes (need auth but not admin)
    let protected_routes = auth::protected_router()
        .nest("/course", courses::protected_router())
        .route_layer(axum_middleware::from_fn_with_state(
            state,
            middleware::require_auth,
        ));

    // Public routes
    Router::new()
        .nest("/user", auth::public_router())
        .nest("/article", articles::public_router())
        .nest("/checklist", checklists::public_router())
        .merge(courses::public_router())
        .nest("/auth", protected_routes)
        .nest("/admin", admin_routes)
}

/// Build the complete router with middleware
pub fn build_router(state: AppState, config: &Config) -> anyhow::Result<Router> {
    let origin = HeaderValue::from_str(&config.server.cors_origin)
        .with_context(|| format!("Invalid CORS origin '{}'", config.server.cors_origin))?;

    // Cookie authentication needs credentials and an explicit origin
    let cors = CorsLayer::new()
        .allow_origin(origin)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::COOKIE])
        .allow_credentials(true);

    let upload_body_limit =
        usize::try_from(config.upload.max_file_size.saturating_mul(MAX_FILES_PER_REQUEST))
            .unwrap_or(usize::MAX);

    Ok(Router::new()
        .nest("/api/v1", build_api_router(state.clone(), upload_body_limit))
        .route("/health", get(health))
        .nest_service(UPLOADS_URL_PREFIX, ServeDir::new(&config.upload.path))
        .layer(cors)
        .layer(TraceLayer::new_for_http())
        .with_state(state))
}

/// GET /health
async fn health(State(state): State<AppState>) -> (StatusCode, Json<serde_json::Value>) {
    match state.pool.ping().await {
        Ok(()) => (StatusCode::OK, Json(json!({ "status": "ok" }))),
        Err(e) => {
            tracing::error!(error = %e, "health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({ "status": "unavailable" })),
            )
        }
    }
}
