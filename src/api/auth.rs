//! Authentication API endpoints
//!
//! - POST /api/v1/user/sign-up - Register and sign in
//! - POST /api/v1/user/sign-in - Sign in
//! - POST /api/v1/auth/logout - Clear the access token cookie
//! - GET /api/v1/auth/user-info - Current user

use axum::{
    extract::State,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{
    access_token_cookie, clear_access_token_cookie, ApiError, ApiJson, AppState,
    AuthenticatedUser,
};
use crate::models::User;
use crate::services::{AuthSession, Credentials};

/// Response for successful sign up or sign in
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub token: String,
}

/// Public routes under `/user`
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/sign-up", post(sign_up))
        .route("/sign-in", post(sign_in))
}

/// Authenticated routes under `/auth`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/logout", post(logout))
        .route("/user-info", get(user_info))
}

/// POST /api/v1/user/sign-up
async fn sign_up(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Credentials>,
) -> Result<Response, ApiError> {
    let session = state.user_service.sign_up(body).await?;
    session_response(&state, session)
}

/// POST /api/v1/user/sign-in
async fn sign_in(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<Credentials>,
) -> Result<Response, ApiError> {
    let session = state.user_service.sign_in(body).await?;
    session_response(&state, session)
}

/// POST /api/v1/auth/logout
///
/// Tokens are stateless, so logging out only drops the cookie.
async fn logout(State(state): State<AppState>, user: AuthenticatedUser) -> impl IntoResponse {
    tracing::debug!(user_id = user.0.id, "user logged out");
    let cookie = clear_access_token_cookie(state.secure_cookies);
    (StatusCode::NO_CONTENT, [(header::SET_COOKIE, cookie)])
}

/// GET /api/v1/auth/user-info
async fn user_info(user: AuthenticatedUser) -> Json<User> {
    Json(user.0)
}

fn session_response(state: &AppState, session: AuthSession) -> Result<Response, ApiError> {
    let cookie = access_token_cookie(
        &session.token,
        state.user_service.token_ttl_seconds(),
        state.secure_cookies,
    );
    let cookie = HeaderValue::from_str(&cookie).map_err(ApiError::internal)?;

    Ok((
        [(header::SET_COOKIE, cookie)],
        Json(AuthResponse {
            user: session.user,
            token: session.token,
        }),
    )
        .into_response())
}
