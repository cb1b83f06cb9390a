//! API middleware
//!
//! Contains:
//! - Shared application state
//! - JSON body and path extractors that reject with the API error type
//! - The API error type and the mapping from service errors
//! - Access token cookie handling
//! - Authentication and admin authorization layers

use axum::{
    extract::{
        multipart::{MultipartError, MultipartRejection},
        rejection::{JsonRejection, PathRejection},
        FromRequest, FromRequestParts, Path, Request, State,
    },
    http::{header, request::Parts, HeaderMap, StatusCode},
    middleware::Next,
    response::{IntoResponse, Response},
    Json,
};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use std::sync::Arc;

use crate::db::DynDatabasePool;
use crate::models::User;
use crate::services::{
    ArticleService, ArticleServiceError, ChecklistService, ChecklistServiceError, CourseService,
    CourseServiceError, UploadError, UploadStore, UserService, UserServiceError,
};

/// Name of the cookie carrying the access token
pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Application state containing shared services
#[derive(Clone)]
pub struct AppState {
    pub pool: DynDatabasePool,
    pub user_service: Arc<UserService>,
    pub article_service: Arc<ArticleService>,
    pub checklist_service: Arc<ChecklistService>,
    pub course_service: Arc<CourseService>,
    pub uploads: Arc<UploadStore>,
    /// Adds `Secure` to the access token cookie
    pub secure_cookies: bool,
}

/// Authenticated user extracted from request
#[derive(Debug, Clone)]
pub struct AuthenticatedUser(pub User);

impl<S> FromRequestParts<S> for AuthenticatedUser
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<AuthenticatedUser>()
            .cloned()
            .ok_or_else(|| ApiError::unauthorized("Authentication required"))
    }
}

/// JSON request body. A missing content type, bad syntax or a body that
/// does not match `T` is answered with a `VALIDATION_ERROR`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiJson<T>(pub T);

impl<T, S> FromRequest<S> for ApiJson<T>
where
    T: DeserializeOwned,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request(req: Request, state: &S) -> Result<Self, Self::Rejection> {
        let Json(value) = Json::<T>::from_request(req, state).await?;
        Ok(Self(value))
    }
}

/// Path parameters, rejected with a `VALIDATION_ERROR` when they do not parse
#[derive(Debug, Clone, Copy, Default)]
pub struct ApiPath<T>(pub T);

impl<T, S> FromRequestParts<S> for ApiPath<T>
where
    T: DeserializeOwned + Send,
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, state: &S) -> Result<Self, Self::Rejection> {
        let Path(value) = Path::<T>::from_request_parts(parts, state).await?;
        Ok(Self(value))
    }
}

/// Error response for API errors
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: ApiErrorDetail,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiErrorDetail {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: None,
            },
        }
    }

    pub fn with_details(
        code: impl Into<String>,
        message: impl Into<String>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            error: ApiErrorDetail {
                code: code.into(),
                message: message.into(),
                details: Some(details),
            },
        }
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new("UNAUTHORIZED", message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new("FORBIDDEN", message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new("NOT_FOUND", message)
    }

    pub fn validation_error(message: impl Into<String>) -> Self {
        Self::new("VALIDATION_ERROR", message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::new("CONFLICT", message)
    }

    pub fn payload_too_large(message: impl Into<String>) -> Self {
        Self::new("PAYLOAD_TOO_LARGE", message)
    }

    /// Log the cause and hide it from the client
    pub fn internal(cause: impl std::fmt::Display) -> Self {
        tracing::error!(error = %cause, "internal error");
        Self::new("INTERNAL_ERROR", "Internal server error")
    }

    pub fn status(&self) -> StatusCode {
        match self.error.code.as_str() {
            "VALIDATION_ERROR" => StatusCode::BAD_REQUEST,
            "UNAUTHORIZED" => StatusCode::UNAUTHORIZED,
            "FORBIDDEN" => StatusCode::FORBIDDEN,
            "NOT_FOUND" => StatusCode::NOT_FOUND,
            "CONFLICT" => StatusCode::CONFLICT,
            "PAYLOAD_TOO_LARGE" => StatusCode::PAYLOAD_TOO_LARGE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(self)).into_response()
    }
}

impl From<UserServiceError> for ApiError {
    fn from(e: UserServiceError) -> Self {
        match e {
            UserServiceError::AuthenticationError(msg) => ApiError::unauthorized(msg),
            UserServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            UserServiceError::UserExists(msg) => ApiError::conflict(msg),
            UserServiceError::NotFound(id) => {
                ApiError::not_found(format!("User with ID {} not found", id))
            }
            UserServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<ArticleServiceError> for ApiError {
    fn from(e: ArticleServiceError) -> Self {
        match e {
            ArticleServiceError::NotFound(msg) => ApiError::not_found(msg),
            ArticleServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ArticleServiceError::SlugExists(slug) => {
                ApiError::conflict(format!("Slug '{}' is already used", slug))
            }
            ArticleServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<ChecklistServiceError> for ApiError {
    fn from(e: ChecklistServiceError) -> Self {
        match e {
            ChecklistServiceError::NotFound(id) => {
                ApiError::not_found(format!("Checklist with ID {} not found", id))
            }
            ChecklistServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            ChecklistServiceError::SlugExists(slug) => {
                ApiError::conflict(format!("Slug '{}' is already used", slug))
            }
            ChecklistServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<CourseServiceError> for ApiError {
    fn from(e: CourseServiceError) -> Self {
        match e {
            CourseServiceError::NotFound(msg) => ApiError::not_found(msg),
            CourseServiceError::UserNotFound(id) => {
                ApiError::not_found(format!("User with ID {} not found", id))
            }
            CourseServiceError::Forbidden(msg) => ApiError::forbidden(msg),
            CourseServiceError::ValidationError(msg) => ApiError::validation_error(msg),
            CourseServiceError::InternalError(e) => ApiError::internal(format!("{:#}", e)),
        }
    }
}

impl From<UploadError> for ApiError {
    fn from(e: UploadError) -> Self {
        match e {
            UploadError::TooLarge { .. } => ApiError::payload_too_large(e.to_string()),
            UploadError::TypeNotAllowed(_)
            | UploadError::Empty(_)
            | UploadError::InvalidPath(_)
            | UploadError::NothingSaved(_) => ApiError::validation_error(e.to_string()),
            UploadError::Io(e) => ApiError::internal(e),
        }
    }
}

impl From<MultipartError> for ApiError {
    fn from(e: MultipartError) -> Self {
        if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
            ApiError::payload_too_large(e.body_text())
        } else {
            ApiError::validation_error(format!("Invalid multipart body: {}", e.body_text()))
        }
    }
}

/// Extractor rejections keep their status class but use the API error body
fn rejection_error(status: StatusCode, message: String) -> ApiError {
    if status == StatusCode::PAYLOAD_TOO_LARGE {
        ApiError::payload_too_large(message)
    } else if status.is_server_error() {
        ApiError::internal(message)
    } else {
        ApiError::validation_error(message)
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        rejection_error(rejection.status(), rejection.body_text())
    }
}

/// Read the access token from the `access_token` cookie
pub fn extract_access_token(headers: &HeaderMap) -> Option<String> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|cookies| cookies.split(';'))
        .filter_map(|cookie| cookie.trim().split_once('='))
        .find(|(name, value)| *name == ACCESS_TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// `Set-Cookie` value carrying a fresh access token
pub fn access_token_cookie(token: &str, max_age_seconds: i64, secure: bool) -> String {
    format!(
        "{}={}; Path=/; HttpOnly; SameSite=Strict; Max-Age={}{}",
        ACCESS_TOKEN_COOKIE,
        token,
        max_age_seconds,
        if secure { "; Secure" } else { "" }
    )
}

/// `Set-Cookie` value removing the access token
pub fn clear_access_token_cookie(secure: bool) -> String {
    access_token_cookie("", 0, secure)
}

/// Authentication middleware
///
/// Resolves the cookie token to the current user record, so revoked grants
/// and deleted accounts take effect immediately.
pub async fn require_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_access_token(request.headers())
        .ok_or_else(|| ApiError::unauthorized("Missing authentication token"))?;

    let user = state.user_service.authenticate(&token).await?;

    request.extensions_mut().insert(AuthenticatedUser(user));
    Ok(next.run(request).await)
}

/// Admin authorization middleware
pub async fn require_admin(request: Request, next: Next) -> Result<Response, ApiError> {
    let user = request
        .extensions()
        .get::<AuthenticatedUser>()
        .ok_or_else(|| ApiError::unauthorized("Authentication required"))?;

    if !user.0.is_admin() {
        return Err(ApiError::forbidden("Admin privileges required"));
    }

    Ok(next.run(request).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_access_token() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; access_token=abc.def.ghi; other=1"),
        );
        assert_eq!(extract_access_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_missing_or_empty_token() {
        let mut headers = HeaderMap::new();
        assert!(extract_access_token(&headers).is_none());

        headers.insert(header::COOKIE, HeaderValue::from_static("access_token="));
        assert!(extract_access_token(&headers).is_none());

        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Bearer abc"));
        assert!(extract_access_token(&headers).is_none());
    }

    #[derive(Debug, Deserialize)]
    struct Named {
        name: String,
    }

    fn post(content_type: Option<&str>, body: &'static str) -> Request {
        let mut builder = axum::http::Request::builder().method("POST").uri("/");
        if let Some(content_type) = content_type {
            builder = builder.header(header::CONTENT_TYPE, content_type);
        }
        builder.body(axum::body::Body::from(body)).unwrap()
    }

    #[tokio::test]
    async fn test_json_body_rejections_are_validation_errors() {
        let json = Some("application/json");
        for (content_type, body) in [
            (json, r#"{"name":"#),
            (json, r#"{"other":1}"#),
            (json, r#"{"name":7}"#),
            (None, r#"{"name":"a"}"#),
            (Some("text/plain"), r#"{"name":"a"}"#),
        ] {
            let error = ApiJson::<Named>::from_request(post(content_type, body), &())
                .await
                .unwrap_err();
            assert_eq!(error.status(), StatusCode::BAD_REQUEST, "{body}");
            assert_eq!(error.error.code, "VALIDATION_ERROR");
        }

        let ApiJson(named) = ApiJson::<Named>::from_request(post(json, r#"{"name":"a"}"#), &())
            .await
            .unwrap();
        assert_eq!(named.name, "a");
    }

    #[test]
    fn test_cookie_attributes() {
        let cookie = access_token_cookie("tok", 1_209_600, false);
        assert_eq!(
            cookie,
            "access_token=tok; Path=/; HttpOnly; SameSite=Strict; Max-Age=1209600"
        );
        assert!(clear_access_token_cookie(true).ends_with("Max-Age=0; Secure"));
    }

    #[test]
    fn test_error_status_mapping() {
        let cases = [
            (ApiError::validation_error("x"), StatusCode::BAD_REQUEST),
            (ApiError::unauthorized("x"), StatusCode::UNAUTHORIZED),
            (ApiError::forbidden("x"), StatusCode::FORBIDDEN),
            (ApiError::not_found("x"), StatusCode::NOT_FOUND),
            (ApiError::conflict("x"), StatusCode::CONFLICT),
            (ApiError::payload_too_large("x"), StatusCode::PAYLOAD_TOO_LARGE),
            (ApiError::internal("db down"), StatusCode::INTERNAL_SERVER_ERROR),
        ];
        for (error, status) in cases {
            assert_eq!(error.status(), status);
        }
    }

    #[test]
    fn test_internal_details_are_hidden() {
        let error: ApiError =
            CourseServiceError::InternalError(anyhow::anyhow!("connection refused")).into();
        assert_eq!(error.error.code, "INTERNAL_ERROR");
        assert!(!error.error.message.contains("connection refused"));
    }

    #[test]
    fn test_access_errors_map_by_variant() {
        let forbidden: ApiError = CourseServiceError::Forbidden("no".into()).into();
        assert_eq!(forbidden.status(), StatusCode::FORBIDDEN);

        let missing: ApiError = CourseServiceError::NotFound("gone".into()).into();
        assert_eq!(missing.status(), StatusCode::NOT_FOUND);

        let taken: ApiError = UserServiceError::UserExists("a".into()).into();
        assert_eq!(taken.status(), StatusCode::CONFLICT);
    }
}
