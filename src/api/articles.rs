//! Article API endpoints
//!
//! Public:
//! - GET /api/v1/article/get - List articles
//! - GET /api/v1/article/get/{slug} - Article by slug
//! - GET /api/v1/article/id/{id} - Article by ID
//!
//! Admin:
//! - POST /api/v1/admin/article/create - Create from a multipart form
//! - PUT /api/v1/admin/article/{id} - Update
//! - DELETE /api/v1/admin/article/{id} - Delete
//! - POST /api/v1/admin/article/{id}/files - Attach more files

use axum::{
    extract::State,
    http::StatusCode,
    routing::{get, post, put},
    Json, Router,
};
use serde::Serialize;

use crate::api::middleware::{ApiError, ApiJson, ApiPath, AppState};
use crate::api::upload::{discard, MultipartForm};
use crate::models::{Article, ArticleFile, CreateArticleInput, UpdateArticleInput};
use crate::services::upload::{FailedUpload, UploadCategory};

/// Multipart field carrying article attachments
const FILES_FIELD: &str = "files";

/// Response for attaching files
#[derive(Debug, Serialize)]
pub struct ArticleFilesResponse {
    pub files: Vec<ArticleFile>,
    pub failed: Vec<FailedUpload>,
}

/// Response for creating an article: the article plus any skipped files
#[derive(Debug, Serialize)]
pub struct ArticleCreatedResponse {
    #[serde(flatten)]
    pub article: Article,
    pub failed: Vec<FailedUpload>,
}

/// Routes under `/article`
pub fn public_router() -> Router<AppState> {
    Router::new()
        .route("/get", get(list_articles))
        .route("/get/{slug}", get(get_article_by_slug))
        .route("/id/{id}", get(get_article_by_id))
}

/// Routes under `/admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/article/create", post(create_article))
        .route("/article/{id}", put(update_article).delete(delete_article))
        .route("/article/{id}/files", post(add_article_files))
}

/// GET /api/v1/article/get
async fn list_articles(State(state): State<AppState>) -> Result<Json<Vec<Article>>, ApiError> {
    Ok(Json(state.article_service.list().await?))
}

/// GET /api/v1/article/get/{slug}
async fn get_article_by_slug(
    State(state): State<AppState>,
    ApiPath(slug): ApiPath<String>,
) -> Result<Json<Article>, ApiError> {
    Ok(Json(state.article_service.get_by_slug(&slug).await?))
}

/// GET /api/v1/article/id/{id}
async fn get_article_by_id(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Article>, ApiError> {
    Ok(Json(state.article_service.get_by_id(id).await?))
}

/// POST /api/v1/admin/article/create
///
/// Text fields `title`, `content`, `category`, `author`, `read_time`, `slug`
/// plus any number of `files` parts.
async fn create_article(
    State(state): State<AppState>,
    mut form: MultipartForm,
) -> Result<(StatusCode, Json<ArticleCreatedResponse>), ApiError> {
    let input = CreateArticleInput {
        title: form.required("title")?.to_string(),
        content: form.required("content")?.to_string(),
        category: form.text("category").unwrap_or_default().to_string(),
        author: form.text("author").unwrap_or_default().to_string(),
        read_time: form.parse("read_time")?.unwrap_or(0),
        slug: form.text("slug").unwrap_or_default().to_string(),
    };

    let files: Vec<_> = form.take_files(FILES_FIELD).into_iter().map(|f| ((), f)).collect();
    let outcome = state.uploads.save_batch(UploadCategory::Articles, files).await?;
    let failed = outcome.failed.clone();
    let stored = outcome.into_files();

    match state.article_service.create(input, &stored).await {
        Ok(article) => Ok((
            StatusCode::CREATED,
            Json(ArticleCreatedResponse { article, failed }),
        )),
        Err(e) => {
            discard(&state.uploads, &stored).await;
            Err(e.into())
        }
    }
}

/// PUT /api/v1/admin/article/{id}
async fn update_article(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    ApiJson(body): ApiJson<UpdateArticleInput>,
) -> Result<Json<Article>, ApiError> {
    Ok(Json(state.article_service.update(id, body).await?))
}

/// DELETE /api/v1/admin/article/{id}
async fn delete_article(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.article_service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/article/{id}/files
async fn add_article_files(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
    mut form: MultipartForm,
) -> Result<(StatusCode, Json<ArticleFilesResponse>), ApiError> {    let files = form.take_files(FILES_FIELD);
    if files.is_empty() {
        return Err(ApiError::validation_error("No files were sent"));
    }

    state.article_service.get_by_id(id).await?;

    let files: Vec<_> = files.into_iter().map(|f| ((), f)).collect();
    let outcome = state.uploads.save_batch(UploadCategory::Articles, files).await?;
    let failed = outcome.failed.clone();
    let stored = outcome.into_files();

    match state.article_service.add_files(id, &stored).await {
        Ok(files) => Ok((
            StatusCode::CREATED,
            Json(ArticleFilesResponse { files, failed }),
        )),
        Err(e) => {
            discard(&state.uploads, &stored).await;
            Err(e.into())
        }
    }
}
