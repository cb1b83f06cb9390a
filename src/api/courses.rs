//! Course API endpoints
//!
//! Public:
//! - GET /api/v1/courses - Course catalogue without content
//!
//! Authenticated:
//! - GET /api/v1/auth/course/get-with-access - Catalogue with access flags
//! - GET /api/v1/auth/course/get/{id} - Course detail, access checked
//!
//! Admin:
//! - POST /api/v1/admin/course/create, PUT /api/v1/admin/course/update (multipart)
//! - DELETE /api/v1/admin/course/{id}, GET /api/v1/admin/courses
//! - POST /api/v1/admin/course/add-video (multipart), remove-video, add-webinar
//! - POST /api/v1/admin/course/give-access, take-away-access

use axum::{
    extract::State,
    http::StatusCode,
    routing::{delete, get, post, put},
    Json, Router,
};
use serde::{Deserialize, Serialize};

use crate::api::middleware::{ApiError, ApiJson, ApiPath, AppState, AuthenticatedUser};
use crate::api::upload::{discard, MultipartForm};
use crate::models::{
    parse_webinar_date, Course, CourseWithAccess, CreateCourseInput, NewVideo, NewWebinar,
    UpdateCourseInput, Video, Webinar,
};
use crate::services::upload::{FailedUpload, UploadCategory};
use crate::services::{StoredFile, UploadStore};

/// Request body for giving or taking away access
#[derive(Debug, Deserialize)]
pub struct AccessRequest {
    pub user_id: i64,
    pub course_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct RemoveVideoRequest {
    pub video_id: i64,
}

#[derive(Debug, Deserialize)]
pub struct AddWebinarRequest {
    pub course_id: i64,
    #[serde(flatten)]
    pub webinar: NewWebinar,
}

#[derive(Debug, Serialize)]
pub struct MessageResponse {
    pub message: String,
}

/// Response for a video upload batch
#[derive(Debug, Serialize)]
pub struct AddVideosResponse {
    pub videos: Vec<Video>,
    pub failed: Vec<FailedUpload>,
}

pub fn public_router() -> Router<AppState> {
    Router::new().route("/courses", get(list_courses))
}

/// Routes under `/auth/course`
pub fn protected_router() -> Router<AppState> {
    Router::new()
        .route("/get-with-access", get(list_with_access))
        .route("/get/{id}", get(get_course_for_user))
}

/// Routes under `/admin`
pub fn admin_router() -> Router<AppState> {
    Router::new()
        .route("/courses", get(list_courses_admin))
        .route("/course/create", post(create_course))
        .route("/course/update", put(update_course))
        .route("/course/{id}", delete(delete_course))
        .route("/course/add-video", post(add_videos))
        .route("/course/remove-video", post(remove_video))
        .route("/course/add-webinar", post(add_webinar))
        .route("/course/give-access", post(give_access))
        .route("/course/take-away-access", post(take_away_access))
}

/// GET /api/v1/courses
async fn list_courses(State(state): State<AppState>) -> Result<Json<Vec<Course>>, ApiError> {
    Ok(Json(state.course_service.list_courses().await?))
}

/// GET /api/v1/admin/courses - every course with videos and webinars
async fn list_courses_admin(
    State(state): State<AppState>,
) -> Result<Json<Vec<Course>>, ApiError> {
    Ok(Json(state.course_service.list_courses_detailed().await?))
}

/// GET /api/v1/auth/course/get-with-access
async fn list_with_access(
    State(state): State<AppState>,
    user: AuthenticatedUser,
) -> Result<Json<Vec<CourseWithAccess>>, ApiError> {
    Ok(Json(state.course_service.list_with_access(user.0.id).await?))
}

/// GET /api/v1/auth/course/get/{id}
async fn get_course_for_user(
    State(state): State<AppState>,
    user: AuthenticatedUser,
    ApiPath(id): ApiPath<i64>,
) -> Result<Json<Course>, ApiError> {
    Ok(Json(
        state.course_service.get_course_for_user(user.0.id, id).await?,
    ))
}

/// POST /api/v1/admin/course/create
///
/// Fields: `title`, `description`, `cost`, `diploma_x`, `diploma_y`,
/// optional `webinar_title`, `webinar_link`, `webinar_date`; files `img`
/// and `diploma`.
async fn create_course(
    State(state): State<AppState>,
    mut form: MultipartForm,
) -> Result<(StatusCode, Json<Course>), ApiError> {
    let mut input = CreateCourseInput {
        title: form.required("title")?.to_string(),
        description: form.text("description").unwrap_or_default().to_string(),
        cost: form.parse("cost")?.unwrap_or(0),
        diploma_x: form.parse("diploma_x")?.unwrap_or(0),
        diploma_y: form.parse("diploma_y")?.unwrap_or(0),
        webinars: webinar_from_form(&form)?.into_iter().collect(),
        ..CreateCourseInput::default()
    };

    let stored = save_course_files(&state.uploads, &mut form).await?;
    input.img = stored.img.as_ref().map(|f| f.path.clone());
    input.diploma_path = stored.diploma.as_ref().map(|f| f.path.clone());

    match state.course_service.create_course(input).await {
        Ok(course) => Ok((StatusCode::CREATED, Json(course))),
        Err(e) => {
            discard(&state.uploads, &stored.into_vec()).await;
            Err(e.into())
        }
    }
}

/// PUT /api/v1/admin/course/update
///
/// Same fields as create plus `id`. Fields left out keep their value,
/// including the cover image and diploma when no new file is sent.
async fn update_course(
    State(state): State<AppState>,
    mut form: MultipartForm,
) -> Result<Json<Course>, ApiError> {    let id: i64 = form.parse_required("id")?;

    let mut input = UpdateCourseInput {
        title: form.text("title").map(str::to_string),
        description: form.text("description").map(str::to_string),
        cost: form.parse("cost")?,
        diploma_x: form.parse("diploma_x")?,
        diploma_y: form.parse("diploma_y")?,
        ..UpdateCourseInput::default()
    };

    state.course_service.ensure_course_exists(id).await?;
    let stored = save_course_files(&state.uploads, &mut form).await?;
    input.img = stored.img.as_ref().map(|f| f.path.clone());
    input.diploma_path = stored.diploma.as_ref().map(|f| f.path.clone());

    match state.course_service.update_course(id, input).await {
        Ok(course) => Ok(Json(course)),
        Err(e) => {
            discard(&state.uploads, &stored.into_vec()).await;
            Err(e.into())
        }
    }
}

/// DELETE /api/v1/admin/course/{id}
async fn delete_course(
    State(state): State<AppState>,
    ApiPath(id): ApiPath<i64>,
) -> Result<StatusCode, ApiError> {
    state.course_service.delete_course(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// POST /api/v1/admin/course/add-video
///
/// Fields: `course_id`, one `titles` value per `videos` file part, and an
/// optional supplementary `file` shared by the batch.
async fn add_videos(
    State(state): State<AppState>,
    mut form: MultipartForm,
) -> Result<(StatusCode, Json<AddVideosResponse>), ApiError> {    let course_id: i64 = form.parse_required("course_id")?;
    let titles = form.texts("titles");
    let videos = form.take_files("videos");

    if videos.is_empty() {
        return Err(ApiError::validation_error("No videos were sent"));
    }
    if videos.len() != titles.len() {
        return Err(ApiError::with_details(
            "VALIDATION_ERROR",
            "Every video needs exactly one title",
            serde_json::json!({ "videos": videos.len(), "titles": titles.len() }),
        ));
    }
    if titles.iter().any(|t| t.is_empty()) {
        return Err(ApiError::validation_error("Video titles must not be empty"));
    }

    state.course_service.ensure_course_exists(course_id).await?;

    let supplementary = match form.take_file("file") {
        Some(file) => {
            let file_name = file.file_name.clone();
            match state.uploads.save(UploadCategory::Files, file).await {
                Ok(stored) => Some(stored),
                Err(e) => {
                    tracing::warn!(file = %file_name, error = %e, "skipping supplementary file");
                    None
                }
            }
        }
        None => None,
    };

    let labelled: Vec<_> = titles.into_iter().zip(videos).collect();
    let outcome = match state.uploads.save_batch(UploadCategory::Videos, labelled).await {
        Ok(outcome) => outcome,
        Err(e) => {
            discard(&state.uploads, supplementary.as_slice()).await;
            return Err(e.into());
        }
    };

    let new_videos: Vec<NewVideo> = outcome
        .stored
        .iter()
        .map(|(title, stored)| NewVideo {
            title: title.clone(),
            path: stored.path.clone(),
            file: supplementary.as_ref().map(|f| f.path.clone()),
        })
        .collect();

    match state.course_service.add_videos(course_id, new_videos).await {
        Ok(videos) => Ok((
            StatusCode::CREATED,
            Json(AddVideosResponse {
                videos,
                failed: outcome.failed,
            }),
        )),
        Err(e) => {
            let mut written: Vec<StoredFile> =
                outcome.stored.into_iter().map(|(_, f)| f).collect();
            written.extend(supplementary);
            discard(&state.uploads, &written).await;
            Err(e.into())
        }
    }
}

/// POST /api/v1/admin/course/remove-video
async fn remove_video(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<RemoveVideoRequest>,
) -> Result<Json<Video>, ApiError> {
    Ok(Json(state.course_service.remove_video(body.video_id).await?))
}

/// POST /api/v1/admin/course/add-webinar
async fn add_webinar(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AddWebinarRequest>,
) -> Result<(StatusCode, Json<Webinar>), ApiError> {
    let webinar = state
        .course_service
        .add_webinar(body.course_id, body.webinar)
        .await?;
    Ok((StatusCode::CREATED, Json(webinar)))
}

/// POST /api/v1/admin/course/give-access
async fn give_access(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AccessRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .course_service
        .give_access(body.user_id, body.course_id)
        .await?;
    Ok(Json(MessageResponse {
        message: format!(
            "User {} has access to course {}",
            body.user_id, body.course_id
        ),
    }))
}

/// POST /api/v1/admin/course/take-away-access
async fn take_away_access(
    State(state): State<AppState>,
    ApiJson(body): ApiJson<AccessRequest>,
) -> Result<Json<MessageResponse>, ApiError> {
    state
        .course_service
        .take_away_access(body.user_id, body.course_id)
        .await?;
    Ok(Json(MessageResponse {
        message: format!(
            "User {} no longer has access to course {}",
            body.user_id, body.course_id
        ),
    }))
}

/// Cover image and diploma template written for one request
struct CourseFiles {
    img: Option<StoredFile>,
    diploma: Option<StoredFile>,
}

impl CourseFiles {
    fn into_vec(self) -> Vec<StoredFile> {
        self.img.into_iter().chain(self.diploma).collect()
    }
}

async fn save_course_files(
    uploads: &UploadStore,
    form: &mut MultipartForm,
) -> Result<CourseFiles, ApiError> {
    let img = match form.take_file("img") {
        Some(file) => Some(uploads.save(UploadCategory::Photos, file).await?),
        None => None,
    };
    let diploma = match form.take_file("diploma") {
        Some(file) => match uploads.save(UploadCategory::Diplomas, file).await {
            Ok(stored) => Some(stored),
            Err(e) => {
                discard(uploads, img.as_slice()).await;
                return Err(e.into());
            }
        },
        None => None,
    };
    Ok(CourseFiles { img, diploma })
}

/// Optional webinar sent with a new course. A link is what makes it present.
fn webinar_from_form(form: &MultipartForm) -> Result<Option<NewWebinar>, ApiError> {
    let Some(link) = form.text("webinar_link") else {
        return Ok(None);
    };
    let date = form
        .text("webinar_date")
        .ok_or_else(|| ApiError::validation_error("Field 'webinar_date' is required"))?;

    let date = parse_webinar_date(date)
        .ok_or_else(|| ApiError::validation_error(format!("Invalid webinar date '{}'", date)))?;

    Ok(Some(NewWebinar {
        title: form.text("webinar_title").unwrap_or_default().to_string(),
        link: link.to_string(),
        date,
    }))
}
