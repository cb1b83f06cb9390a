//! Course service
//!
//! Course management plus the access rule: a user may open a course when
//! they are an admin or the course ID is in their granted list. Grants live
//! on the user row, so giving and taking access goes through the user
//! repository.

use crate::db::repositories::{CourseRepository, UserRepository};
use crate::models::{
    Course, CourseWithAccess, CreateCourseInput, NewVideo, NewWebinar, UpdateCourseInput, User,
    Video, Webinar,
};
use crate::services::upload::UploadStore;
use anyhow::Context;
use std::collections::HashSet;
use std::sync::Arc;

/// Every upload a course references: cover, diploma, videos and their
/// supplementary files. Videos sharing one supplementary file yield it once.
fn course_file_paths(course: Course) -> Vec<String> {
    let mut paths: Vec<String> = course.img.into_iter().chain(course.diploma_path).collect();
    for video in course.videos {
        paths.push(video.path);
        if let Some(file) = video.file {
            if !paths.contains(&file) {
                paths.push(file);
            }
        }
    }
    paths
}

/// Error types for course service operations
#[derive(Debug, thiserror::Error)]
pub enum CourseServiceError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(i64),

    /// Known user without a grant for the course
    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Course service
pub struct CourseService {
    courses: Arc<dyn CourseRepository>,
    users: Arc<dyn UserRepository>,
    uploads: Arc<UploadStore>,
}

impl CourseService {
    pub fn new(
        courses: Arc<dyn CourseRepository>,
        users: Arc<dyn UserRepository>,
        uploads: Arc<UploadStore>,
    ) -> Self {
        Self {
            courses,
            users,
            uploads,
        }
    }

    /// Create a course together with its initial webinars
    pub async fn create_course(
        &self,
        mut input: CreateCourseInput,
    ) -> Result<Course, CourseServiceError> {
        input.title = input.title.trim().to_string();
        validate_course(&input.title, input.cost)?;
        for webinar in &input.webinars {
            validate_webinar(webinar)?;
        }

        let course = self
            .courses
            .create(&input)
            .await
            .context("Failed to create course")?;

        tracing::info!(course_id = course.id, webinars = course.webinars.len(), "course created");
        Ok(course)
    }

    /// Apply a partial update. Replaced cover and diploma files are removed
    /// from disk once the row points at the new ones.
    pub async fn update_course(
        &self,
        id: i64,
        input: UpdateCourseInput,
    ) -> Result<Course, CourseServiceError> {
        let mut course = self.get_course(id).await?;
        let old_img = course.img.clone();
        let old_diploma = course.diploma_path.clone();

        input.apply_to(&mut course);
        course.title = course.title.trim().to_string();
        validate_course(&course.title, course.cost)?;

        if !self
            .courses
            .update(&course)
            .await
            .context("Failed to update course")?
        {
            return Err(course_not_found(id));
        }

        for (old, new) in [(old_img, &course.img), (old_diploma, &course.diploma_path)] {
            if let Some(old) = old.filter(|old| Some(old) != new.as_ref()) {
                self.remove_file(&old).await;
            }
        }

        tracing::info!(course_id = id, "course updated");
        Ok(course)
    }

    /// Delete a course, its videos and webinars, and every file they reference
    pub async fn delete_course(&self, id: i64) -> Result<(), CourseServiceError> {
        let course = self.get_course(id).await?;

        if !self
            .courses
            .delete(id)
            .await
            .context("Failed to delete course")?
        {
            return Err(course_not_found(id));
        }

        for path in course_file_paths(course) {
            self.remove_file(&path).await;
        }

        tracing::info!(course_id = id, "course deleted");
        Ok(())
    }

    /// All courses without their videos and webinars
    pub async fn list_courses(&self) -> Result<Vec<Course>, CourseServiceError> {
        Ok(self.courses.list().await.context("Failed to list courses")?)
    }

    /// Every course with videos and webinars, for the admin panel
    pub async fn list_courses_detailed(&self) -> Result<Vec<Course>, CourseServiceError> {
        Ok(self
            .courses
            .list_detailed()
            .await
            .context("Failed to list courses")?)
    }

    /// Full course detail, no access check
    pub async fn get_course(&self, id: i64) -> Result<Course, CourseServiceError> {
        self.courses
            .get_by_id(id)
            .await
            .context("Failed to load course")?
            .ok_or_else(|| course_not_found(id))
    }

    pub async fn ensure_course_exists(&self, id: i64) -> Result<(), CourseServiceError> {
        if self.courses.exists(id).await.context("Failed to check course")? {
            Ok(())
        } else {
            Err(course_not_found(id))
        }
    }

    /// Whether the user may open the course
    pub async fn has_access(&self, user_id: i64, course_id: i64) -> Result<bool, CourseServiceError> {
        Ok(self.load_user(user_id).await?.has_access(course_id))
    }

    /// Course detail for a user.
    ///
    /// # Errors
    /// - `UserNotFound` if the user no longer exists
    /// - `Forbidden` if the user has no access
    /// - `NotFound` if the user has access but the course is gone
    pub async fn get_course_for_user(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<Course, CourseServiceError> {
        if !self.has_access(user_id, course_id).await? {
            return Err(CourseServiceError::Forbidden(format!(
                "No access to course {}",
                course_id
            )));
        }
        self.get_course(course_id).await
    }

    /// Every course annotated with whether the user may open it
    pub async fn list_with_access(
        &self,
        user_id: i64,
    ) -> Result<Vec<CourseWithAccess>, CourseServiceError> {
        let user = self.load_user(user_id).await?;
        let granted: HashSet<i64> = user.course_ids.iter().copied().collect();

        Ok(self
            .list_courses()
            .await?
            .into_iter()
            .map(|course| CourseWithAccess {
                has_access: user.is_admin() || granted.contains(&course.id),
                course,
            })
            .collect())
    }

    /// Courses the user has been granted, in grant order
    pub async fn user_courses(&self, user_id: i64) -> Result<Vec<Course>, CourseServiceError> {
        let user = self.load_user(user_id).await?;
        let mut courses = self.list_courses().await?;
        courses.retain(|c| user.course_ids.contains(&c.id));
        courses.sort_by_key(|c| user.course_ids.iter().position(|id| *id == c.id));
        Ok(courses)
    }

    /// Record videos already written to disk
    pub async fn add_videos(
        &self,
        course_id: i64,
        videos: Vec<NewVideo>,
    ) -> Result<Vec<Video>, CourseServiceError> {
        if videos.is_empty() {
            return Err(CourseServiceError::ValidationError(
                "At least one video is required".to_string(),
            ));
        }
        if videos.iter().any(|v| v.title.trim().is_empty()) {
            return Err(CourseServiceError::ValidationError(
                "Every video needs a title".to_string(),
            ));
        }
        self.ensure_course_exists(course_id).await?;

        let added = self
            .courses
            .add_videos(course_id, &videos)
            .await
            .context("Failed to add videos")?;

        tracing::info!(course_id, count = added.len(), "videos added");
        Ok(added)
    }

    /// Delete a video row and its files
    pub async fn remove_video(&self, video_id: i64) -> Result<Video, CourseServiceError> {
        let video = self
            .courses
            .get_video(video_id)
            .await
            .context("Failed to load video")?
            .ok_or_else(|| {
                CourseServiceError::NotFound(format!("Video with ID {} not found", video_id))
            })?;

        if !self
            .courses
            .delete_video(video_id)
            .await
            .context("Failed to delete video")?
        {
            return Err(CourseServiceError::NotFound(format!(
                "Video with ID {} not found",
                video_id
            )));
        }

        self.remove_file(&video.path).await;
        if let Some(file) = &video.file {
            self.remove_file(file).await;
        }

        tracing::info!(video_id, course_id = video.course_id, "video removed");
        Ok(video)
    }

    pub async fn add_webinar(
        &self,
        course_id: i64,
        webinar: NewWebinar,
    ) -> Result<Webinar, CourseServiceError> {
        validate_webinar(&webinar)?;
        self.ensure_course_exists(course_id).await?;

        let webinar = self
            .courses
            .add_webinar(course_id, &webinar)
            .await
            .context("Failed to add webinar")?;

        tracing::info!(course_id, webinar_id = webinar.id, "webinar added");
        Ok(webinar)
    }

    /// Grant a user access to a course. Nothing changes when the user
    /// already has access, admins included.
    pub async fn give_access(&self, user_id: i64, course_id: i64) -> Result<(), CourseServiceError> {
        let user = self.load_user(user_id).await?;
        self.ensure_course_exists(course_id).await?;

        if user.has_access(course_id) {
            tracing::debug!(user_id, course_id, "access already granted");
            return Ok(());
        }

        if !self
            .users
            .grant_course(user_id, course_id)
            .await
            .context("Failed to grant access")?
        {
            return Err(CourseServiceError::UserNotFound(user_id));
        }

        tracing::info!(user_id, course_id, "course access granted");
        Ok(())
    }

    /// Revoke a grant. Revoking a grant the user does not hold is a no-op.
    pub async fn take_away_access(
        &self,
        user_id: i64,
        course_id: i64,
    ) -> Result<(), CourseServiceError> {
        self.load_user(user_id).await?;

        if self
            .users
            .revoke_course(user_id, course_id)
            .await
            .context("Failed to revoke access")?
        {
            tracing::info!(user_id, course_id, "course access revoked");
        }
        Ok(())
    }

    async fn load_user(&self, user_id: i64) -> Result<User, CourseServiceError> {
        self.users
            .get_by_id(user_id)
            .await
            .context("Failed to load user")?
            .ok_or(CourseServiceError::UserNotFound(user_id))
    }

    async fn remove_file(&self, path: &str) {
        if let Err(e) = self.uploads.remove(path).await {
            tracing::warn!(path, error = %e, "failed to remove course file");
        }
    }
}

fn course_not_found(id: i64) -> CourseServiceError {
    CourseServiceError::NotFound(format!("Course with ID {} not found", id))
}

fn validate_course(title: &str, cost: i64) -> Result<(), CourseServiceError> {
    if title.is_empty() {
        return Err(CourseServiceError::ValidationError(
            "Title is required".to_string(),
        ));
    }
    if cost < 0 {
        return Err(CourseServiceError::ValidationError(
            "Cost must not be negative".to_string(),
        ));
    }
    Ok(())
}

fn validate_webinar(webinar: &NewWebinar) -> Result<(), CourseServiceError> {
    if webinar.link.trim().is_empty() {
        return Err(CourseServiceError::ValidationError(
            "Webinar link is required".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use crate::db::repositories::{SqlxCourseRepository, SqlxUserRepository};
    use crate::db::{create_test_pool, migrations};
    use crate::models::{CreateUserInput, UserRole};
    use chrono::{TimeZone, Utc};
    use proptest::prelude::*;
    use tempfile::TempDir;

    struct Fixture {
        service: CourseService,
        users: Arc<dyn UserRepository>,
        _dir: TempDir,
    }

    async fn setup() -> Fixture {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let uploads = Arc::new(UploadStore::new(&UploadConfig {
            path: dir.path().to_path_buf(),
            ..UploadConfig::default()
        }));
        let users = SqlxUserRepository::boxed(pool.clone());
        Fixture {
            service: CourseService::new(SqlxCourseRepository::boxed(pool), users.clone(), uploads),
            users,
            _dir: dir,
        }
    }

    async fn user(fx: &Fixture, name: &str, role: UserRole) -> User {
        fx.users
            .create(&CreateUserInput {
                username: name.to_string(),
                password_hash: "hash".to_string(),
                role,
            })
            .await
            .unwrap()
    }

    async fn course(fx: &Fixture, title: &str) -> Course {
        fx.service
            .create_course(CreateCourseInput {
                title: title.to_string(),
                description: "d".to_string(),
                cost: 100,
                ..CreateCourseInput::default()
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_give_then_take_away_access() {
        let fx = setup().await;
        let student = user(&fx, "student", UserRole::User).await;
        let c = course(&fx, "Course").await;

        assert!(!fx.service.has_access(student.id, c.id).await.unwrap());

        fx.service.give_access(student.id, c.id).await.unwrap();
        let detail = fx.service.get_course_for_user(student.id, c.id).await.unwrap();
        assert_eq!(detail.id, c.id);

        fx.service.take_away_access(student.id, c.id).await.unwrap();
        assert!(matches!(
            fx.service.get_course_for_user(student.id, c.id).await,
            Err(CourseServiceError::Forbidden(_))
        ));
    }

    #[tokio::test]
    async fn test_give_access_twice_is_noop() {
        let fx = setup().await;
        let student = user(&fx, "student", UserRole::User).await;
        let c = course(&fx, "Course").await;

        fx.service.give_access(student.id, c.id).await.unwrap();
        fx.service.give_access(student.id, c.id).await.unwrap();

        let stored = fx.users.get_by_id(student.id).await.unwrap().unwrap();
        assert_eq!(stored.course_ids, vec![c.id]);
    }

    #[tokio::test]
    async fn test_admin_sees_everything_without_grants() {
        let fx = setup().await;
        let admin = user(&fx, "admin", UserRole::Admin).await;
        let c = course(&fx, "Course").await;

        assert!(fx.service.has_access(admin.id, c.id).await.unwrap());
        fx.service.give_access(admin.id, c.id).await.unwrap();
        let stored = fx.users.get_by_id(admin.id).await.unwrap().unwrap();
        assert!(stored.course_ids.is_empty());
    }

    #[tokio::test]
    async fn test_unknown_user_and_course() {
        let fx = setup().await;
        let student = user(&fx, "student", UserRole::User).await;
        let c = course(&fx, "Course").await;

        assert!(matches!(
            fx.service.has_access(999, c.id).await,
            Err(CourseServiceError::UserNotFound(999))
        ));
        assert!(matches!(
            fx.service.give_access(999, c.id).await,
            Err(CourseServiceError::UserNotFound(999))
        ));
        assert!(matches!(
            fx.service.give_access(student.id, 999).await,
            Err(CourseServiceError::NotFound(_))
        ));

        let admin = user(&fx, "admin", UserRole::Admin).await;
        assert!(matches!(
            fx.service.get_course_for_user(admin.id, 999).await,
            Err(CourseServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_list_with_access_flags() {
        let fx = setup().await;
        let student = user(&fx, "student", UserRole::User).await;
        let a = course(&fx, "A").await;
        let b = course(&fx, "B").await;
        fx.service.give_access(student.id, b.id).await.unwrap();

        let listed = fx.service.list_with_access(student.id).await.unwrap();
        let flags: Vec<_> = listed.iter().map(|c| (c.course.id, c.has_access)).collect();
        assert_eq!(flags, vec![(a.id, false), (b.id, true)]);

        let courses = fx.service.user_courses(student.id).await.unwrap();
        assert_eq!(courses.len(), 1);
        assert_eq!(courses[0].id, b.id);
    }

    #[tokio::test]
    async fn test_course_without_videos_has_scalars() {
        let fx = setup().await;
        let c = course(&fx, "Bare").await;

        let detail = fx.service.get_course(c.id).await.unwrap();
        assert_eq!(detail.title, "Bare");
        assert_eq!(detail.cost, 100);
        assert!(detail.videos.is_empty());
        assert!(detail.webinars.is_empty());
    }

    #[tokio::test]
    async fn test_videos_and_webinars() {
        let fx = setup().await;
        let c = course(&fx, "Course").await;

        assert!(matches!(
            fx.service.add_videos(c.id, Vec::new()).await,
            Err(CourseServiceError::ValidationError(_))
        ));
        let videos = fx
            .service
            .add_videos(
                c.id,
                vec![NewVideo {
                    title: "Intro".to_string(),
                    path: "/uploads/videos/1_intro.mp4".to_string(),
                    file: Some("/uploads/files/1_notes.pdf".to_string()),
                }],
            )
            .await
            .unwrap();
        assert_eq!(videos.len(), 1);

        let webinar = fx
            .service
            .add_webinar(
                c.id,
                NewWebinar {
                    title: "Q&A".to_string(),
                    link: "https://meet.example/qa".to_string(),
                    date: Utc.with_ymd_and_hms(2025, 5, 1, 17, 0, 0).unwrap(),
                },
            )
            .await
            .unwrap();
        assert_eq!(webinar.course_id, c.id);

        let detail = fx.service.get_course(c.id).await.unwrap();
        assert_eq!(detail.videos.len(), 1);
        assert_eq!(detail.webinars.len(), 1);

        let removed = fx.service.remove_video(videos[0].id).await.unwrap();
        assert_eq!(removed.title, "Intro");
        assert!(matches!(
            fx.service.remove_video(videos[0].id).await,
            Err(CourseServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_image_unless_replaced() {
        let fx = setup().await;
        let c = fx
            .service
            .create_course(CreateCourseInput {
                title: "Course".to_string(),
                img: Some("/uploads/photos/1_a.png".to_string()),
                ..CreateCourseInput::default()
            })
            .await
            .unwrap();

        let updated = fx
            .service
            .update_course(
                c.id,
                UpdateCourseInput {
                    cost: Some(500),
                    ..UpdateCourseInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.cost, 500);
        assert_eq!(updated.img.as_deref(), Some("/uploads/photos/1_a.png"));

        assert!(matches!(
            fx.service
                .update_course(
                    c.id,
                    UpdateCourseInput {
                        title: Some(" ".to_string()),
                        ..UpdateCourseInput::default()
                    }
                )
                .await,
            Err(CourseServiceError::ValidationError(_))
        ));

        fx.service.delete_course(c.id).await.unwrap();
        assert!(matches!(
            fx.service.get_course(c.id).await,
            Err(CourseServiceError::NotFound(_))
        ));
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(16))]

        #[test]
        fn grant_then_revoke_restores_access(grant_first in proptest::bool::ANY, extra in 0usize..3) {
            let rt = tokio::runtime::Runtime::new().unwrap();
            rt.block_on(async {
                let fx = setup().await;
                let student = user(&fx, "student", UserRole::User).await;
                let target = course(&fx, "Target").await;
                for i in 0..extra {
                    let other = course(&fx, &format!("Other {i}")).await;
                    fx.service.give_access(student.id, other.id).await.unwrap();
                }
                if grant_first {
                    fx.service.give_access(student.id, target.id).await.unwrap();
                    fx.service.take_away_access(student.id, target.id).await.unwrap();
                }

                fx.service.give_access(student.id, target.id).await.unwrap();
                fx.service.take_away_access(student.id, target.id).await.unwrap();

                assert!(!fx.service.has_access(student.id, target.id).await.unwrap());
                let stored = fx.users.get_by_id(student.id).await.unwrap().unwrap();
                assert_eq!(stored.course_ids.len(), extra);
            });
        }
    }
}
