//! Course repository
//!
//! Courses with their videos and webinars. The detail read is a single
//! `LEFT JOIN` over both child tables; [`assemble_course`] folds the joined
//! rows back into one [`Course`]. The admin listing loads every course's
//! children with one query per child table instead.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Course, CreateCourseInput, NewVideo, NewWebinar, Video, Webinar};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{postgres::PgRow, sqlite::SqliteRow, PgPool, Row, SqlitePool};
use std::collections::HashMap;
use std::sync::Arc;

/// Course repository trait
#[async_trait]
pub trait CourseRepository: Send + Sync {
    /// Insert a course and its initial webinars in one transaction
    async fn create(&self, input: &CreateCourseInput) -> Result<Course>;

    /// Course with videos and webinars
    async fn get_by_id(&self, id: i64) -> Result<Option<Course>>;

    /// All courses without their videos and webinars
    async fn list(&self) -> Result<Vec<Course>>;

    /// All courses with their videos and webinars
    async fn list_detailed(&self) -> Result<Vec<Course>>;

    /// Overwrite the scalar fields, returns false if the course is gone
    async fn update(&self, course: &Course) -> Result<bool>;

    /// Delete a course, videos and webinars go with it
    async fn delete(&self, id: i64) -> Result<bool>;

    async fn exists(&self, id: i64) -> Result<bool>;

    /// Record uploaded videos for a course
    async fn add_videos(&self, course_id: i64, videos: &[NewVideo]) -> Result<Vec<Video>>;

    async fn get_video(&self, id: i64) -> Result<Option<Video>>;

    async fn delete_video(&self, id: i64) -> Result<bool>;

    async fn add_webinar(&self, course_id: i64, webinar: &NewWebinar) -> Result<Webinar>;
}

/// SQLx-based course repository implementation
pub struct SqlxCourseRepository {
    pool: DynDatabasePool,
}

impl SqlxCourseRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn CourseRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl CourseRepository for SqlxCourseRepository {
    async fn create(&self, input: &CreateCourseInput) -> Result<Course> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_course_sqlite(self.pool.sqlite()?, input).await,
            DatabaseDriver::Postgres => create_course_postgres(self.pool.postgres()?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Course>> {
        let rows = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&detail_query("?"))
                    .bind(id)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to get course by ID")?;
                rows.iter()
                    .map(row_to_join_sqlite)
                    .collect::<Result<Vec<_>>>()?
            }
            DatabaseDriver::Postgres => {
                let rows = sqlx::query(&detail_query("$1"))
                    .bind(id)
                    .fetch_all(self.pool.postgres()?)
                    .await
                    .context("Failed to get course by ID")?;
                rows.iter()
                    .map(row_to_join_postgres)
                    .collect::<Result<Vec<_>>>()?
            }
        };
        Ok(assemble_course(rows))
    }

    async fn list(&self) -> Result<Vec<Course>> {
        let sql = format!("SELECT {COURSE_COLUMNS} FROM courses ORDER BY id");
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list courses")?;
                rows.iter().map(row_to_course_sqlite).collect()
            }
            DatabaseDriver::Postgres => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.postgres()?)
                    .await
                    .context("Failed to list courses")?;
                rows.iter().map(row_to_course_postgres).collect()
            }
        }
    }

    async fn list_detailed(&self) -> Result<Vec<Course>> {
        let mut courses = self.list().await?;
        let (videos, webinars) = match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let pool = self.pool.sqlite()?;
                let videos = sqlx::query(&format!("{VIDEO_SELECT} ORDER BY course_id, id"))
                    .fetch_all(pool)
                    .await
                    .context("Failed to list videos")?;
                let webinars = sqlx::query(&format!("{WEBINAR_SELECT} ORDER BY course_id, id"))
                    .fetch_all(pool)
                    .await
                    .context("Failed to list webinars")?;
                (
                    videos.iter().map(row_to_video_sqlite).collect::<Result<Vec<_>>>()?,
                    webinars.iter().map(row_to_webinar_sqlite).collect::<Result<Vec<_>>>()?,
                )
            }
            DatabaseDriver::Postgres => {
                let pool = self.pool.postgres()?;
                let videos = sqlx::query(&format!("{VIDEO_SELECT} ORDER BY course_id, id"))
                    .fetch_all(pool)
                    .await
                    .context("Failed to list videos")?;
                let webinars = sqlx::query(&format!("{WEBINAR_SELECT} ORDER BY course_id, id"))
                    .fetch_all(pool)
                    .await
                    .context("Failed to list webinars")?;
                (
                    videos.iter().map(row_to_video_postgres).collect::<Result<Vec<_>>>()?,
                    webinars.iter().map(row_to_webinar_postgres).collect::<Result<Vec<_>>>()?,
                )
            }
        };
        attach_children(&mut courses, videos, webinars);
        Ok(courses)
    }

    async fn update(&self, course: &Course) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(
                r#"
                UPDATE courses
                SET title = ?, description = ?, cost = ?, img = ?,
                    diploma_path = ?, diploma_x = ?, diploma_y = ?
                WHERE id = ?
                "#,
            )
            .bind(&course.title)
            .bind(&course.description)
            .bind(course.cost)
            .bind(&course.img)
            .bind(&course.diploma_path)
            .bind(course.diploma_x)
            .bind(course.diploma_y)
            .bind(course.id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to update course")?
            .rows_affected(),
            DatabaseDriver::Postgres => sqlx::query(
                r#"
                UPDATE courses
                SET title = $1, description = $2, cost = $3, img = $4,
                    diploma_path = $5, diploma_x = $6, diploma_y = $7
                WHERE id = $8
                "#,
            )
            .bind(&course.title)
            .bind(&course.description)
            .bind(course.cost)
            .bind(&course.img)
            .bind(&course.diploma_path)
            .bind(course.diploma_x)
            .bind(course.diploma_y)
            .bind(course.id)
            .execute(self.pool.postgres()?)
            .await
            .context("Failed to update course")?
            .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM courses WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete course")?
                .rows_affected(),
            DatabaseDriver::Postgres => sqlx::query("DELETE FROM courses WHERE id = $1")
                .bind(id)
                .execute(self.pool.postgres()?)
                .await
                .context("Failed to delete course")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn exists(&self, id: i64) -> Result<bool> {
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar("SELECT COUNT(*) FROM courses WHERE id = ?")
                .bind(id)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to check course")?,
            DatabaseDriver::Postgres => {
                sqlx::query_scalar("SELECT COUNT(*) FROM courses WHERE id = $1")
                    .bind(id)
                    .fetch_one(self.pool.postgres()?)
                    .await
                    .context("Failed to check course")?
            }
        };
        Ok(count > 0)
    }

    async fn add_videos(&self, course_id: i64, videos: &[NewVideo]) -> Result<Vec<Video>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let mut tx = self.pool.sqlite()?.begin().await?;
                let mut stored = Vec::with_capacity(videos.len());
                for video in videos {
                    let result = sqlx::query(
                        "INSERT INTO videos (course_id, title, path, file) VALUES (?, ?, ?, ?)",
                    )
                    .bind(course_id)
                    .bind(&video.title)
                    .bind(&video.path)
                    .bind(&video.file)
                    .execute(&mut *tx)
                    .await
                    .context("Failed to add video")?;

                    stored.push(Video {
                        id: result.last_insert_rowid(),
                        course_id,
                        title: video.title.clone(),
                        path: video.path.clone(),
                        file: video.file.clone(),
                    });
                }
                tx.commit().await?;
                Ok(stored)
            }
            DatabaseDriver::Postgres => {
                let mut tx = self.pool.postgres()?.begin().await?;
                let mut stored = Vec::with_capacity(videos.len());
                for video in videos {
                    let id: i64 = sqlx::query_scalar(
                        "INSERT INTO videos (course_id, title, path, file) VALUES ($1, $2, $3, $4) RETURNING id",
                    )
                    .bind(course_id)
                    .bind(&video.title)
                    .bind(&video.path)
                    .bind(&video.file)
                    .fetch_one(&mut *tx)
                    .await
                    .context("Failed to add video")?;

                    stored.push(Video {
                        id,
                        course_id,
                        title: video.title.clone(),
                        path: video.path.clone(),
                        file: video.file.clone(),
                    });
                }
                tx.commit().await?;
                Ok(stored)
            }
        }
    }

    async fn get_video(&self, id: i64) -> Result<Option<Video>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&format!("{VIDEO_SELECT} WHERE id = ?"))
                    .bind(id)
                    .fetch_optional(self.pool.sqlite()?)
                    .await
                    .context("Failed to get video")?;
                row.as_ref().map(row_to_video_sqlite).transpose()
            }
            DatabaseDriver::Postgres => {
                let row = sqlx::query(&format!("{VIDEO_SELECT} WHERE id = $1"))
                    .bind(id)
                    .fetch_optional(self.pool.postgres()?)
                    .await
                    .context("Failed to get video")?;
                row.as_ref().map(row_to_video_postgres).transpose()
            }
        }
    }

    async fn delete_video(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM videos WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete video")?
                .rows_affected(),
            DatabaseDriver::Postgres => sqlx::query("DELETE FROM videos WHERE id = $1")
                .bind(id)
                .execute(self.pool.postgres()?)
                .await
                .context("Failed to delete video")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn add_webinar(&self, course_id: i64, webinar: &NewWebinar) -> Result<Webinar> {
        let id: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(
                "INSERT INTO webinars (course_id, title, link, date) VALUES (?, ?, ?, ?)",
            )
            .bind(course_id)
            .bind(&webinar.title)
            .bind(&webinar.link)
            .bind(webinar.date)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to add webinar")?
            .last_insert_rowid(),
            DatabaseDriver::Postgres => sqlx::query_scalar(
                "INSERT INTO webinars (course_id, title, link, date) VALUES ($1, $2, $3, $4) RETURNING id",
            )
            .bind(course_id)
            .bind(&webinar.title)
            .bind(&webinar.link)
            .bind(webinar.date)
            .fetch_one(self.pool.postgres()?)
            .await
            .context("Failed to add webinar")?,
        };

        Ok(Webinar {
            id,
            course_id,
            title: webinar.title.clone(),
            link: webinar.link.clone(),
            date: webinar.date,
        })
    }
}

const COURSE_COLUMNS: &str =
    "id, title, description, cost, img, diploma_path, diploma_x, diploma_y, created_at";

const VIDEO_SELECT: &str = "SELECT id, course_id, title, path, file FROM videos";

const WEBINAR_SELECT: &str = "SELECT id, course_id, title, link, date FROM webinars";

/// Distribute child rows onto their courses, keeping the rows' order
fn attach_children(courses: &mut [Course], videos: Vec<Video>, webinars: Vec<Webinar>) {
    let mut videos_by_course: HashMap<i64, Vec<Video>> = HashMap::new();
    for video in videos {
        videos_by_course.entry(video.course_id).or_default().push(video);
    }
    let mut webinars_by_course: HashMap<i64, Vec<Webinar>> = HashMap::new();
    for webinar in webinars {
        webinars_by_course.entry(webinar.course_id).or_default().push(webinar);
    }
    for course in courses.iter_mut() {
        course.videos = videos_by_course.remove(&course.id).unwrap_or_default();
        course.webinars = webinars_by_course.remove(&course.id).unwrap_or_default();
    }
}

/// Detail query joining videos and webinars, `param` is the driver's placeholder
fn detail_query(param: &str) -> String {
    format!(
        r#"
        SELECT c.id, c.title, c.description, c.cost, c.img, c.diploma_path,
               c.diploma_x, c.diploma_y, c.created_at,
               v.id AS video_id, v.title AS video_title, v.path AS video_path, v.file AS video_file,
               w.id AS webinar_id, w.title AS webinar_title, w.link AS webinar_link,
               w.date AS webinar_date
        FROM courses c
        LEFT JOIN videos v ON v.course_id = c.id
        LEFT JOIN webinars w ON w.course_id = c.id
        WHERE c.id = {param}
        ORDER BY v.id, w.id
        "#
    )
}

/// One row of the detail join, child columns are NULL when absent
#[derive(Debug, Clone)]
pub struct CourseJoinRow {
    pub course: Course,
    pub video: Option<Video>,
    pub webinar: Option<Webinar>,
}

/// Fold joined rows into a single course.
///
/// The scalar fields come from the first row. Videos and webinars are
/// collected once each, since joining two child tables repeats them.
pub fn assemble_course(rows: Vec<CourseJoinRow>) -> Option<Course> {
    let mut rows = rows.into_iter();
    let first = rows.next()?;

    let mut course = first.course;
    course.videos.clear();
    course.webinars.clear();

    let mut push = |video: Option<Video>, webinar: Option<Webinar>| {
        if let Some(video) = video {
            if !course.videos.iter().any(|v| v.id == video.id) {
                course.videos.push(video);
            }
        }
        if let Some(webinar) = webinar {
            if !course.webinars.iter().any(|w| w.id == webinar.id) {
                course.webinars.push(webinar);
            }
        }
    };

    push(first.video, first.webinar);
    for row in rows {
        push(row.video, row.webinar);
    }

    Some(course)
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_course_sqlite(pool: &SqlitePool, input: &CreateCourseInput) -> Result<Course> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let course_id = sqlx::query(
        r#"
        INSERT INTO courses (title, description, cost, img, diploma_path, diploma_x, diploma_y, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.cost)
    .bind(&input.img)
    .bind(&input.diploma_path)
    .bind(input.diploma_x)
    .bind(input.diploma_y)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create course")?
    .last_insert_rowid();

    let mut webinars = Vec::with_capacity(input.webinars.len());
    for webinar in &input.webinars {
        let id = sqlx::query(
            "INSERT INTO webinars (course_id, title, link, date) VALUES (?, ?, ?, ?)",
        )
        .bind(course_id)
        .bind(&webinar.title)
        .bind(&webinar.link)
        .bind(webinar.date)
        .execute(&mut *tx)
        .await
        .context("Failed to create webinar")?
        .last_insert_rowid();

        webinars.push(Webinar {
            id,
            course_id,
            title: webinar.title.clone(),
            link: webinar.link.clone(),
            date: webinar.date,
        });
    }

    tx.commit().await.context("Failed to commit course")?;

    Ok(Course {
        id: course_id,
        title: input.title.clone(),
        description: input.description.clone(),
        cost: input.cost,
        img: input.img.clone(),
        diploma_path: input.diploma_path.clone(),
        diploma_x: input.diploma_x,
        diploma_y: input.diploma_y,
        videos: Vec::new(),
        webinars,
        created_at: now,
    })
}

fn row_to_course_sqlite(row: &SqliteRow) -> Result<Course> {
    Ok(Course {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        cost: row.try_get("cost")?,
        img: row.try_get("img")?,
        diploma_path: row.try_get("diploma_path")?,
        diploma_x: row.try_get("diploma_x")?,
        diploma_y: row.try_get("diploma_y")?,
        videos: Vec::new(),
        webinars: Vec::new(),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_video_sqlite(row: &SqliteRow) -> Result<Video> {
    Ok(Video {
        id: row.try_get("id")?,
        course_id: row.try_get("course_id")?,
        title: row.try_get("title")?,
        path: row.try_get("path")?,
        file: row.try_get("file")?,
    })
}

fn row_to_webinar_sqlite(row: &SqliteRow) -> Result<Webinar> {
    Ok(Webinar {
        id: row.try_get("id")?,
        course_id: row.try_get("course_id")?,
        title: row.try_get("title")?,
        link: row.try_get("link")?,
        date: row.try_get("date")?,
    })
}

fn row_to_join_sqlite(row: &SqliteRow) -> Result<CourseJoinRow> {
    let course = row_to_course_sqlite(row)?;

    let video = match row.try_get::<Option<i64>, _>("video_id")? {
        Some(id) => Some(Video {
            id,
            course_id: course.id,
            title: row.try_get("video_title")?,
            path: row.try_get("video_path")?,
            file: row.try_get("video_file")?,
        }),
        None => None,
    };

    let webinar = match row.try_get::<Option<i64>, _>("webinar_id")? {
        Some(id) => Some(Webinar {
            id,
            course_id: course.id,
            title: row.try_get("webinar_title")?,
            link: row.try_get("webinar_link")?,
            date: row.try_get::<DateTime<Utc>, _>("webinar_date")?,
        }),
        None => None,
    };

    Ok(CourseJoinRow {
        course,
        video,
        webinar,
    })
}

// ============================================================================
// PostgreSQL implementations
// ============================================================================

async fn create_course_postgres(pool: &PgPool, input: &CreateCourseInput) -> Result<Course> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO courses (title, description, cost, img, diploma_path, diploma_x, diploma_y)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING {COURSE_COLUMNS}
        "#
    ))
    .bind(&input.title)
    .bind(&input.description)
    .bind(input.cost)
    .bind(&input.img)
    .bind(&input.diploma_path)
    .bind(input.diploma_x)
    .bind(input.diploma_y)
    .fetch_one(&mut *tx)
    .await
    .context("Failed to create course")?;
    let mut course = row_to_course_postgres(&row)?;

    for webinar in &input.webinars {
        let id: i64 = sqlx::query_scalar(
            "INSERT INTO webinars (course_id, title, link, date) VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(course.id)
        .bind(&webinar.title)
        .bind(&webinar.link)
        .bind(webinar.date)
        .fetch_one(&mut *tx)
        .await
        .context("Failed to create webinar")?;

        course.webinars.push(Webinar {
            id,
            course_id: course.id,
            title: webinar.title.clone(),
            link: webinar.link.clone(),
            date: webinar.date,
        });
    }

    tx.commit().await.context("Failed to commit course")?;
    Ok(course)
}

fn row_to_course_postgres(row: &PgRow) -> Result<Course> {
    Ok(Course {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        cost: row.try_get("cost")?,
        img: row.try_get("img")?,
        diploma_path: row.try_get("diploma_path")?,
        diploma_x: row.try_get("diploma_x")?,
        diploma_y: row.try_get("diploma_y")?,
        videos: Vec::new(),
        webinars: Vec::new(),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_video_postgres(row: &PgRow) -> Result<Video> {
    Ok(Video {
        id: row.try_get("id")?,
        course_id: row.try_get("course_id")?,
        title: row.try_get("title")?,
        path: row.try_get("path")?,
        file: row.try_get("file")?,
    })
}

fn row_to_webinar_postgres(row: &PgRow) -> Result<Webinar> {
    Ok(Webinar {
        id: row.try_get("id")?,
        course_id: row.try_get("course_id")?,
        title: row.try_get("title")?,
        link: row.try_get("link")?,
        date: row.try_get("date")?,
    })
}

fn row_to_join_postgres(row: &PgRow) -> Result<CourseJoinRow> {
    let course = row_to_course_postgres(row)?;

    let video = match row.try_get::<Option<i64>, _>("video_id")? {
        Some(id) => Some(Video {
            id,
            course_id: course.id,
            title: row.try_get("video_title")?,
            path: row.try_get("video_path")?,
            file: row.try_get("video_file")?,
        }),
        None => None,
    };

    let webinar = match row.try_get::<Option<i64>, _>("webinar_id")? {
        Some(id) => Some(Webinar {
            id,
            course_id: course.id,
            title: row.try_get("webinar_title")?,
            link: row.try_get("webinar_link")?,
            date: row.try_get::<DateTime<Utc>, _>("webinar_date")?,
        }),
        None => None,
    };

    Ok(CourseJoinRow {
        course,
        video,
        webinar,
    })
}
