//! Database repositories
//!
//! Each repository handles the queries for one entity and exposes them
//! through an async trait so services can be tested against any backend.

pub mod article;
pub mod checklist;
pub mod course;
pub mod user;

pub use article::{ArticleRepository, SqlxArticleRepository};
pub use checklist::{ChecklistRepository, SqlxChecklistRepository};
pub use course::{CourseRepository, SqlxCourseRepository};
pub use user::{SqlxUserRepository, UserRepository};
