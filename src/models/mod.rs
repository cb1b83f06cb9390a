//! Data models
//!
//! Database entities (User, Article, Checklist, Course, Video, Webinar) and
//! the input types the services accept.

mod article;
mod checklist;
mod course;
mod user;

pub use article::{Article, ArticleFile, CreateArticleInput, NewArticleFile, UpdateArticleInput};
pub use checklist::{Checklist, CreateChecklistInput, UpdateChecklistInput};
pub use course::{
    parse_webinar_date, Course, CourseWithAccess, CreateCourseInput, NewVideo, NewWebinar,
    UpdateCourseInput, Video, Webinar,
};
pub use user::{CreateUserInput, User, UserRole};
