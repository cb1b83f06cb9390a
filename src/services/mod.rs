//! Services layer - Business logic
//!
//! Services validate input, apply the business rules and coordinate
//! repositories and the upload store. HTTP concerns stay in `api`.

pub mod article;
pub mod checklist;
pub mod course;
pub mod password;
pub mod slug;
pub mod token;
pub mod upload;
pub mod user;

pub use article::{ArticleService, ArticleServiceError};
pub use checklist::{ChecklistService, ChecklistServiceError};
pub use course::{CourseService, CourseServiceError};
pub use password::{hash_password, verify_password};
pub use slug::{generate_slug, slug_or_generate};
pub use token::{Claims, TokenError, TokenService};
pub use upload::{IncomingFile, StoredFile, UploadCategory, UploadError, UploadStore};
pub use user::{AuthSession, Credentials, UserService, UserServiceError};
