//! Article model
//!
//! - `Article` with its attached files
//! - `ArticleFile` for uploaded attachments
//! - Input types for creating and updating articles

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Article entity
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Article {
    pub id: i64,
    pub title: String,
    pub content: String,
    /// Free-form category label
    pub category: String,
    pub author: String,
    /// Estimated reading time in minutes
    pub read_time: i32,
    /// URL-friendly slug (unique)
    pub slug: String,
    /// Attached files, in upload order
    #[serde(default)]
    pub files: Vec<ArticleFile>,
    pub created_at: DateTime<Utc>,
}

/// File attached to an article
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArticleFile {
    pub id: i64,
    pub article_id: i64,
    /// Original file name as uploaded
    pub file_name: String,
    /// Public path under `/uploads`
    pub file_path: String,
    pub content_type: String,
}

/// Attachment that has been written to disk but not yet recorded
#[derive(Debug, Clone)]
pub struct NewArticleFile {
    pub file_name: String,
    pub file_path: String,
    pub content_type: String,
}

/// Input for creating a new article
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CreateArticleInput {
    pub title: String,
    pub content: String,
    #[serde(default)]
    pub category: String,
    #[serde(default)]
    pub author: String,
    #[serde(default)]
    pub read_time: i32,
    /// Generated from the title when empty
    #[serde(default)]
    pub slug: String,
}

/// Input for updating an article, absent fields are left untouched
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateArticleInput {
    pub title: Option<String>,
    pub content: Option<String>,
    pub category: Option<String>,
    pub author: Option<String>,
    pub read_time: Option<i32>,
    pub slug: Option<String>,
}

impl UpdateArticleInput {
    /// Apply the present fields onto an existing article
    pub fn apply_to(self, article: &mut Article) {
        if let Some(title) = self.title {
            article.title = title;
        }
        if let Some(content) = self.content {
            article.content = content;
        }
        if let Some(category) = self.category {
            article.category = category;
        }
        if let Some(author) = self.author {
            article.author = author;
        }
        if let Some(read_time) = self.read_time {
            article.read_time = read_time;
        }
        if let Some(slug) = self.slug {
            article.slug = slug;
        }
    }
}
