//! Article service
//!
//! - Create, read, update, delete articles
//! - Slug generation and uniqueness
//! - Attaching uploaded files and cleaning them up on delete

use crate::db::repositories::ArticleRepository;
use crate::models::{Article, ArticleFile, CreateArticleInput, NewArticleFile, UpdateArticleInput};
use crate::services::slug::{generate_slug, slug_or_generate};
use crate::services::upload::{StoredFile, UploadStore};
use anyhow::Context;
use std::sync::Arc;

/// Error types for article service operations
#[derive(Debug, thiserror::Error)]
pub enum ArticleServiceError {
    #[error("Article not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Another article already uses the slug
    #[error("Article slug already exists: {0}")]
    SlugExists(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Article service
pub struct ArticleService {
    repo: Arc<dyn ArticleRepository>,
    uploads: Arc<UploadStore>,
}

impl ArticleService {
    pub fn new(repo: Arc<dyn ArticleRepository>, uploads: Arc<UploadStore>) -> Self {
        Self { repo, uploads }
    }

    /// Create an article, optionally with files already written to disk.
    ///
    /// # Errors
    /// - `ValidationError` if the title or content is empty, or no slug can
    ///   be derived from the title
    /// - `SlugExists` if the slug is taken
    pub async fn create(
        &self,
        mut input: CreateArticleInput,
        files: &[StoredFile],
    ) -> Result<Article, ArticleServiceError> {
        input.title = input.title.trim().to_string();
        require("Title", &input.title)?;
        require("Content", &input.content)?;
        if input.read_time < 0 {
            return Err(ArticleServiceError::ValidationError(
                "Read time must not be negative".to_string(),
            ));
        }

        input.slug = slug_or_generate(&input.slug, &input.title);
        require("Slug", &input.slug)?;
        self.ensure_slug_free(&input.slug, None).await?;

        let article = self
            .repo
            .create(&input, &to_new_files(files))
            .await
            .context("Failed to create article")?;

        tracing::info!(article_id = article.id, slug = %article.slug, "article created");
        Ok(article)
    }

    /// Attach more files to an existing article
    pub async fn add_files(
        &self,
        article_id: i64,
        files: &[StoredFile],
    ) -> Result<Vec<ArticleFile>, ArticleServiceError> {
        self.get_by_id(article_id).await?;

        let added = self
            .repo
            .add_files(article_id, &to_new_files(files))
            .await
            .context("Failed to attach article files")?;

        tracing::info!(article_id, count = added.len(), "article files added");
        Ok(added)
    }

    pub async fn list(&self) -> Result<Vec<Article>, ArticleServiceError> {
        Ok(self.repo.list().await.context("Failed to list articles")?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Article, ArticleServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to load article")?
            .ok_or_else(|| ArticleServiceError::NotFound(format!("Article with ID {} not found", id)))
    }

    pub async fn get_by_slug(&self, slug: &str) -> Result<Article, ArticleServiceError> {
        self.repo
            .get_by_slug(slug)
            .await
            .context("Failed to load article")?
            .ok_or_else(|| ArticleServiceError::NotFound(format!("Article '{}' not found", slug)))
    }

    /// Apply a partial update. A new slug is normalized the same way as on create.
    pub async fn update(
        &self,
        id: i64,
        mut input: UpdateArticleInput,
    ) -> Result<Article, ArticleServiceError> {
        let mut article = self.get_by_id(id).await?;

        if let Some(slug) = input.slug.take() {
            let slug = generate_slug(&slug);
            require("Slug", &slug)?;
            if slug != article.slug {
                self.ensure_slug_free(&slug, Some(id)).await?;
            }
            input.slug = Some(slug);
        }
        input.apply_to(&mut article);

        article.title = article.title.trim().to_string();
        require("Title", &article.title)?;
        require("Content", &article.content)?;

        if !self
            .repo
            .update(&article)
            .await
            .context("Failed to update article")?
        {
            return Err(ArticleServiceError::NotFound(format!(
                "Article with ID {} not found",
                id
            )));
        }

        tracing::info!(article_id = id, "article updated");
        Ok(article)
    }

    /// Delete an article with its file rows, then its files on disk
    pub async fn delete(&self, id: i64) -> Result<(), ArticleServiceError> {
        let article = self.get_by_id(id).await?;

        if !self
            .repo
            .delete(id)
            .await
            .context("Failed to delete article")?
        {
            return Err(ArticleServiceError::NotFound(format!(
                "Article with ID {} not found",
                id
            )));
        }

        for file in &article.files {
            if let Err(e) = self.uploads.remove(&file.file_path).await {
                tracing::warn!(path = %file.file_path, error = %e, "failed to remove article file");
            }
        }

        tracing::info!(article_id = id, "article deleted");
        Ok(())
    }

    async fn ensure_slug_free(
        &self,
        slug: &str,
        current_id: Option<i64>,
    ) -> Result<(), ArticleServiceError> {
        let existing = self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to check slug")?;

        match existing {
            Some(other) if Some(other.id) != current_id => {
                Err(ArticleServiceError::SlugExists(slug.to_string()))
            }
            _ => Ok(()),
        }
    }
}

fn require(field: &str, value: &str) -> Result<(), ArticleServiceError> {
    if value.trim().is_empty() {
        return Err(ArticleServiceError::ValidationError(format!(
            "{} is required",
            field
        )));
    }
    Ok(())
}

fn to_new_files(files: &[StoredFile]) -> Vec<NewArticleFile> {
    files
        .iter()
        .map(|f| NewArticleFile {
            file_name: f.original_name.clone(),
            file_path: f.path.clone(),
            content_type: f.content_type.clone(),
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::UploadConfig;
    use crate::db::repositories::SqlxArticleRepository;
    use crate::db::{create_test_pool, migrations};
    use crate::services::upload::UploadCategory;
    use tempfile::TempDir;

    async fn setup_service() -> (ArticleService, Arc<UploadStore>, TempDir) {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        let dir = tempfile::tempdir().unwrap();
        let uploads = Arc::new(UploadStore::new(&UploadConfig {
            path: dir.path().to_path_buf(),
            ..UploadConfig::default()
        }));
        let service = ArticleService::new(SqlxArticleRepository::boxed(pool), uploads.clone());
        (service, uploads, dir)
    }

    fn input(title: &str) -> CreateArticleInput {
        CreateArticleInput {
            title: title.to_string(),
            content: "Body".to_string(),
            category: "sensory".to_string(),
            author: "Anna".to_string(),
            read_time: 5,
            ..CreateArticleInput::default()
        }
    }

    #[tokio::test]
    async fn test_create_generates_slug() {
        let (service, _, _dir) = setup_service().await;
        let article = service.create(input("Сенсорные игры"), &[]).await.unwrap();

        assert_eq!(article.slug, "сенсорные-игры");
        let by_slug = service.get_by_slug("сенсорные-игры").await.unwrap();
        assert_eq!(by_slug.id, article.id);
    }

    #[tokio::test]
    async fn test_create_validates_input() {
        let (service, _, _dir) = setup_service().await;

        let mut empty_content = input("Title");
        empty_content.content = "  ".to_string();
        for bad in [input(""), input("!!!"), empty_content] {
            assert!(matches!(
                service.create(bad, &[]).await,
                Err(ArticleServiceError::ValidationError(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_duplicate_slug_is_conflict() {
        let (service, _, _dir) = setup_service().await;
        service.create(input("Same"), &[]).await.unwrap();

        assert!(matches!(
            service.create(input("Same"), &[]).await,
            Err(ArticleServiceError::SlugExists(_))
        ));
    }

    #[tokio::test]
    async fn test_update_keeps_own_slug_and_rejects_taken_one() {
        let (service, _, _dir) = setup_service().await;
        let a = service.create(input("First"), &[]).await.unwrap();
        service.create(input("Second"), &[]).await.unwrap();

        let updated = service
            .update(
                a.id,
                UpdateArticleInput {
                    title: Some("First, revised".to_string()),
                    slug: Some("first".to_string()),
                    ..UpdateArticleInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "First, revised");
        assert_eq!(updated.slug, "first");

        let err = service
            .update(
                a.id,
                UpdateArticleInput {
                    slug: Some("Second".to_string()),
                    ..UpdateArticleInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ArticleServiceError::SlugExists(_)));

        assert!(matches!(
            service.update(999, UpdateArticleInput::default()).await,
            Err(ArticleServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_files_attached_and_removed_with_article() {
        let (service, uploads, dir) = setup_service().await;
        let file = uploads.stage_bytes("guide.pdf", "application/pdf", b"%PDF").await;
        let stored = uploads.save(UploadCategory::Articles, file).await.unwrap();

        let article = service.create(input("With files"), &[stored.clone()]).await.unwrap();
        assert_eq!(article.files.len(), 1);
        assert_eq!(article.files[0].file_name, "guide.pdf");

        let more = service.add_files(article.id, &[]).await.unwrap();
        assert!(more.is_empty());
        assert!(matches!(
            service.add_files(999, &[]).await,
            Err(ArticleServiceError::NotFound(_))
        ));

        service.delete(article.id).await.unwrap();
        let name = stored.path.rsplit('/').next().unwrap();
        assert!(!dir.path().join("articles").join(name).exists());
        assert!(matches!(
            service.get_by_id(article.id).await,
            Err(ArticleServiceError::NotFound(_))
        ));
    }
}
