//! Checklist service

use crate::db::repositories::ChecklistRepository;
use crate::models::{Checklist, CreateChecklistInput, UpdateChecklistInput};
use crate::services::slug::{generate_slug, slug_or_generate};
use anyhow::Context;
use std::sync::Arc;

/// Error types for checklist service operations
#[derive(Debug, thiserror::Error)]
pub enum ChecklistServiceError {
    #[error("Checklist not found: {0}")]
    NotFound(i64),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Checklist slug already exists: {0}")]
    SlugExists(String),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Checklist service
pub struct ChecklistService {
    repo: Arc<dyn ChecklistRepository>,
}

impl ChecklistService {
    pub fn new(repo: Arc<dyn ChecklistRepository>) -> Self {
        Self { repo }
    }

    /// # Errors
    /// - `ValidationError` for an empty title, negative age or empty slug
    /// - `SlugExists` if another checklist has the slug
    pub async fn create(
        &self,
        mut input: CreateChecklistInput,
    ) -> Result<Checklist, ChecklistServiceError> {
        input.title = input.title.trim().to_string();
        input.slug = slug_or_generate(&input.slug, &input.title);
        validate(&input.title, input.for_age, &input.slug)?;
        self.ensure_slug_free(&input.slug, None).await?;

        let checklist = self
            .repo
            .create(&input)
            .await
            .context("Failed to create checklist")?;

        tracing::info!(checklist_id = checklist.id, "checklist created");
        Ok(checklist)
    }

    /// All checklists, youngest target age first
    pub async fn list(&self) -> Result<Vec<Checklist>, ChecklistServiceError> {
        Ok(self.repo.list().await.context("Failed to list checklists")?)
    }

    pub async fn get_by_id(&self, id: i64) -> Result<Checklist, ChecklistServiceError> {
        self.repo
            .get_by_id(id)
            .await
            .context("Failed to load checklist")?
            .ok_or(ChecklistServiceError::NotFound(id))
    }

    pub async fn update(
        &self,
        id: i64,
        mut input: UpdateChecklistInput,
    ) -> Result<Checklist, ChecklistServiceError> {
        let mut checklist = self.get_by_id(id).await?;

        input.slug = input.slug.map(|s| generate_slug(&s));
        input.apply_to(&mut checklist);
        checklist.title = checklist.title.trim().to_string();
        validate(&checklist.title, checklist.for_age, &checklist.slug)?;
        self.ensure_slug_free(&checklist.slug, Some(id)).await?;

        if !self
            .repo
            .update(&checklist)
            .await
            .context("Failed to update checklist")?
        {
            return Err(ChecklistServiceError::NotFound(id));
        }

        tracing::info!(checklist_id = id, "checklist updated");
        Ok(checklist)
    }

    pub async fn delete(&self, id: i64) -> Result<(), ChecklistServiceError> {
        if !self
            .repo
            .delete(id)
            .await
            .context("Failed to delete checklist")?
        {
            return Err(ChecklistServiceError::NotFound(id));
        }
        tracing::info!(checklist_id = id, "checklist deleted");
        Ok(())
    }

    async fn ensure_slug_free(
        &self,
        slug: &str,
        current_id: Option<i64>,
    ) -> Result<(), ChecklistServiceError> {
        match self
            .repo
            .get_by_slug(slug)
            .await
            .context("Failed to check slug")?
        {
            Some(other) if Some(other.id) != current_id => {
                Err(ChecklistServiceError::SlugExists(slug.to_string()))
            }
            _ => Ok(()),
        }
    }
}

fn validate(title: &str, for_age: i32, slug: &str) -> Result<(), ChecklistServiceError> {
    if title.is_empty() {
        return Err(ChecklistServiceError::ValidationError(
            "Title is required".to_string(),
        ));
    }
    if for_age < 0 {
        return Err(ChecklistServiceError::ValidationError(
            "Age must not be negative".to_string(),
        ));
    }
    if slug.is_empty() {
        return Err(ChecklistServiceError::ValidationError(
            "Slug is required".to_string(),
        ));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxChecklistRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup_service() -> ChecklistService {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        ChecklistService::new(SqlxChecklistRepository::boxed(pool))
    }

    fn input(title: &str, for_age: i32) -> CreateChecklistInput {
        CreateChecklistInput {
            title: title.to_string(),
            description: "Steps".to_string(),
            for_age,
            ..CreateChecklistInput::default()
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let service = setup_service().await;
        let created = service.create(input("Sleep routine", 3)).await.unwrap();

        assert_eq!(created.slug, "sleep-routine");
        assert_eq!(service.get_by_id(created.id).await.unwrap(), created);
    }

    #[tokio::test]
    async fn test_validation() {
        let service = setup_service().await;
        for bad in [input("", 1), input("Title", -1), input("???", 2)] {
            assert!(matches!(
                service.create(bad).await,
                Err(ChecklistServiceError::ValidationError(_))
            ));
        }
    }

    #[tokio::test]
    async fn test_update_partial() {
        let service = setup_service().await;
        let created = service.create(input("Walk", 2)).await.unwrap();

        let updated = service
            .update(
                created.id,
                UpdateChecklistInput {
                    for_age: Some(4),
                    ..UpdateChecklistInput::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.for_age, 4);
        assert_eq!(updated.title, "Walk");
        assert_eq!(updated.slug, "walk");
    }

    #[tokio::test]
    async fn test_slug_conflict_on_update() {
        let service = setup_service().await;
        service.create(input("Taken", 1)).await.unwrap();
        let other = service.create(input("Free", 1)).await.unwrap();

        let err = service
            .update(
                other.id,
                UpdateChecklistInput {
                    slug: Some("taken".to_string()),
                    ..UpdateChecklistInput::default()
                },
            )
            .await
            .unwrap_err();
        assert!(matches!(err, ChecklistServiceError::SlugExists(_)));
    }

    #[tokio::test]
    async fn test_delete_missing() {
        let service = setup_service().await;
        let created = service.create(input("Gone", 1)).await.unwrap();

        service.delete(created.id).await.unwrap();
        assert!(matches!(
            service.delete(created.id).await,
            Err(ChecklistServiceError::NotFound(_))
        ));
        assert!(matches!(
            service.get_by_id(created.id).await,
            Err(ChecklistServiceError::NotFound(_))
        ));
    }
}
