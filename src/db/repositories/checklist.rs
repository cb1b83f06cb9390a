//! Checklist repository

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Checklist, CreateChecklistInput};
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{postgres::PgRow, sqlite::SqliteRow, Row};
use std::sync::Arc;

/// Checklist repository trait
#[async_trait]
pub trait ChecklistRepository: Send + Sync {
    /// Insert a checklist. The slug must already be set.
    async fn create(&self, input: &CreateChecklistInput) -> Result<Checklist>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Checklist>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Checklist>>;

    /// All checklists ordered by target age, then ID
    async fn list(&self) -> Result<Vec<Checklist>>;

    /// Overwrite a checklist, returns false if it is gone
    async fn update(&self, checklist: &Checklist) -> Result<bool>;

    async fn delete(&self, id: i64) -> Result<bool>;
}

/// SQLx-based checklist repository implementation
pub struct SqlxChecklistRepository {
    pool: DynDatabasePool,
}

impl SqlxChecklistRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ChecklistRepository> {
        Arc::new(Self::new(pool))
    }
}

const CHECKLIST_COLUMNS: &str = "id, title, description, for_age, slug";

#[async_trait]
impl ChecklistRepository for SqlxChecklistRepository {
    async fn create(&self, input: &CreateChecklistInput) -> Result<Checklist> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let result = sqlx::query(
                    "INSERT INTO checklists (title, description, for_age, slug) VALUES (?, ?, ?, ?)",
                )
                .bind(&input.title)
                .bind(&input.description)
                .bind(input.for_age)
                .bind(&input.slug)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to create checklist")?;

                Ok(Checklist {
                    id: result.last_insert_rowid(),
                    title: input.title.clone(),
                    description: input.description.clone(),
                    for_age: input.for_age,
                    slug: input.slug.clone(),
                })
            }
            DatabaseDriver::Postgres => {
                let row = sqlx::query(&format!(
                    r#"
                    INSERT INTO checklists (title, description, for_age, slug)
                    VALUES ($1, $2, $3, $4)
                    RETURNING {CHECKLIST_COLUMNS}
                    "#
                ))
                .bind(&input.title)
                .bind(&input.description)
                .bind(input.for_age)
                .bind(&input.slug)
                .fetch_one(self.pool.postgres()?)
                .await
                .context("Failed to create checklist")?;

                row_to_checklist_postgres(&row)
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Checklist>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&format!(
                    "SELECT {CHECKLIST_COLUMNS} FROM checklists WHERE id = ?"
                ))
                .bind(id)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get checklist by ID")?;
                row.as_ref().map(row_to_checklist_sqlite).transpose()
            }
            DatabaseDriver::Postgres => {
                let row = sqlx::query(&format!(
                    "SELECT {CHECKLIST_COLUMNS} FROM checklists WHERE id = $1"
                ))
                .bind(id)
                .fetch_optional(self.pool.postgres()?)
                .await
                .context("Failed to get checklist by ID")?;
                row.as_ref().map(row_to_checklist_postgres).transpose()
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Checklist>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let row = sqlx::query(&format!(
                    "SELECT {CHECKLIST_COLUMNS} FROM checklists WHERE slug = ?"
                ))
                .bind(slug)
                .fetch_optional(self.pool.sqlite()?)
                .await
                .context("Failed to get checklist by slug")?;
                row.as_ref().map(row_to_checklist_sqlite).transpose()
            }
            DatabaseDriver::Postgres => {
                let row = sqlx::query(&format!(
                    "SELECT {CHECKLIST_COLUMNS} FROM checklists WHERE slug = $1"
                ))
                .bind(slug)
                .fetch_optional(self.pool.postgres()?)
                .await
                .context("Failed to get checklist by slug")?;
                row.as_ref().map(row_to_checklist_postgres).transpose()
            }
        }
    }

    async fn list(&self) -> Result<Vec<Checklist>> {
        let sql = format!("SELECT {CHECKLIST_COLUMNS} FROM checklists ORDER BY for_age, id");
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.sqlite()?)
                    .await
                    .context("Failed to list checklists")?;
                rows.iter().map(row_to_checklist_sqlite).collect()
            }
            DatabaseDriver::Postgres => {
                let rows = sqlx::query(&sql)
                    .fetch_all(self.pool.postgres()?)
                    .await
                    .context("Failed to list checklists")?;
                rows.iter().map(row_to_checklist_postgres).collect()
            }
        }
    }

    async fn update(&self, checklist: &Checklist) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(
                "UPDATE checklists SET title = ?, description = ?, for_age = ?, slug = ? WHERE id = ?",
            )
            .bind(&checklist.title)
            .bind(&checklist.description)
            .bind(checklist.for_age)
            .bind(&checklist.slug)
            .bind(checklist.id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to update checklist")?
            .rows_affected(),
            DatabaseDriver::Postgres => sqlx::query(
                "UPDATE checklists SET title = $1, description = $2, for_age = $3, slug = $4 WHERE id = $5",
            )
            .bind(&checklist.title)
            .bind(&checklist.description)
            .bind(checklist.for_age)
            .bind(&checklist.slug)
            .bind(checklist.id)
            .execute(self.pool.postgres()?)
            .await
            .context("Failed to update checklist")?
            .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM checklists WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete checklist")?
                .rows_affected(),
            DatabaseDriver::Postgres => sqlx::query("DELETE FROM checklists WHERE id = $1")
                .bind(id)
                .execute(self.pool.postgres()?)
                .await
                .context("Failed to delete checklist")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }
}

fn row_to_checklist_sqlite(row: &SqliteRow) -> Result<Checklist> {
    Ok(Checklist {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        for_age: row.try_get("for_age")?,
        slug: row.try_get("slug")?,
    })
}

fn row_to_checklist_postgres(row: &PgRow) -> Result<Checklist> {
    Ok(Checklist {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        description: row.try_get("description")?,
        for_age: row.try_get("for_age")?,
        slug: row.try_get("slug")?,
    })
}
