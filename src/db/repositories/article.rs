//! Article repository
//!
//! Articles and their attached files. Reads always return the article with
//! its files loaded.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{Article, ArticleFile, CreateArticleInput, NewArticleFile};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{
    postgres::PgRow, sqlite::SqliteRow, PgConnection, PgPool, Row, SqliteConnection, SqlitePool,
};
use std::collections::HashMap;
use std::sync::Arc;

/// Article repository trait
#[async_trait]
pub trait ArticleRepository: Send + Sync {
    /// Insert an article together with its files in one transaction.
    /// The slug must already be set.
    async fn create(&self, input: &CreateArticleInput, files: &[NewArticleFile])
        -> Result<Article>;

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>>;

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>>;

    /// All articles, newest first
    async fn list(&self) -> Result<Vec<Article>>;

    /// Overwrite the scalar fields, returns false if the article is gone
    async fn update(&self, article: &Article) -> Result<bool>;

    /// Delete an article and, through the foreign key, its file rows
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Record files already written to disk
    async fn add_files(&self, article_id: i64, files: &[NewArticleFile])
        -> Result<Vec<ArticleFile>>;
}

/// SQLx-based article repository implementation
pub struct SqlxArticleRepository {
    pool: DynDatabasePool,
}

impl SqlxArticleRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn ArticleRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl ArticleRepository for SqlxArticleRepository {
    async fn create(
        &self,
        input: &CreateArticleInput,
        files: &[NewArticleFile],
    ) -> Result<Article> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                create_article_sqlite(self.pool.sqlite()?, input, files).await
            }
            DatabaseDriver::Postgres => {
                create_article_postgres(self.pool.postgres()?, input, files).await
            }
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<Article>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_article_sqlite(self.pool.sqlite()?, "id = ?", Key::Id(id)).await
            }
            DatabaseDriver::Postgres => {
                get_article_postgres(self.pool.postgres()?, "id = $1", Key::Id(id)).await
            }
        }
    }

    async fn get_by_slug(&self, slug: &str) -> Result<Option<Article>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_article_sqlite(self.pool.sqlite()?, "slug = ?", Key::Slug(slug)).await
            }
            DatabaseDriver::Postgres => {
                get_article_postgres(self.pool.postgres()?, "slug = $1", Key::Slug(slug)).await
            }
        }
    }

    async fn list(&self) -> Result<Vec<Article>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_articles_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Postgres => list_articles_postgres(self.pool.postgres()?).await,
        }
    }

    async fn update(&self, article: &Article) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query(
                r#"
                UPDATE articles
                SET title = ?, content = ?, category = ?, author = ?, read_time = ?, slug = ?
                WHERE id = ?
                "#,
            )
            .bind(&article.title)
            .bind(&article.content)
            .bind(&article.category)
            .bind(&article.author)
            .bind(article.read_time)
            .bind(&article.slug)
            .bind(article.id)
            .execute(self.pool.sqlite()?)
            .await
            .context("Failed to update article")?
            .rows_affected(),
            DatabaseDriver::Postgres => sqlx::query(
                r#"
                UPDATE articles
                SET title = $1, content = $2, category = $3, author = $4, read_time = $5, slug = $6
                WHERE id = $7
                "#,
            )
            .bind(&article.title)
            .bind(&article.content)
            .bind(&article.category)
            .bind(&article.author)
            .bind(article.read_time)
            .bind(&article.slug)
            .bind(article.id)
            .execute(self.pool.postgres()?)
            .await
            .context("Failed to update article")?
            .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM articles WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete article")?
                .rows_affected(),
            DatabaseDriver::Postgres => sqlx::query("DELETE FROM articles WHERE id = $1")
                .bind(id)
                .execute(self.pool.postgres()?)
                .await
                .context("Failed to delete article")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn add_files(
        &self,
        article_id: i64,
        files: &[NewArticleFile],
    ) -> Result<Vec<ArticleFile>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => add_files_sqlite(self.pool.sqlite()?, article_id, files).await,
            DatabaseDriver::Postgres => {
                add_files_postgres(self.pool.postgres()?, article_id, files).await
            }
        }
    }
}

/// Lookup key for single-article queries
enum Key<'a> {
    Id(i64),
    Slug(&'a str),
}

const ARTICLE_COLUMNS: &str = "id, title, content, category, author, read_time, slug, created_at";
const FILE_COLUMNS: &str = "id, article_id, file_name, file_path, content_type";

/// Attach file rows to their articles, keeping file order
fn attach_files(articles: &mut [Article], files: Vec<ArticleFile>) {
    let mut by_article: HashMap<i64, Vec<ArticleFile>> = HashMap::new();
    for file in files {
        by_article.entry(file.article_id).or_default().push(file);
    }
    for article in articles.iter_mut() {
        article.files = by_article.remove(&article.id).unwrap_or_default();
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

async fn create_article_sqlite(
    pool: &SqlitePool,
    input: &CreateArticleInput,
    files: &[NewArticleFile],
) -> Result<Article> {
    let now = Utc::now();
    let mut tx = pool.begin().await?;

    let article_id = sqlx::query(
        r#"
        INSERT INTO articles (title, content, category, author, read_time, slug, created_at)
        VALUES (?, ?, ?, ?, ?, ?, ?)
        "#,
    )
    .bind(&input.title)
    .bind(&input.content)
    .bind(&input.category)
    .bind(&input.author)
    .bind(input.read_time)
    .bind(&input.slug)
    .bind(now)
    .execute(&mut *tx)
    .await
    .context("Failed to create article")?
    .last_insert_rowid();

    let files = insert_files_sqlite(&mut *tx, article_id, files).await?;
    tx.commit().await.context("Failed to commit article")?;

    Ok(Article {
        id: article_id,
        title: input.title.clone(),
        content: input.content.clone(),
        category: input.category.clone(),
        author: input.author.clone(),
        read_time: input.read_time,
        slug: input.slug.clone(),
        files,
        created_at: now,
    })
}

async fn get_article_sqlite(
    pool: &SqlitePool,
    filter: &str,
    key: Key<'_>,
) -> Result<Option<Article>> {
    let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE {filter}");
    let query = match key {
        Key::Id(id) => sqlx::query(&sql).bind(id),
        Key::Slug(slug) => sqlx::query(&sql).bind(slug),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get article")?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut article = row_to_article_sqlite(&row)?;

    let files = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM article_files WHERE article_id = ? ORDER BY id"
    ))
    .bind(article.id)
    .fetch_all(pool)
    .await
    .context("Failed to get article files")?;
    article.files = files
        .iter()
        .map(row_to_file_sqlite)
        .collect::<Result<_>>()?;

    Ok(Some(article))
}

async fn list_articles_sqlite(pool: &SqlitePool) -> Result<Vec<Article>> {
    let rows = sqlx::query(&format!(
        "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list articles")?;
    let mut articles = rows
        .iter()
        .map(row_to_article_sqlite)
        .collect::<Result<Vec<_>>>()?;

    let file_rows = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM article_files ORDER BY id"
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list article files")?;
    let files = file_rows
        .iter()
        .map(row_to_file_sqlite)
        .collect::<Result<Vec<_>>>()?;

    attach_files(&mut articles, files);
    Ok(articles)
}

async fn add_files_sqlite(
    pool: &SqlitePool,
    article_id: i64,
    files: &[NewArticleFile],
) -> Result<Vec<ArticleFile>> {
    let mut tx = pool.begin().await?;
    let stored = insert_files_sqlite(&mut *tx, article_id, files).await?;
    tx.commit().await?;
    Ok(stored)
}

async fn insert_files_sqlite(
    conn: &mut SqliteConnection,
    article_id: i64,
    files: &[NewArticleFile],
) -> Result<Vec<ArticleFile>> {
    let mut stored = Vec::with_capacity(files.len());

    for file in files {
        let result = sqlx::query(
            r#"
            INSERT INTO article_files (article_id, file_name, file_path, content_type)
            VALUES (?, ?, ?, ?)
            "#,
        )
        .bind(article_id)
        .bind(&file.file_name)
        .bind(&file.file_path)
        .bind(&file.content_type)
        .execute(&mut *conn)
        .await
        .context("Failed to add file to article")?;

        stored.push(ArticleFile {
            id: result.last_insert_rowid(),
            article_id,
            file_name: file.file_name.clone(),
            file_path: file.file_path.clone(),
            content_type: file.content_type.clone(),
        });
    }

    Ok(stored)
}

fn row_to_article_sqlite(row: &SqliteRow) -> Result<Article> {
    Ok(Article {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        category: row.try_get("category")?,
        author: row.try_get("author")?,
        read_time: row.try_get("read_time")?,
        slug: row.try_get("slug")?,
        files: Vec::new(),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_file_sqlite(row: &SqliteRow) -> Result<ArticleFile> {
    Ok(ArticleFile {
        id: row.try_get("id")?,
        article_id: row.try_get("article_id")?,
        file_name: row.try_get("file_name")?,
        file_path: row.try_get("file_path")?,
        content_type: row.try_get("content_type")?,
    })
}

// ============================================================================
// PostgreSQL implementations
// ============================================================================

async fn create_article_postgres(
    pool: &PgPool,
    input: &CreateArticleInput,
    files: &[NewArticleFile],
) -> Result<Article> {
    let mut tx = pool.begin().await?;

    let row = sqlx::query(&format!(
        r#"
        INSERT INTO articles (title, content, category, author, read_time, slug)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING {ARTICLE_COLUMNS}
        "#
    ))
    .bind(&input.title)
    .bind(&input.content)
    .bind(&input.category)
    .bind(&input.author)
    .bind(input.read_time)
    .bind(&input.slug)
    .fetch_one(&mut *tx)
    .await
    .context("Failed to create article")?;
    let mut article = row_to_article_postgres(&row)?;

    article.files = insert_files_postgres(&mut *tx, article.id, files).await?;
    tx.commit().await.context("Failed to commit article")?;
    Ok(article)
}

async fn get_article_postgres(
    pool: &PgPool,
    filter: &str,
    key: Key<'_>,
) -> Result<Option<Article>> {
    let sql = format!("SELECT {ARTICLE_COLUMNS} FROM articles WHERE {filter}");
    let query = match key {
        Key::Id(id) => sqlx::query(&sql).bind(id),
        Key::Slug(slug) => sqlx::query(&sql).bind(slug),
    };
    let row = query
        .fetch_optional(pool)
        .await
        .context("Failed to get article")?;

    let Some(row) = row else {
        return Ok(None);
    };
    let mut article = row_to_article_postgres(&row)?;

    let files = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM article_files WHERE article_id = $1 ORDER BY id"
    ))
    .bind(article.id)
    .fetch_all(pool)
    .await
    .context("Failed to get article files")?;
    article.files = files
        .iter()
        .map(row_to_file_postgres)
        .collect::<Result<_>>()?;

    Ok(Some(article))
}

async fn list_articles_postgres(pool: &PgPool) -> Result<Vec<Article>> {
    let rows = sqlx::query(&format!(
        "SELECT {ARTICLE_COLUMNS} FROM articles ORDER BY created_at DESC, id DESC"
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list articles")?;
    let mut articles = rows
        .iter()
        .map(row_to_article_postgres)
        .collect::<Result<Vec<_>>>()?;

    let file_rows = sqlx::query(&format!(
        "SELECT {FILE_COLUMNS} FROM article_files ORDER BY id"
    ))
    .fetch_all(pool)
    .await
    .context("Failed to list article files")?;
    let files = file_rows
        .iter()
        .map(row_to_file_postgres)
        .collect::<Result<Vec<_>>>()?;

    attach_files(&mut articles, files);
    Ok(articles)
}

async fn add_files_postgres(
    pool: &PgPool,
    article_id: i64,
    files: &[NewArticleFile],
) -> Result<Vec<ArticleFile>> {
    let mut tx = pool.begin().await?;
    let stored = insert_files_postgres(&mut *tx, article_id, files).await?;
    tx.commit().await?;
    Ok(stored)
}

async fn insert_files_postgres(
    conn: &mut PgConnection,
    article_id: i64,
    files: &[NewArticleFile],
) -> Result<Vec<ArticleFile>> {
    let mut stored = Vec::with_capacity(files.len());

    for file in files {
        let row = sqlx::query(&format!(
            r#"
            INSERT INTO article_files (article_id, file_name, file_path, content_type)
            VALUES ($1, $2, $3, $4)
            RETURNING {FILE_COLUMNS}
            "#
        ))
        .bind(article_id)
        .bind(&file.file_name)
        .bind(&file.file_path)
        .bind(&file.content_type)
        .fetch_one(&mut *conn)
        .await
        .context("Failed to add file to article")?;

        stored.push(row_to_file_postgres(&row)?);
    }

    Ok(stored)
}

fn row_to_article_postgres(row: &PgRow) -> Result<Article> {
    Ok(Article {
        id: row.try_get("id")?,
        title: row.try_get("title")?,
        content: row.try_get("content")?,
        category: row.try_get("category")?,
        author: row.try_get("author")?,
        read_time: row.try_get("read_time")?,
        slug: row.try_get("slug")?,
        files: Vec::new(),
        created_at: row.try_get("created_at")?,
    })
}

fn row_to_file_postgres(row: &PgRow) -> Result<ArticleFile> {
    Ok(ArticleFile {
        id: row.try_get("id")?,
        article_id: row.try_get("article_id")?,
        file_name: row.try_get("file_name")?,
        file_path: row.try_get("file_path")?,
        content_type: row.try_get("content_type")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::{create_test_pool, migrations};

    async fn setup_repo() -> SqlxArticleRepository {
        let pool = create_test_pool().await.expect("Failed to create pool");
        migrations::run_migrations(&pool)
            .await
            .expect("Failed to run migrations");
        SqlxArticleRepository::new(pool)
    }

    fn input(title: &str, slug: &str) -> CreateArticleInput {
        CreateArticleInput {
            title: title.to_string(),
            content: "body".to_string(),
            category: "АФК".to_string(),
            author: "Мария".to_string(),
            read_time: 5,
            slug: slug.to_string(),
        }
    }

    fn file(name: &str) -> NewArticleFile {
        NewArticleFile {
            file_name: name.to_string(),
            file_path: format!("/uploads/articles/1_{name}"),
            content_type: "application/pdf".to_string(),
        }
    }

    #[tokio::test]
    async fn test_create_and_get() {
        let repo = setup_repo().await;
        let created = repo.create(&input("First", "first"), &[]).await.unwrap();

        let by_id = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(by_id.title, "First");
        assert_eq!(by_id.category, "АФК");
        assert_eq!(by_id.read_time, 5);
        assert!(by_id.files.is_empty());

        let by_slug = repo.get_by_slug("first").await.unwrap().unwrap();
        assert_eq!(by_slug.id, created.id);
        assert!(repo.get_by_slug("missing").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_files_are_attached_in_order() {
        let repo = setup_repo().await;
        let a = repo.create(&input("A", "a"), &[]).await.unwrap();
        let b = repo.create(&input("B", "b"), &[]).await.unwrap();

        let stored = repo
            .add_files(a.id, &[file("one.pdf"), file("two.pdf")])
            .await
            .unwrap();
        assert_eq!(stored.len(), 2);
        repo.add_files(b.id, &[file("three.pdf")]).await.unwrap();

        let a = repo.get_by_id(a.id).await.unwrap().unwrap();
        let names: Vec<_> = a.files.iter().map(|f| f.file_name.as_str()).collect();
        assert_eq!(names, vec!["one.pdf", "two.pdf"]);

        let listed = repo.list().await.unwrap();
        assert_eq!(listed.len(), 2);
        let listed_b = listed.iter().find(|x| x.id == b.id).unwrap();
        assert_eq!(listed_b.files.len(), 1);
    }

    #[tokio::test]
    async fn test_create_with_files_in_one_step() {
        let repo = setup_repo().await;
        let created = repo
            .create(&input("With", "with"), &[file("one.pdf"), file("two.pdf")])
            .await
            .unwrap();
        assert_eq!(created.files.len(), 2);
        assert!(created.files.iter().all(|f| f.article_id == created.id));

        let loaded = repo.get_by_id(created.id).await.unwrap().unwrap();
        assert_eq!(loaded.files, created.files);
    }

    #[tokio::test]
    async fn test_create_rolls_back_when_a_file_row_fails() {
        let repo = setup_repo().await;
        sqlx::query(
            "CREATE TRIGGER reject_second_file BEFORE INSERT ON article_files \
             WHEN NEW.file_name = 'bad.pdf' \
             BEGIN SELECT RAISE(ABORT, 'file rejected'); END",
        )
        .execute(repo.pool.sqlite().unwrap())
        .await
        .unwrap();

        let result = repo
            .create(&input("Half", "half"), &[file("good.pdf"), file("bad.pdf")])
            .await;
        assert!(result.is_err());
        assert!(repo.get_by_slug("half").await.unwrap().is_none());
        assert!(repo.list().await.unwrap().is_empty());

        // The slug is still free afterwards
        repo.create(&input("Half", "half"), &[file("good.pdf")])
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_update_and_delete_cascades_files() {
        let repo = setup_repo().await;
        let mut article = repo.create(&input("A", "a"), &[]).await.unwrap();
        repo.add_files(article.id, &[file("one.pdf")]).await.unwrap();

        article.title = "Renamed".to_string();
        assert!(repo.update(&article).await.unwrap());
        assert_eq!(
            repo.get_by_id(article.id).await.unwrap().unwrap().title,
            "Renamed"
        );

        assert!(repo.delete(article.id).await.unwrap());
        assert!(!repo.delete(article.id).await.unwrap());
        assert!(repo.get_by_id(article.id).await.unwrap().is_none());

        article.id = 999;
        assert!(!repo.update(&article).await.unwrap());
    }
}
