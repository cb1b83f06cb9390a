//! Database migrations
//!
//! Migrations are embedded as SQL strings, one script per backend, and
//! recorded in the `_migrations` table once applied.
//!
//! ```ignore
//! use bala::db::{create_pool, migrations};
//!
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row, SqlitePool};

use super::DynDatabasePool;
use crate::config::DatabaseDriver;

/// A database migration with SQL for both SQLite and PostgreSQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for PostgreSQL
    pub up_postgres: &'static str,
}

/// Migration record stored in the database
#[derive(Debug, Clone)]
pub struct MigrationRecord {
    pub version: i32,
    pub name: String,
    pub applied_at: DateTime<Utc>,
}

/// All schema migrations, in order.
///
/// SQLite keeps `users.course_ids` as a JSON array in a TEXT column,
/// PostgreSQL uses a native `BIGINT[]`.
pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username VARCHAR(100) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                course_ids TEXT NOT NULL DEFAULT '[]',
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGSERIAL PRIMARY KEY,
                username VARCHAR(100) NOT NULL UNIQUE,
                password_hash VARCHAR(255) NOT NULL,
                role VARCHAR(20) NOT NULL DEFAULT 'user',
                course_ids BIGINT[] NOT NULL DEFAULT '{}',
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_articles",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS articles (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                category VARCHAR(100) NOT NULL DEFAULT '',
                author VARCHAR(255) NOT NULL DEFAULT '',
                read_time INTEGER NOT NULL DEFAULT 0,
                slug VARCHAR(255) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS article_files (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                article_id INTEGER NOT NULL,
                file_name VARCHAR(255) NOT NULL,
                file_path VARCHAR(500) NOT NULL,
                content_type VARCHAR(100) NOT NULL DEFAULT 'application/octet-stream',
                FOREIGN KEY (article_id) REFERENCES articles(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_article_files_article_id ON article_files(article_id);
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS articles (
                id BIGSERIAL PRIMARY KEY,
                title VARCHAR(255) NOT NULL,
                content TEXT NOT NULL,
                category VARCHAR(100) NOT NULL DEFAULT '',
                author VARCHAR(255) NOT NULL DEFAULT '',
                read_time INTEGER NOT NULL DEFAULT 0,
                slug VARCHAR(255) NOT NULL UNIQUE,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS article_files (
                id BIGSERIAL PRIMARY KEY,
                article_id BIGINT NOT NULL REFERENCES articles(id) ON DELETE CASCADE,
                file_name VARCHAR(255) NOT NULL,
                file_path VARCHAR(500) NOT NULL,
                content_type VARCHAR(100) NOT NULL DEFAULT 'application/octet-stream'
            );
            CREATE INDEX IF NOT EXISTS idx_article_files_article_id ON article_files(article_id);
        "#,
    },
    Migration {
        version: 3,
        name: "create_checklists",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS checklists (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                for_age INTEGER NOT NULL DEFAULT 0,
                slug VARCHAR(255) NOT NULL UNIQUE
            );
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS checklists (
                id BIGSERIAL PRIMARY KEY,
                title VARCHAR(255) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                for_age INTEGER NOT NULL DEFAULT 0,
                slug VARCHAR(255) NOT NULL UNIQUE
            );
        "#,
    },
    Migration {
        version: 4,
        name: "create_courses",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS courses (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                cost BIGINT NOT NULL DEFAULT 0,
                img VARCHAR(500),
                diploma_path VARCHAR(500),
                diploma_x INTEGER NOT NULL DEFAULT 0,
                diploma_y INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            CREATE TABLE IF NOT EXISTS videos (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL,
                title VARCHAR(255) NOT NULL,
                path VARCHAR(500) NOT NULL,
                file VARCHAR(500),
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_videos_course_id ON videos(course_id);
            CREATE TABLE IF NOT EXISTS webinars (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                course_id INTEGER NOT NULL,
                title VARCHAR(255) NOT NULL DEFAULT '',
                link VARCHAR(500) NOT NULL,
                date TIMESTAMP NOT NULL,
                FOREIGN KEY (course_id) REFERENCES courses(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_webinars_course_id ON webinars(course_id);
        "#,
        up_postgres: r#"
            CREATE TABLE IF NOT EXISTS courses (
                id BIGSERIAL PRIMARY KEY,
                title VARCHAR(255) NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                cost BIGINT NOT NULL DEFAULT 0,
                img VARCHAR(500),
                diploma_path VARCHAR(500),
                diploma_x INTEGER NOT NULL DEFAULT 0,
                diploma_y INTEGER NOT NULL DEFAULT 0,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            );
            CREATE TABLE IF NOT EXISTS videos (
                id BIGSERIAL PRIMARY KEY,
                course_id BIGINT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                title VARCHAR(255) NOT NULL,
                path VARCHAR(500) NOT NULL,
                file VARCHAR(500)
            );
            CREATE INDEX IF NOT EXISTS idx_videos_course_id ON videos(course_id);
            CREATE TABLE IF NOT EXISTS webinars (
                id BIGSERIAL PRIMARY KEY,
                course_id BIGINT NOT NULL REFERENCES courses(id) ON DELETE CASCADE,
                title VARCHAR(255) NOT NULL DEFAULT '',
                link VARCHAR(500) NOT NULL,
                date TIMESTAMPTZ NOT NULL
            );
            CREATE INDEX IF NOT EXISTS idx_webinars_course_id ON webinars(course_id);
        "#,
    },
];

/// Run all pending migrations, returning how many were applied
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_migrations(pool).await?;
    let applied_versions: Vec<i32> = applied.iter().map(|m| m.version).collect();

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied_versions.contains(&migration.version) {
            tracing::info!(
                "Applying migration {}: {}",
                migration.version,
                migration.name
            );
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.driver() {
        DatabaseDriver::Sqlite => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        DatabaseDriver::Postgres => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_migrations(pool: &DynDatabasePool) -> Result<Vec<MigrationRecord>> {
    match pool.driver() {
        DatabaseDriver::Sqlite => get_applied_migrations_sqlite(pool.sqlite()?).await,
        DatabaseDriver::Postgres => get_applied_migrations_postgres(pool.postgres()?).await,
    }
}

async fn get_applied_migrations_sqlite(pool: &SqlitePool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn get_applied_migrations_postgres(pool: &PgPool) -> Result<Vec<MigrationRecord>> {
    let rows = sqlx::query("SELECT version, name, applied_at FROM _migrations ORDER BY version")
        .fetch_all(pool)
        .await
        .context("Failed to read applied migrations")?;

    Ok(rows
        .iter()
        .map(|row| MigrationRecord {
            version: row.get("version"),
            name: row.get("name"),
            applied_at: row.get("applied_at"),
        })
        .collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.driver() {
        DatabaseDriver::Sqlite => apply_migration_sqlite(pool.sqlite()?, migration).await,
        DatabaseDriver::Postgres => apply_migration_postgres(pool.postgres()?, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;

    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

async fn apply_migration_postgres(pool: &PgPool, migration: &Migration) -> Result<()> {
    let mut tx = pool.begin().await?;

    for statement in split_sql_statements(migration.up_postgres) {
        sqlx::query(statement)
            .execute(&mut *tx)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES ($1, $2)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(&mut *tx)
        .await?;

    tx.commit().await?;
    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split a script into statements, dropping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines()
        .map(str::trim)
        .all(|line| line.is_empty() || line.starts_with("--"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    #[tokio::test]
    async fn test_run_migrations_is_idempotent() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, MIGRATIONS.len());

        let count = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(count, 0);
    }

    async fn pending_count(pool: &DynDatabasePool) -> usize {
        create_migrations_table(pool).await.unwrap();
        let applied = get_applied_migrations(pool).await.unwrap();
        MIGRATIONS.len().saturating_sub(applied.len())
    }

    #[tokio::test]
    async fn test_pending_count() {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        assert_eq!(pending_count(&pool).await, MIGRATIONS.len());

        run_migrations(&pool).await.unwrap();
        assert_eq!(pending_count(&pool).await, 0);
    }

    #[tokio::test]
    async fn test_users_default_grant_list_is_empty() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let sqlite = pool.sqlite().unwrap();

        sqlx::query("INSERT INTO users (username, password_hash) VALUES ('u', 'h')")
            .execute(sqlite)
            .await
            .unwrap();

        let row = sqlx::query("SELECT role, course_ids FROM users WHERE username = 'u'")
            .fetch_one(sqlite)
            .await
            .unwrap();
        assert_eq!(row.get::<String, _>("role"), "user");
        assert_eq!(row.get::<String, _>("course_ids"), "[]");
    }

    #[tokio::test]
    async fn test_course_delete_cascades_to_videos_and_webinars() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let sqlite = pool.sqlite().unwrap();

        sqlx::query("INSERT INTO courses (id, title) VALUES (1, 'c')")
            .execute(sqlite)
            .await
            .unwrap();
        sqlx::query("INSERT INTO videos (course_id, title, path) VALUES (1, 'v', '/uploads/videos/v.mp4')")
            .execute(sqlite)
            .await
            .unwrap();
        sqlx::query("INSERT INTO webinars (course_id, link, date) VALUES (1, 'https://meet', '2025-01-01 10:00:00')")
            .execute(sqlite)
            .await
            .unwrap();

        sqlx::query("DELETE FROM courses WHERE id = 1")
            .execute(sqlite)
            .await
            .unwrap();

        let videos: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM videos")
            .fetch_one(sqlite)
            .await
            .unwrap();
        let webinars: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM webinars")
            .fetch_one(sqlite)
            .await
            .unwrap();
        assert_eq!(videos, 0);
        assert_eq!(webinars, 0);
    }

    #[tokio::test]
    async fn test_unique_slugs() {
        let pool = create_test_pool().await.unwrap();
        run_migrations(&pool).await.unwrap();
        let sqlite = pool.sqlite().unwrap();

        let insert = "INSERT INTO checklists (title, slug) VALUES ('t', 'same')";
        sqlx::query(insert).execute(sqlite).await.unwrap();
        assert!(sqlx::query(insert).execute(sqlite).await.is_err());
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- only a comment\n;\nCREATE INDEX i ON a(id);";
        let statements = split_sql_statements(sql);
        assert_eq!(statements.len(), 2);
        assert!(statements[0].starts_with("CREATE TABLE"));
        assert!(statements[1].starts_with("CREATE INDEX"));
    }

    #[test]
    fn test_every_migration_has_both_scripts() {
        for (i, migration) in MIGRATIONS.iter().enumerate() {
            assert_eq!(migration.version as usize, i + 1);
            assert!(!split_sql_statements(migration.up_sqlite).is_empty());
            assert_eq!(
                split_sql_statements(migration.up_sqlite).len(),
                split_sql_statements(migration.up_postgres).len(),
                "{} differs between backends",
                migration.name
            );
        }
    }
}
