//! User repository
//!
//! - `UserRepository` trait defining user data access
//! - `SqlxUserRepository` implementing it for SQLite and PostgreSQL
//!
//! The course grant list is a `BIGINT[]` on PostgreSQL, updated in place with
//! `array_append`/`array_remove`. SQLite stores it as a JSON array and
//! rewrites it inside a transaction.

use crate::config::DatabaseDriver;
use crate::db::DynDatabasePool;
use crate::models::{CreateUserInput, User, UserRole};
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use sqlx::{postgres::PgRow, sqlite::SqliteRow, PgPool, Row, SqlitePool};
use std::str::FromStr;
use std::sync::Arc;

/// User repository trait
#[async_trait]
pub trait UserRepository: Send + Sync {
    /// Insert a new user
    async fn create(&self, input: &CreateUserInput) -> Result<User>;

    async fn get_by_id(&self, id: i64) -> Result<Option<User>>;

    async fn get_by_username(&self, username: &str) -> Result<Option<User>>;

    /// All users ordered by ID
    async fn list(&self) -> Result<Vec<User>>;

    /// Delete a user, returns false if there was no such user
    async fn delete(&self, id: i64) -> Result<bool>;

    /// Whether at least one admin account exists
    async fn has_admin(&self) -> Result<bool>;

    /// Add a course to the user's grant list.
    ///
    /// Returns true when the list changed. A course already present is left alone.
    async fn grant_course(&self, user_id: i64, course_id: i64) -> Result<bool>;

    /// Remove a course from the user's grant list, returns true when the list changed
    async fn revoke_course(&self, user_id: i64, course_id: i64) -> Result<bool>;
}

/// SQLx-based user repository implementation
pub struct SqlxUserRepository {
    pool: DynDatabasePool,
}

impl SqlxUserRepository {
    pub fn new(pool: DynDatabasePool) -> Self {
        Self { pool }
    }

    /// Create a boxed repository for use with dependency injection
    pub fn boxed(pool: DynDatabasePool) -> Arc<dyn UserRepository> {
        Arc::new(Self::new(pool))
    }
}

#[async_trait]
impl UserRepository for SqlxUserRepository {
    async fn create(&self, input: &CreateUserInput) -> Result<User> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => create_user_sqlite(self.pool.sqlite()?, input).await,
            DatabaseDriver::Postgres => create_user_postgres(self.pool.postgres()?, input).await,
        }
    }

    async fn get_by_id(&self, id: i64) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => get_user_by_id_sqlite(self.pool.sqlite()?, id).await,
            DatabaseDriver::Postgres => get_user_by_id_postgres(self.pool.postgres()?, id).await,
        }
    }

    async fn get_by_username(&self, username: &str) -> Result<Option<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                get_user_by_username_sqlite(self.pool.sqlite()?, username).await
            }
            DatabaseDriver::Postgres => {
                get_user_by_username_postgres(self.pool.postgres()?, username).await
            }
        }
    }

    async fn list(&self) -> Result<Vec<User>> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => list_users_sqlite(self.pool.sqlite()?).await,
            DatabaseDriver::Postgres => list_users_postgres(self.pool.postgres()?).await,
        }
    }

    async fn delete(&self, id: i64) -> Result<bool> {
        let affected = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query("DELETE FROM users WHERE id = ?")
                .bind(id)
                .execute(self.pool.sqlite()?)
                .await
                .context("Failed to delete user")?
                .rows_affected(),
            DatabaseDriver::Postgres => sqlx::query("DELETE FROM users WHERE id = $1")
                .bind(id)
                .execute(self.pool.postgres()?)
                .await
                .context("Failed to delete user")?
                .rows_affected(),
        };
        Ok(affected > 0)
    }

    async fn has_admin(&self) -> Result<bool> {
        let sql = "SELECT COUNT(*) FROM users WHERE role = 'admin'";
        let count: i64 = match self.pool.driver() {
            DatabaseDriver::Sqlite => sqlx::query_scalar(sql)
                .fetch_one(self.pool.sqlite()?)
                .await
                .context("Failed to count admins")?,
            DatabaseDriver::Postgres => sqlx::query_scalar(sql)
                .fetch_one(self.pool.postgres()?)
                .await
                .context("Failed to count admins")?,
        };
        Ok(count > 0)
    }

    async fn grant_course(&self, user_id: i64, course_id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                rewrite_course_ids_sqlite(self.pool.sqlite()?, user_id, |ids| {
                    if ids.contains(&course_id) {
                        false
                    } else {
                        ids.push(course_id);
                        true
                    }
                })
                .await
            }
            DatabaseDriver::Postgres => {
                let result = sqlx::query(
                    r#"
                    UPDATE users SET course_ids = array_append(course_ids, $1)
                    WHERE id = $2 AND NOT ($1 = ANY(course_ids))
                    "#,
                )
                .bind(course_id)
                .bind(user_id)
                .execute(self.pool.postgres()?)
                .await
                .context("Failed to grant course access")?;
                Ok(result.rows_affected() > 0)
            }
        }
    }

    async fn revoke_course(&self, user_id: i64, course_id: i64) -> Result<bool> {
        match self.pool.driver() {
            DatabaseDriver::Sqlite => {
                rewrite_course_ids_sqlite(self.pool.sqlite()?, user_id, |ids| {
                    let before = ids.len();
                    ids.retain(|id| *id != course_id);
                    ids.len() != before
                })
                .await
            }
            DatabaseDriver::Postgres => {
                let result = sqlx::query(
                    r#"
                    UPDATE users SET course_ids = array_remove(course_ids, $1)
                    WHERE id = $2 AND $1 = ANY(course_ids)
                    "#,
                )
                .bind(course_id)
                .bind(user_id)
                .execute(self.pool.postgres()?)
                .await
                .context("Failed to revoke course access")?;
                Ok(result.rows_affected() > 0)
            }
        }
    }
}

// ============================================================================
// SQLite implementations
// ============================================================================

const USER_COLUMNS: &str = "id, username, password_hash, role, course_ids, created_at";

async fn create_user_sqlite(pool: &SqlitePool, input: &CreateUserInput) -> Result<User> {
    let now = Utc::now();

    let result = sqlx::query(
        r#"
        INSERT INTO users (username, password_hash, role, course_ids, created_at)
        VALUES (?, ?, ?, '[]', ?)
        "#,
    )
    .bind(&input.username)
    .bind(&input.password_hash)
    .bind(input.role.to_string())
    .bind(now)
    .execute(pool)
    .await
    .context("Failed to create user")?;

    Ok(User {
        id: result.last_insert_rowid(),
        username: input.username.clone(),
        password_hash: input.password_hash.clone(),
        role: input.role,
        course_ids: Vec::new(),
        created_at: now,
    })
}

async fn get_user_by_id_sqlite(pool: &SqlitePool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn get_user_by_username_sqlite(pool: &SqlitePool, username: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by username")?;

    row.as_ref().map(row_to_user_sqlite).transpose()
}

async fn list_users_sqlite(pool: &SqlitePool) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    rows.iter().map(row_to_user_sqlite).collect()
}

/// Load the grant list, let `change` edit it, and write it back if it reports a change
async fn rewrite_course_ids_sqlite<F>(pool: &SqlitePool, user_id: i64, change: F) -> Result<bool>
where
    F: FnOnce(&mut Vec<i64>) -> bool + Send,
{
    let mut tx = pool.begin().await?;

    let raw: Option<String> = sqlx::query_scalar("SELECT course_ids FROM users WHERE id = ?")
        .bind(user_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to read course grants")?;

    let Some(raw) = raw else {
        return Ok(false);
    };

    let mut ids = parse_course_ids(&raw)?;
    if !change(&mut ids) {
        return Ok(false);
    }

    sqlx::query("UPDATE users SET course_ids = ? WHERE id = ?")
        .bind(serde_json::to_string(&ids)?)
        .bind(user_id)
        .execute(&mut *tx)
        .await
        .context("Failed to update course grants")?;

    tx.commit().await?;
    Ok(true)
}

fn parse_course_ids(raw: &str) -> Result<Vec<i64>> {
    serde_json::from_str(raw).with_context(|| format!("Malformed course_ids column: {raw}"))
}

fn row_to_user_sqlite(row: &SqliteRow) -> Result<User> {
    let role: String = row.try_get("role")?;
    let course_ids: String = row.try_get("course_ids")?;

    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        role: UserRole::from_str(&role)?,
        course_ids: parse_course_ids(&course_ids)?,
        created_at: row.try_get("created_at")?,
    })
}

// ============================================================================
// PostgreSQL implementations
// ============================================================================

async fn create_user_postgres(pool: &PgPool, input: &CreateUserInput) -> Result<User> {
    let row = sqlx::query(&format!(
        r#"
        INSERT INTO users (username, password_hash, role)
        VALUES ($1, $2, $3)
        RETURNING {USER_COLUMNS}
        "#
    ))
    .bind(&input.username)
    .bind(&input.password_hash)
    .bind(input.role.to_string())
    .fetch_one(pool)
    .await
    .context("Failed to create user")?;

    row_to_user_postgres(&row)
}

async fn get_user_by_id_postgres(pool: &PgPool, id: i64) -> Result<Option<User>> {
    let row = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = $1"))
        .bind(id)
        .fetch_optional(pool)
        .await
        .context("Failed to get user by ID")?;

    row.as_ref().map(row_to_user_postgres).transpose()
}

async fn get_user_by_username_postgres(pool: &PgPool, username: &str) -> Result<Option<User>> {
    let row = sqlx::query(&format!(
        "SELECT {USER_COLUMNS} FROM users WHERE username = $1"
    ))
    .bind(username)
    .fetch_optional(pool)
    .await
    .context("Failed to get user by username")?;

    row.as_ref().map(row_to_user_postgres).transpose()
}

async fn list_users_postgres(pool: &PgPool) -> Result<Vec<User>> {
    let rows = sqlx::query(&format!("SELECT {USER_COLUMNS} FROM users ORDER BY id"))
        .fetch_all(pool)
        .await
        .context("Failed to list users")?;

    rows.iter().map(row_to_user_postgres).collect()
}

fn row_to_user_postgres(row: &PgRow) -> Result<User> {
    let role: String = row.try_get("role")?;

    Ok(User {
        id: row.try_get("id")?,
        username: row.try_get("username")?,
        password_hash: row.try_get("password_hash")?,
        role: UserRole::from_str(&role)?,
        course_ids: row.try_get("course_ids")?,
        created_at: row.try_get("created_at")?,
    })
}
