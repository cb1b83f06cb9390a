//! Database layer
//!
//! Two backends sit behind the `DatabasePool` trait:
//! - SQLite (default, also used by the test suite)
//! - PostgreSQL (production deployments)
//!
//! The driver is selected by `database.driver` in the configuration.
//! Repositories in [`repositories`] dispatch on the driver and keep one
//! query function per backend.
//!
//! # Usage
//!
//! ```ignore
//! use bala::config::DatabaseConfig;
//! use bala::db::{create_pool, migrations};
//!
//! let pool = create_pool(&DatabaseConfig::default()).await?;
//! migrations::run_migrations(&pool).await?;
//! pool.ping().await?;
//! ```

pub mod migrations;
pub mod pool;
pub mod repositories;

pub use pool::{
    create_pool, create_test_pool, DatabasePool, DynDatabasePool, PostgresDatabase,
    SqliteDatabase,
};
