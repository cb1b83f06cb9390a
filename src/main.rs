//! Bala - backend for an early-childhood education platform

use anyhow::{Context, Result};
use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use bala::{
    api::{self, AppState},
    config::{Config, Environment},
    db::{
        self,
        repositories::{
            SqlxArticleRepository, SqlxChecklistRepository, SqlxCourseRepository,
            SqlxUserRepository,
        },
    },
    services::{
        ArticleService, ChecklistService, CourseService, Credentials, TokenService, UploadStore,
        UserService,
    },
};

#[tokio::main]
async fn main() -> Result<()> {
    // Load configuration
    let config_path = Config::path_from_env();
    let config = Config::load_with_env(&config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;

    init_tracing(config.env);
    tracing::info!(env = ?config.env, config = %config_path.display(), "Starting Bala...");

    // Initialize database
    let pool = db::create_pool(&config.database).await?;
    tracing::info!("Database connected: {:?}", config.database.driver);

    // Run migrations
    let applied = db::migrations::run_migrations(&pool).await?;
    tracing::info!(applied, "Database migrations completed");

    // Repositories
    let user_repo = SqlxUserRepository::boxed(pool.clone());
    let article_repo = SqlxArticleRepository::boxed(pool.clone());
    let checklist_repo = SqlxChecklistRepository::boxed(pool.clone());
    let course_repo = SqlxCourseRepository::boxed(pool.clone());

    // Services
    let uploads = Arc::new(UploadStore::new(&config.upload));
    let tokens = Arc::new(TokenService::new(&config.jwt_secret));
    let user_service = Arc::new(UserService::new(user_repo.clone(), tokens));

    if let Some(admin) = &config.admin {
        let created = user_service
            .ensure_admin(Credentials::new(&admin.username, &admin.password))
            .await
            .context("Failed to create the bootstrap admin")?;
        if !created {
            tracing::debug!("An admin already exists, skipping bootstrap");
        }
    }

    let state = AppState {
        pool: pool.clone(),
        user_service,
        article_service: Arc::new(ArticleService::new(article_repo, uploads.clone())),
        checklist_service: Arc::new(ChecklistService::new(checklist_repo)),
        course_service: Arc::new(CourseService::new(course_repo, user_repo, uploads.clone())),
        uploads,
        secure_cookies: config.env.is_prod(),
    };

    let app = api::build_router(state, &config)?;

    let addr = format!("{}:{}", config.server.host, config.server.port);
    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    tracing::info!("Server listening on http://{}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    pool.close().await;
    tracing::info!("Server stopped");
    Ok(())
}

/// Human readable logs in development, JSON lines in production.
/// `RUST_LOG` overrides the default filter.
fn init_tracing(env: Environment) {
    let default_filter = match env {
        Environment::Dev => "bala=debug,tower_http=debug",
        Environment::Prod => "bala=info,tower_http=info",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter.into());

    let registry = tracing_subscriber::registry().with(filter);
    match env {
        Environment::Dev => registry.with(tracing_subscriber::fmt::layer()).init(),
        Environment::Prod => registry
            .with(tracing_subscriber::fmt::layer().json())
            .init(),
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!("Failed to listen for Ctrl+C: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(e) => {
                tracing::error!("Failed to listen for SIGTERM: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }

    tracing::info!("Shutdown signal received");
}
