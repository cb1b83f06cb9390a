//! User service
//!
//! - Sign up and sign in, both ending in a freshly issued access token
//! - Resolving an access token back to a stored user
//! - Admin listing and deletion
//! - Bootstrap administrator

use crate::db::repositories::UserRepository;
use crate::models::{CreateUserInput, User, UserRole};
use crate::services::password::{hash_password, verify_dummy, verify_password};
use crate::services::token::TokenService;
use anyhow::Context;
use std::sync::Arc;

const MAX_USERNAME_LENGTH: usize = 100;

/// Error types for user service operations
#[derive(Debug, thiserror::Error)]
pub enum UserServiceError {
    /// Credentials or token rejected
    #[error("Authentication failed: {0}")]
    AuthenticationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("User already exists: {0}")]
    UserExists(String),

    #[error("User not found: {0}")]
    NotFound(i64),

    #[error("Internal error: {0}")]
    InternalError(#[from] anyhow::Error),
}

/// Credentials for sign up and sign in
#[derive(Debug, Clone, serde::Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

/// A signed-in user and their access token
#[derive(Debug, Clone)]
pub struct AuthSession {
    pub user: User,
    pub token: String,
}

/// User service for accounts and authentication
pub struct UserService {
    user_repo: Arc<dyn UserRepository>,
    tokens: Arc<TokenService>,
}

impl UserService {
    pub fn new(user_repo: Arc<dyn UserRepository>, tokens: Arc<TokenService>) -> Self {
        Self { user_repo, tokens }
    }

    /// Token lifetime in seconds, for the cookie Max-Age
    pub fn token_ttl_seconds(&self) -> i64 {
        self.tokens.ttl().num_seconds()
    }

    /// Register a new ordinary user and sign them in.
    ///
    /// # Errors
    ///
    /// - `ValidationError` if username or password is empty
    /// - `UserExists` if the username is taken, whatever the password
    pub async fn sign_up(&self, input: Credentials) -> Result<AuthSession, UserServiceError> {
        let username = validate_credentials(&input)?;

        if self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to check username")?
            .is_some()
        {
            return Err(user_exists(&username));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;

        let created = self
            .user_repo
            .create(&CreateUserInput {
                username: username.clone(),
                password_hash,
                role: UserRole::User,
            })
            .await;

        let user = match created {
            Ok(user) => user,
            // Lost a race against a concurrent sign up for the same name
            Err(e) => {
                if self.user_repo.get_by_username(&username).await?.is_some() {
                    return Err(user_exists(&username));
                }
                return Err(e.context("Failed to create user").into());
            }
        };

        tracing::info!(user_id = user.id, "user signed up");
        self.open_session(user)
    }

    /// Check credentials and issue a token.
    ///
    /// Unknown usernames and wrong passwords produce the same error.
    pub async fn sign_in(&self, input: Credentials) -> Result<AuthSession, UserServiceError> {
        let username = validate_credentials(&input)?;

        let Some(user) = self
            .user_repo
            .get_by_username(&username)
            .await
            .context("Failed to load user")?
        else {
            verify_dummy(&input.password);
            return Err(invalid_credentials());
        };

        if !verify_password(&input.password, &user.password_hash)
            .context("Failed to verify password")?
        {
            return Err(invalid_credentials());
        }

        tracing::debug!(user_id = user.id, "user signed in");
        self.open_session(user)
    }

    /// Resolve an access token to the current state of its user
    pub async fn authenticate(&self, token: &str) -> Result<User, UserServiceError> {
        let claims = self
            .tokens
            .verify(token)
            .map_err(|e| UserServiceError::AuthenticationError(e.to_string()))?;

        self.user_repo
            .get_by_id(claims.user_id)
            .await
            .context("Failed to load user")?
            .ok_or_else(|| UserServiceError::AuthenticationError("User no longer exists".into()))
    }

    pub async fn get_by_id(&self, id: i64) -> Result<User, UserServiceError> {
        self.user_repo
            .get_by_id(id)
            .await
            .context("Failed to load user")?
            .ok_or(UserServiceError::NotFound(id))
    }

    pub async fn list(&self) -> Result<Vec<User>, UserServiceError> {
        Ok(self.user_repo.list().await.context("Failed to list users")?)
    }

    pub async fn delete(&self, id: i64) -> Result<(), UserServiceError> {
        if !self
            .user_repo
            .delete(id)
            .await
            .context("Failed to delete user")?
        {
            return Err(UserServiceError::NotFound(id));
        }
        tracing::info!(user_id = id, "user deleted");
        Ok(())
    }

    /// Create the configured administrator unless an admin already exists.
    ///
    /// Returns true when an account was created.
    pub async fn ensure_admin(&self, input: Credentials) -> Result<bool, UserServiceError> {
        if self.user_repo.has_admin().await.context("Failed to check admins")? {
            return Ok(false);
        }

        let username = validate_credentials(&input)?;
        if self.user_repo.get_by_username(&username).await?.is_some() {
            return Err(user_exists(&username));
        }

        let password_hash = hash_password(&input.password).context("Failed to hash password")?;
        let admin = self
            .user_repo
            .create(&CreateUserInput {
                username,
                password_hash,
                role: UserRole::Admin,
            })
            .await
            .context("Failed to create admin")?;

        tracing::info!(user_id = admin.id, username = %admin.username, "bootstrap admin created");
        Ok(true)
    }

    fn open_session(&self, user: User) -> Result<AuthSession, UserServiceError> {
        let token = self
            .tokens
            .issue(&user)
            .map_err(|e| anyhow::anyhow!("Failed to issue token: {}", e))?;
        Ok(AuthSession { user, token })
    }
}

fn validate_credentials(input: &Credentials) -> Result<String, UserServiceError> {
    let username = input.username.trim();
    if username.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Username is required".to_string(),
        ));
    }
    if username.chars().count() > MAX_USERNAME_LENGTH {
        return Err(UserServiceError::ValidationError(format!(
            "Username must be at most {} characters",
            MAX_USERNAME_LENGTH
        )));
    }
    if input.password.is_empty() {
        return Err(UserServiceError::ValidationError(
            "Password is required".to_string(),
        ));
    }
    Ok(username.to_string())
}

fn user_exists(username: &str) -> UserServiceError {
    UserServiceError::UserExists(format!("Username '{}' is already taken", username))
}

fn invalid_credentials() -> UserServiceError {
    UserServiceError::AuthenticationError("Invalid username or password".to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::repositories::SqlxUserRepository;
    use crate::db::{create_test_pool, migrations};

    async fn setup_service() -> UserService {
        let pool = create_test_pool().await.unwrap();
        migrations::run_migrations(&pool).await.unwrap();
        UserService::new(
            SqlxUserRepository::boxed(pool),
            Arc::new(TokenService::new("test-secret")),
        )
    }

    #[tokio::test]
    async fn test_sign_up_issues_token_for_new_user() {
        let service = setup_service().await;
        let session = service.sign_up(Credentials::new("a", "p")).await.unwrap();

        assert_eq!(session.user.username, "a");
        assert_eq!(session.user.role, UserRole::User);
        assert!(session.user.course_ids.is_empty());

        let user = service.authenticate(&session.token).await.unwrap();
        assert_eq!(user.id, session.user.id);
    }

    #[tokio::test]
    async fn test_second_sign_up_with_same_name_fails() {
        let service = setup_service().await;
        service.sign_up(Credentials::new("a", "p")).await.unwrap();

        let err = service.sign_up(Credentials::new("a", "p2")).await.unwrap_err();
        assert!(matches!(err, UserServiceError::UserExists(_)));
    }

    #[tokio::test]
    async fn test_sign_in_only_with_original_password() {
        let service = setup_service().await;
        service.sign_up(Credentials::new("a", "p")).await.unwrap();

        let err = service.sign_in(Credentials::new("a", "p2")).await.unwrap_err();
        assert!(matches!(err, UserServiceError::AuthenticationError(_)));

        let session = service.sign_in(Credentials::new("a", "p")).await.unwrap();
        assert_eq!(session.user.username, "a");
    }

    #[tokio::test]
    async fn test_unknown_user_gets_same_error_as_wrong_password() {
        let service = setup_service().await;
        service.sign_up(Credentials::new("a", "p")).await.unwrap();

        let unknown = service.sign_in(Credentials::new("ghost", "p")).await.unwrap_err();
        let wrong = service.sign_in(Credentials::new("a", "x")).await.unwrap_err();
        assert_eq!(unknown.to_string(), wrong.to_string());
    }

    #[tokio::test]
    async fn test_empty_credentials_rejected() {
        let service = setup_service().await;
        for (u, p) in [("", "p"), ("   ", "p"), ("a", "")] {
            let err = service.sign_up(Credentials::new(u, p)).await.unwrap_err();
            assert!(matches!(err, UserServiceError::ValidationError(_)));
        }
    }

    #[tokio::test]
    async fn test_token_of_deleted_user_is_rejected() {
        let service = setup_service().await;
        let session = service.sign_up(Credentials::new("a", "p")).await.unwrap();

        service.delete(session.user.id).await.unwrap();
        let err = service.authenticate(&session.token).await.unwrap_err();
        assert!(matches!(err, UserServiceError::AuthenticationError(_)));

        assert!(matches!(
            service.delete(session.user.id).await,
            Err(UserServiceError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_ensure_admin_runs_once() {
        let service = setup_service().await;
        assert!(service.ensure_admin(Credentials::new("root", "toor")).await.unwrap());
        assert!(!service.ensure_admin(Credentials::new("root2", "toor")).await.unwrap());

        let users = service.list().await.unwrap();
        assert_eq!(users.len(), 1);
        assert!(users[0].is_admin());

        let session = service.sign_in(Credentials::new("root", "toor")).await.unwrap();
        assert!(session.user.is_admin());
    }
}
