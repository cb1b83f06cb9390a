//! Configuration management
//!
//! Configuration is read once at startup from a YAML file whose path comes
//! from the `CONFIG` environment variable (default `config.yml`), then
//! overridden by `BALA_*` environment variables. Missing values are filled
//! with defaults. The resulting value is passed to whoever needs it; nothing
//! here is global.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable holding the config file path
pub const CONFIG_PATH_ENV: &str = "CONFIG";

/// Config file used when `CONFIG` is not set
pub const DEFAULT_CONFIG_PATH: &str = "config.yml";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Deployment environment, selects the log format
    #[serde(default)]
    pub env: Environment,
    /// Secret used to sign access tokens
    #[serde(default)]
    pub jwt_secret: String,
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub upload: UploadConfig,
    /// Administrator created at startup when the users table has none
    #[serde(default)]
    pub admin: Option<AdminConfig>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            env: Environment::default(),
            jwt_secret: String::new(),
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            upload: UploadConfig::default(),
            admin: None,
        }
    }
}

/// Deployment environment
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Environment {
    #[default]
    Dev,
    Prod,
}

impl Environment {
    pub fn is_prod(&self) -> bool {
        matches!(self, Environment::Prod)
    }
}

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Host address to bind to
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to listen on
    #[serde(default = "default_port")]
    pub port: u16,
    /// CORS allowed origin (the cookie carries credentials)
    #[serde(default = "default_cors_origin")]
    pub cors_origin: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origin: default_cors_origin(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8080
}

fn default_cors_origin() -> String {
    "http://localhost:3000".to_string()
}

/// Database configuration
///
/// SQLite only reads `url`. PostgreSQL is configured through the discrete
/// connection parameters.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub driver: DatabaseDriver,
    /// SQLite database file or `:memory:`
    #[serde(default = "default_database_url")]
    pub url: String,
    #[serde(default = "default_db_host")]
    pub host: String,
    #[serde(default = "default_db_port")]
    pub port: u16,
    #[serde(default = "default_db_user")]
    pub user: String,
    #[serde(default)]
    pub password: String,
    #[serde(default = "default_db_name")]
    pub name: String,
    /// libpq style ssl mode: disable, prefer, require, verify-ca, verify-full
    #[serde(default = "default_sslmode")]
    pub sslmode: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: DatabaseDriver::default(),
            url: default_database_url(),
            host: default_db_host(),
            port: default_db_port(),
            user: default_db_user(),
            password: String::new(),
            name: default_db_name(),
            sslmode: default_sslmode(),
        }
    }
}

impl DatabaseConfig {
    /// In-memory SQLite, used by tests
    pub fn sqlite_memory() -> Self {
        Self {
            driver: DatabaseDriver::Sqlite,
            url: ":memory:".to_string(),
            ..Self::default()
        }
    }
}

fn default_database_url() -> String {
    "data/bala.db".to_string()
}

fn default_db_host() -> String {
    "localhost".to_string()
}

fn default_db_port() -> u16 {
    5432
}

fn default_db_user() -> String {
    "postgres".to_string()
}

fn default_db_name() -> String {
    "bala".to_string()
}

fn default_sslmode() -> String {
    "disable".to_string()
}

/// Database driver type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseDriver {
    /// SQLite (default)
    #[default]
    Sqlite,
    /// PostgreSQL
    Postgres,
}

/// Upload configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Upload directory path, also served under `/uploads`
    #[serde(default = "default_upload_path")]
    pub path: PathBuf,
    /// Maximum file size in bytes (default: 100MB)
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Accepted MIME types. Empty accepts everything.
    #[serde(default)]
    pub allowed_types: Vec<String>,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            path: default_upload_path(),
            max_file_size: default_max_file_size(),
            allowed_types: Vec::new(),
        }
    }
}

fn default_upload_path() -> PathBuf {
    PathBuf::from("uploads")
}

fn default_max_file_size() -> u64 {
    100 * 1024 * 1024 // 100MB
}

impl UploadConfig {
    /// Check if a MIME type is allowed
    pub fn is_type_allowed(&self, mime_type: &str) -> bool {
        self.allowed_types.is_empty() || self.allowed_types.iter().any(|t| t == mime_type)
    }
}

/// Bootstrap administrator credentials
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AdminConfig {
    pub username: String,
    pub password: String,
}

/// Error type for configuration parsing
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file '{path}': {source}")]
    FileRead {
        path: String,
        source: std::io::Error,
    },
    #[error("Failed to parse config file '{path}': {message}")]
    ParseError { path: String, message: String },
    #[error("Invalid configuration: {0}")]
    ValidationError(String),
}

impl Config {
    /// Resolve the config file path from the `CONFIG` environment variable
    pub fn path_from_env() -> PathBuf {
        std::env::var(CONFIG_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_PATH))
    }

    /// Load configuration from file
    ///
    /// A missing or empty file yields the defaults. Invalid YAML is an error
    /// carrying the line and column.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            source: e,
        })?;

        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        serde_yaml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.display().to_string(),
            message: format_yaml_error(&e),
        })
    }

    /// Load configuration from file with environment variable overrides
    ///
    /// Recognised variables:
    /// - BALA_ENV
    /// - BALA_JWT_SECRET
    /// - BALA_HOST, BALA_PORT, BALA_CORS_ORIGIN
    /// - BALA_DATABASE_DRIVER, BALA_DATABASE_URL
    /// - BALA_DB_HOST, BALA_DB_PORT, BALA_DB_USER, BALA_DB_PASSWORD, BALA_DB_NAME
    /// - BALA_UPLOAD_PATH
    pub fn load_with_env(path: &Path) -> Result<Self, ConfigError> {
        let mut config = Self::load(path)?;
        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(env) = std::env::var("BALA_ENV") {
            match env.to_lowercase().as_str() {
                "dev" => self.env = Environment::Dev,
                "prod" => self.env = Environment::Prod,
                _ => {}
            }
        }
        if let Ok(secret) = std::env::var("BALA_JWT_SECRET") {
            self.jwt_secret = secret;
        }

        if let Ok(host) = std::env::var("BALA_HOST") {
            self.server.host = host;
        }
        if let Ok(port) = std::env::var("BALA_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.server.port = port;
            }
        }
        if let Ok(cors_origin) = std::env::var("BALA_CORS_ORIGIN") {
            self.server.cors_origin = cors_origin;
        }

        if let Ok(driver) = std::env::var("BALA_DATABASE_DRIVER") {
            match driver.to_lowercase().as_str() {
                "sqlite" => self.database.driver = DatabaseDriver::Sqlite,
                "postgres" | "postgresql" => self.database.driver = DatabaseDriver::Postgres,
                _ => {}
            }
        }
        if let Ok(url) = std::env::var("BALA_DATABASE_URL") {
            self.database.url = url;
        }
        if let Ok(host) = std::env::var("BALA_DB_HOST") {
            self.database.host = host;
        }
        if let Ok(port) = std::env::var("BALA_DB_PORT") {
            if let Ok(port) = port.parse::<u16>() {
                self.database.port = port;
            }
        }
        if let Ok(user) = std::env::var("BALA_DB_USER") {
            self.database.user = user;
        }
        if let Ok(password) = std::env::var("BALA_DB_PASSWORD") {
            self.database.password = password;
        }
        if let Ok(name) = std::env::var("BALA_DB_NAME") {
            self.database.name = name;
        }

        if let Ok(path) = std::env::var("BALA_UPLOAD_PATH") {
            self.upload.path = PathBuf::from(path);
        }
    }

    /// Reject configurations the server cannot run with
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jwt_secret.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "jwt_secret must not be empty".to_string(),
            ));
        }
        if self.server.port == 0 {
            return Err(ConfigError::ValidationError(
                "server.port must be greater than 0".to_string(),
            ));
        }
        if self.upload.max_file_size == 0 {
            return Err(ConfigError::ValidationError(
                "upload.max_file_size must be greater than 0".to_string(),
            ));
        }
        if let Some(admin) = &self.admin {
            if admin.username.trim().is_empty() || admin.password.is_empty() {
                return Err(ConfigError::ValidationError(
                    "admin.username and admin.password must both be set".to_string(),
                ));
            }
        }
        Ok(())
    }
}

/// Format YAML parsing error with location and context
fn format_yaml_error(e: &serde_yaml::Error) -> String {
    if let Some(location) = e.location() {
        format!(
            "at line {}, column {}: {}",
            location.line(),
            location.column(),
            e
        )
    } else {
        e.to_string()
    }
}

// Shared by every test that touches process environment variables.
#[cfg(test)]
static CONFIG_ENV_MUTEX: std::sync::Mutex<()> = std::sync::Mutex::new(());
