//! Application configuration loaded from environment variables.

use crate::error::{AppError, Result};
use std::env;

/// Read an environment variable and parse it, falling back to a default on missing or invalid values.
fn env_parse<T: std::str::FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// SQLite database file path
    pub database_path: String,

    /// Server bind address (host:port)
    pub bind_address: String,

    /// Root directory for local dump spool files
    pub backup_dir: String,

    /// Symmetric key for the credential vault (hashed to 256 bits)
    pub encryption_key: String,

    /// JWT secret key for signing tokens
    pub jwt_secret: String,

    /// JWT access token expiry in hours
    pub jwt_expiry_hours: i64,

    /// Whether self-service registration is open
    pub allow_signup: bool,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_path: env::var("DATABASE_PATH").unwrap_or_else(|_| "data/velld.db".into()),
            bind_address: env::var("BIND_ADDRESS").unwrap_or_else(|_| "0.0.0.0:8080".into()),
            backup_dir: env::var("BACKUP_DIR").unwrap_or_else(|_| "./backups".into()),
            encryption_key: env::var("ENCRYPTION_KEY")
                .map_err(|_| AppError::Config("ENCRYPTION_KEY not set".into()))?,
            jwt_secret: env::var("JWT_SECRET")
                .map_err(|_| AppError::Config("JWT_SECRET not set".into()))?,
            jwt_expiry_hours: env_parse("JWT_EXPIRY_HOURS", 24),
            allow_signup: !matches!(env::var("ALLOW_SIGNUP").as_deref(), Ok("false" | "0")),
        })
    }
}
