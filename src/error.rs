//! Application error types and result alias.

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

/// Application result type alias
pub type Result<T> = std::result::Result<T, AppError>;

/// Application error types.
#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    /// Missing credentials
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Invalid 6-field cron expression (sec min hour dom mon dow)
    #[error("Invalid cron expression: {0}")]
    BadCron(String),

    /// Required dump/restore binary not found on PATH
    #[error("{tool} not found for {engine}. Ensure {tool} is installed and available in PATH")]
    ToolMissing { engine: String, tool: String },

    #[error("Dump failed for {engine}: {stderr}")]
    DumpFailed { engine: String, stderr: String },

    #[error("Restore failed for {engine}: {detail}")]
    RestoreFailed { engine: String, detail: String },

    /// PostgreSQL restore hit "already exists" errors in the target
    #[error("Restore failed: target database must be empty. See documentation for restore best practices")]
    RestoreTargetNotEmpty,

    #[error("SSH tunnel setup failed: {0}")]
    Tunnel(String),

    /// S3 is enabled but a required field is missing; only surfaced at
    /// upload/rehydrate time, never at settings-save time.
    #[error("S3 configuration error: {0}")]
    S3Config(String),

    #[error("S3 transport error: {0}")]
    S3Transport(String),

    #[error("Backup file not found locally and no S3 object key available")]
    BackupMissing,

    #[error("Failed to decrypt stored credential")]
    Decrypt,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Address parse error: {0}")]
    AddrParse(#[from] std::net::AddrParseError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("JWT error: {0}")]
    Jwt(#[from] jsonwebtoken::errors::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl AppError {
    /// Map error variant to HTTP status code and machine-readable error code.
    fn status_and_code(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Config(_) => (StatusCode::INTERNAL_SERVER_ERROR, "CONFIG_ERROR"),
            Self::Database(_) | Self::Sqlx(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR")
            }
            Self::Migration(_) => (StatusCode::INTERNAL_SERVER_ERROR, "MIGRATION_ERROR"),
            Self::Authentication(_) => (StatusCode::UNAUTHORIZED, "AUTH_ERROR"),
            Self::Unauthorized(_) => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR"),
            Self::BadCron(_) => (StatusCode::BAD_REQUEST, "BAD_CRON"),
            Self::ToolMissing { .. } => (StatusCode::UNPROCESSABLE_ENTITY, "TOOL_MISSING"),
            Self::DumpFailed { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "DUMP_FAILED"),
            Self::RestoreFailed { .. } => (StatusCode::INTERNAL_SERVER_ERROR, "RESTORE_FAILED"),
            Self::RestoreTargetNotEmpty => (StatusCode::CONFLICT, "RESTORE_TARGET_NOT_EMPTY"),
            Self::Tunnel(_) => (StatusCode::BAD_GATEWAY, "TUNNEL_ERROR"),
            Self::S3Config(_) => (StatusCode::UNPROCESSABLE_ENTITY, "S3_CONFIG_ERROR"),
            Self::S3Transport(_) => (StatusCode::BAD_GATEWAY, "S3_TRANSPORT_ERROR"),
            Self::BackupMissing => (StatusCode::NOT_FOUND, "BACKUP_MISSING"),
            Self::Decrypt => (StatusCode::INTERNAL_SERVER_ERROR, "DECRYPT_ERROR"),
            Self::Io(_) => (StatusCode::INTERNAL_SERVER_ERROR, "IO_ERROR"),
            Self::AddrParse(_) => (StatusCode::INTERNAL_SERVER_ERROR, "ADDR_PARSE_ERROR"),
            Self::Json(_) => (StatusCode::BAD_REQUEST, "JSON_ERROR"),
            Self::Jwt(_) => (StatusCode::UNAUTHORIZED, "JWT_ERROR"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// Return a user-facing message. Internal details are hidden for
    /// wrapped foreign errors (Sqlx, Io, etc.) to avoid leaking internals.
    fn user_message(&self) -> String {
        match self {
            Self::Sqlx(_) => "Database operation failed".to_string(),
            Self::Migration(_) => "Database migration failed".to_string(),
            Self::Io(_) => "IO operation failed".to_string(),
            Self::AddrParse(_) => "Invalid address".to_string(),
            Self::Json(_) => "Invalid JSON".to_string(),
            Self::Jwt(_) => "Invalid token".to_string(),
            // All other variants carry their own user-facing message
            other => other.to_string(),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, code) = self.status_and_code();
        let message = self.user_message();

        tracing::error!(error = %self, code = code, "Request error");

        let body = Json(json!({
            "code": code,
            "message": message,
        }));

        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_missing_message_names_tool_and_engine() {
        let err = AppError::ToolMissing {
            engine: "postgresql".to_string(),
            tool: "pg_dump".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("pg_dump"));
        assert!(msg.contains("postgresql"));
    }

    #[test]
    fn test_sqlx_errors_do_not_leak_details() {
        let err = AppError::Sqlx(sqlx::Error::RowNotFound);
        assert_eq!(err.user_message(), "Database operation failed");
    }

    #[test]
    fn test_status_codes() {
        assert_eq!(
            AppError::BadCron("x".into()).status_and_code().0,
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            AppError::BackupMissing.status_and_code().0,
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            AppError::RestoreTargetNotEmpty.status_and_code().0,
            StatusCode::CONFLICT
        );
    }
}
