//! Per-user settings: notification channels, SMTP and S3 storage.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use std::collections::HashMap;
use uuid::Uuid;

/// Per-user settings row.
///
/// `smtp_password` and `s3_secret_key` are vault-encrypted at rest. The
/// public settings endpoint blanks them; `SettingsService::get_internal`
/// returns them decrypted for in-process consumers only.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct UserSettings {
    pub id: Uuid,
    pub user_id: Uuid,
    pub notify_dashboard: bool,
    pub notify_email: bool,
    pub notify_webhook: bool,
    pub webhook_url: Option<String>,
    pub email: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i64>,
    pub smtp_username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub smtp_password: Option<String>,
    pub s3_enabled: bool,
    pub s3_endpoint: Option<String>,
    pub s3_region: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_access_key: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_secret_key: Option<String>,
    pub s3_use_ssl: bool,
    pub s3_path_prefix: Option<String>,
    pub s3_purge_local: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Fields currently forced by environment variables (read-only in the UI).
    #[sqlx(skip)]
    #[serde(skip_serializing_if = "HashMap::is_empty", default)]
    pub env_configured: HashMap<String, bool>,
}

/// Partial settings update; absent fields are left unchanged.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct UpdateSettingsRequest {
    pub notify_dashboard: Option<bool>,
    pub notify_email: Option<bool>,
    pub notify_webhook: Option<bool>,
    pub webhook_url: Option<String>,
    pub email: Option<String>,
    pub smtp_host: Option<String>,
    pub smtp_port: Option<i64>,
    pub smtp_username: Option<String>,
    pub smtp_password: Option<String>,
    pub s3_enabled: Option<bool>,
    pub s3_endpoint: Option<String>,
    pub s3_region: Option<String>,
    pub s3_bucket: Option<String>,
    pub s3_access_key: Option<String>,
    pub s3_secret_key: Option<String>,
    pub s3_use_ssl: Option<bool>,
    pub s3_path_prefix: Option<String>,
    pub s3_purge_local: Option<bool>,
}
