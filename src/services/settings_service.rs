//! Per-user settings.
//!
//! SMTP-related environment variables override persisted values; an
//! env-forced field is reported in `env_configured` and ignored on update.
//! The public getter blanks secrets; `get_internal` decrypts them for
//! in-process consumers (S3 mirror construction).

use chrono::Utc;
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::settings::{UpdateSettingsRequest, UserSettings};
use crate::services::encryption::EncryptionService;

#[derive(Clone)]
pub struct SettingsService {
    db: SqlitePool,
    vault: EncryptionService,
}

impl SettingsService {
    pub fn new(db: SqlitePool, vault: EncryptionService) -> Self {
        Self { db, vault }
    }

    /// Settings for API responses: env overrides applied, secrets blanked.
    pub async fn get(&self, user_id: Uuid) -> Result<UserSettings> {
        let mut settings = self.get_or_create(user_id).await?;
        apply_env_overrides(&mut settings);
        settings.smtp_password = None;
        settings.s3_secret_key = None;
        Ok(settings)
    }

    /// Settings for internal consumers: secret fields decrypted.
    pub async fn get_internal(&self, user_id: Uuid) -> Result<UserSettings> {
        let mut settings = self.get_or_create(user_id).await?;
        apply_env_overrides(&mut settings);

        if let Some(encrypted) = settings.smtp_password.take() {
            settings.smtp_password = Some(self.vault.decrypt(&encrypted)?);
        }
        if let Some(encrypted) = settings.s3_secret_key.take() {
            settings.s3_secret_key = Some(self.vault.decrypt(&encrypted)?);
        }

        Ok(settings)
    }

    pub async fn update(
        &self,
        user_id: Uuid,
        req: &UpdateSettingsRequest,
    ) -> Result<UserSettings> {
        let mut settings = self.get_or_create(user_id).await?;

        let env = EnvOverrides::read();

        if let Some(v) = req.notify_dashboard {
            settings.notify_dashboard = v;
        }
        if let Some(v) = req.notify_email {
            settings.notify_email = v;
        }
        if let Some(v) = req.notify_webhook {
            settings.notify_webhook = v;
        }
        if let Some(v) = &req.webhook_url {
            settings.webhook_url = Some(v.clone());
        }
        if let Some(v) = &req.email {
            if env.from.is_none() {
                settings.email = Some(v.clone());
            }
        }
        if let Some(v) = &req.smtp_host {
            if env.host.is_none() {
                settings.smtp_host = Some(v.clone());
            }
        }
        if let Some(v) = req.smtp_port {
            if env.port.is_none() {
                settings.smtp_port = Some(v);
            }
        }
        if let Some(v) = &req.smtp_username {
            if env.username.is_none() {
                settings.smtp_username = Some(v.clone());
            }
        }
        if let Some(v) = &req.smtp_password {
            if env.password.is_none() {
                settings.smtp_password = Some(self.vault.encrypt(v)?);
            }
        }

        if let Some(v) = req.s3_enabled {
            settings.s3_enabled = v;
        }
        if let Some(v) = &req.s3_endpoint {
            settings.s3_endpoint = Some(v.clone());
        }
        if let Some(v) = &req.s3_region {
            settings.s3_region = Some(v.clone());
        }
        if let Some(v) = &req.s3_bucket {
            settings.s3_bucket = Some(v.clone());
        }
        if let Some(v) = &req.s3_access_key {
            settings.s3_access_key = Some(v.clone());
        }
        if let Some(v) = &req.s3_secret_key {
            settings.s3_secret_key = Some(self.vault.encrypt(v)?);
        }
        if let Some(v) = req.s3_use_ssl {
            settings.s3_use_ssl = v;
        }
        if let Some(v) = &req.s3_path_prefix {
            settings.s3_path_prefix = Some(v.clone());
        }
        if let Some(v) = req.s3_purge_local {
            settings.s3_purge_local = v;
        }

        settings.updated_at = Utc::now();
        self.persist(&settings).await?;

        apply_env_overrides(&mut settings);
        settings.smtp_password = None;
        settings.s3_secret_key = None;
        Ok(settings)
    }

    async fn get_or_create(&self, user_id: Uuid) -> Result<UserSettings> {
        let existing = sqlx::query_as::<_, UserSettings>(
            "SELECT * FROM user_settings WHERE user_id = ?",
        )
        .bind(user_id)
        .fetch_optional(&self.db)
        .await?;

        if let Some(settings) = existing {
            return Ok(settings);
        }

        let now = Utc::now();
        let settings = UserSettings {
            id: Uuid::new_v4(),
            user_id,
            notify_dashboard: true,
            notify_email: false,
            notify_webhook: false,
            webhook_url: None,
            email: None,
            smtp_host: None,
            smtp_port: None,
            smtp_username: None,
            smtp_password: None,
            s3_enabled: false,
            s3_endpoint: None,
            s3_region: None,
            s3_bucket: None,
            s3_access_key: None,
            s3_secret_key: None,
            s3_use_ssl: true,
            s3_path_prefix: None,
            s3_purge_local: false,
            created_at: now,
            updated_at: now,
            env_configured: Default::default(),
        };

        sqlx::query(
            r#"
            INSERT INTO user_settings (
                id, user_id, notify_dashboard, notify_email, notify_webhook,
                webhook_url, email, smtp_host, smtp_port, smtp_username,
                smtp_password, s3_enabled, s3_endpoint, s3_region, s3_bucket,
                s3_access_key, s3_secret_key, s3_use_ssl, s3_path_prefix,
                s3_purge_local, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(settings.id)
        .bind(settings.user_id)
        .bind(settings.notify_dashboard)
        .bind(settings.notify_email)
        .bind(settings.notify_webhook)
        .bind(&settings.webhook_url)
        .bind(&settings.email)
        .bind(&settings.smtp_host)
        .bind(settings.smtp_port)
        .bind(&settings.smtp_username)
        .bind(&settings.smtp_password)
        .bind(settings.s3_enabled)
        .bind(&settings.s3_endpoint)
        .bind(&settings.s3_region)
        .bind(&settings.s3_bucket)
        .bind(&settings.s3_access_key)
        .bind(&settings.s3_secret_key)
        .bind(settings.s3_use_ssl)
        .bind(&settings.s3_path_prefix)
        .bind(settings.s3_purge_local)
        .bind(settings.created_at)
        .bind(settings.updated_at)
        .execute(&self.db)
        .await?;

        Ok(settings)
    }

    async fn persist(&self, settings: &UserSettings) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE user_settings SET
                notify_dashboard = ?, notify_email = ?, notify_webhook = ?,
                webhook_url = ?, email = ?, smtp_host = ?, smtp_port = ?,
                smtp_username = ?, smtp_password = ?, s3_enabled = ?,
                s3_endpoint = ?, s3_region = ?, s3_bucket = ?, s3_access_key = ?,
                s3_secret_key = ?, s3_use_ssl = ?, s3_path_prefix = ?,
                s3_purge_local = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(settings.notify_dashboard)
        .bind(settings.notify_email)
        .bind(settings.notify_webhook)
        .bind(&settings.webhook_url)
        .bind(&settings.email)
        .bind(&settings.smtp_host)
        .bind(settings.smtp_port)
        .bind(&settings.smtp_username)
        .bind(&settings.smtp_password)
        .bind(settings.s3_enabled)
        .bind(&settings.s3_endpoint)
        .bind(&settings.s3_region)
        .bind(&settings.s3_bucket)
        .bind(&settings.s3_access_key)
        .bind(&settings.s3_secret_key)
        .bind(settings.s3_use_ssl)
        .bind(&settings.s3_path_prefix)
        .bind(settings.s3_purge_local)
        .bind(settings.updated_at)
        .bind(settings.id)
        .execute(&self.db)
        .await?;

        Ok(())
    }
}

struct EnvOverrides {
    host: Option<String>,
    port: Option<i64>,
    username: Option<String>,
    password: Option<String>,
    from: Option<String>,
}

impl EnvOverrides {
    fn read() -> Self {
        let non_empty = |key: &str| std::env::var(key).ok().filter(|v| !v.is_empty());
        Self {
            host: non_empty("SMTP_HOST"),
            port: non_empty("SMTP_PORT").and_then(|v| v.parse().ok()),
            username: non_empty("SMTP_USER"),
            password: non_empty("SMTP_PASSWORD"),
            from: non_empty("SMTP_FROM"),
        }
    }
}

fn apply_env_overrides(settings: &mut UserSettings) {
    let env = EnvOverrides::read();

    if let Some(host) = env.host {
        settings.smtp_host = Some(host);
        settings.env_configured.insert("smtp_host".into(), true);
    }
    if let Some(port) = env.port {
        settings.smtp_port = Some(port);
        settings.env_configured.insert("smtp_port".into(), true);
    }
    if let Some(username) = env.username {
        settings.smtp_username = Some(username);
        settings.env_configured.insert("smtp_username".into(), true);
    }
    if let Some(password) = env.password {
        settings.smtp_password = Some(password);
        settings.env_configured.insert("smtp_password".into(), true);
    }
    if let Some(from) = env.from {
        settings.email = Some(from);
        settings.env_configured.insert("email".into(), true);
    }
}
