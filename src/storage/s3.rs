//! S3 mirror for dump files using the rust-s3 crate.
//!
//! Works against AWS S3 and S3-compatible services (MinIO, etc.). Presence is
//! per-user via UserSettings; the bucket is created on first use when absent.
//! Object key layout: `[path_prefix/]<sanitized-connection-name>/<file>`.

use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;
use s3::BucketConfiguration;
use std::path::Path;
use tokio::fs;

use crate::error::{AppError, Result};
use crate::models::settings::UserSettings;

/// Connection parameters for a user's S3 mirror.
#[derive(Debug, Clone)]
pub struct S3Config {
    pub endpoint: String,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub use_ssl: bool,
    pub path_prefix: String,
}

fn required<'a>(value: Option<&'a str>, field: &str) -> Result<&'a str> {
    match value {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(AppError::S3Config(format!("{} not configured", field))),
    }
}

impl S3Config {
    /// Build from internal settings (secret key already decrypted).
    ///
    /// `Ok(None)` when S3 is disabled for the user; `ErrS3Config` when it is
    /// enabled but a required field is missing.
    pub fn from_settings(settings: &UserSettings) -> Result<Option<Self>> {
        if !settings.s3_enabled {
            return Ok(None);
        }

        let endpoint = required(settings.s3_endpoint.as_deref(), "s3_endpoint")?;
        let bucket = required(settings.s3_bucket.as_deref(), "s3_bucket")?;
        let access_key = required(settings.s3_access_key.as_deref(), "s3_access_key")?;
        let secret_key = required(settings.s3_secret_key.as_deref(), "s3_secret_key")?;

        let region = settings
            .s3_region
            .as_deref()
            .filter(|r| !r.is_empty())
            .unwrap_or("us-east-1")
            .to_string();

        Ok(Some(Self {
            endpoint: endpoint.to_string(),
            region,
            bucket: bucket.to_string(),
            access_key: access_key.to_string(),
            secret_key: secret_key.to_string(),
            use_ssl: settings.s3_use_ssl,
            path_prefix: settings.s3_path_prefix.clone().unwrap_or_default(),
        }))
    }
}

/// Handle to a user's bucket.
pub struct S3Mirror {
    bucket: Box<Bucket>,
    prefix: String,
}

impl S3Mirror {
    /// Open the bucket, creating it (region-scoped) when it does not exist.
    pub async fn connect(config: S3Config) -> Result<Self> {
        let scheme = if config.use_ssl { "https" } else { "http" };
        let region = Region::Custom {
            region: config.region.clone(),
            endpoint: format!("{}://{}", scheme, config.endpoint),
        };

        let credentials = Credentials::new(
            Some(&config.access_key),
            Some(&config.secret_key),
            None,
            None,
            None,
        )
        .map_err(|e| AppError::S3Config(format!("invalid credentials: {}", e)))?;

        // Path-style access for MinIO and friends
        let bucket = Bucket::new(&config.bucket, region.clone(), credentials.clone())
            .map_err(|e| AppError::S3Config(format!("bucket handle: {}", e)))?
            .with_path_style();

        let exists = bucket
            .exists()
            .await
            .map_err(|e| AppError::S3Transport(format!("check bucket existence: {}", e)))?;

        if !exists {
            Bucket::create_with_path_style(
                &config.bucket,
                region,
                credentials,
                BucketConfiguration::default(),
            )
            .await
            .map_err(|e| AppError::S3Transport(format!("create bucket: {}", e)))?;
            tracing::info!(bucket = %config.bucket, "Created S3 bucket");
        }

        Ok(Self {
            bucket: Box::new(bucket),
            prefix: config.path_prefix,
        })
    }

    /// `[prefix/]subfolder/file_name`, slash-normalized.
    pub fn object_key(&self, subfolder: &str, file_name: &str) -> String {
        let mut parts: Vec<&str> = Vec::with_capacity(3);

        let prefix = self.prefix.trim_end_matches('/');
        if !prefix.is_empty() {
            parts.push(prefix);
        }
        let subfolder = subfolder.trim_matches('/');
        if !subfolder.is_empty() {
            parts.push(subfolder);
        }
        parts.push(file_name.trim_start_matches('/'));

        parts.join("/")
    }

    /// Upload a local dump file under the given subfolder; returns the key.
    pub async fn upload_file(&self, local_path: &Path, subfolder: &str) -> Result<String> {
        let file_name = local_path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| AppError::Internal(format!("bad dump path: {:?}", local_path)))?;

        let key = self.object_key(subfolder, file_name);
        let content = fs::read(local_path).await?;

        self.bucket
            .put_object(&key, &content)
            .await
            .map_err(|e| AppError::S3Transport(format!("put object '{}': {}", key, e)))?;

        tracing::debug!(key = %key, size = content.len(), "Uploaded dump to S3");
        Ok(key)
    }

    /// Download an object to a local path, creating parent directories.
    pub async fn download_file(&self, object_key: &str, local_path: &Path) -> Result<()> {
        let response = self
            .bucket
            .get_object(object_key)
            .await
            .map_err(|e| AppError::S3Transport(format!("get object '{}': {}", object_key, e)))?;

        if let Some(parent) = local_path.parent() {
            fs::create_dir_all(parent).await?;
        }
        fs::write(local_path, response.to_vec()).await?;

        tracing::debug!(key = %object_key, path = %local_path.display(), "Downloaded dump from S3");
        Ok(())
    }

    pub async fn delete_file(&self, object_key: &str) -> Result<()> {
        self.bucket
            .delete_object(object_key)
            .await
            .map_err(|e| AppError::S3Transport(format!("delete object '{}': {}", object_key, e)))?;
        Ok(())
    }

    /// Copy-then-delete rename; atomic at the per-object level.
    pub async fn move_file(&self, old_key: &str, new_key: &str) -> Result<()> {
        let copy_source = format!("{}/{}", self.bucket.name(), old_key);
        self.bucket
            .copy_object_internal(&copy_source, new_key)
            .await
            .map_err(|e| {
                AppError::S3Transport(format!("copy '{}' to '{}': {}", old_key, new_key, e))
            })?;

        self.bucket
            .delete_object(old_key)
            .await
            .map_err(|e| AppError::S3Transport(format!("delete object '{}': {}", old_key, e)))?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use std::collections::HashMap;
    use uuid::Uuid;

    fn mirror_with_prefix(prefix: &str) -> S3Mirror {
        let region = Region::Custom {
            region: "us-east-1".into(),
            endpoint: "http://localhost:9000".into(),
        };
        let credentials = Credentials::new(Some("k"), Some("s"), None, None, None).unwrap();
        let bucket = Bucket::new("b", region, credentials).unwrap().with_path_style();
        S3Mirror {
            bucket: Box::new(bucket),
            prefix: prefix.into(),
        }
    }

    fn settings(s3_enabled: bool) -> UserSettings {
        UserSettings {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            notify_dashboard: true,
            notify_email: false,
            notify_webhook: false,
            webhook_url: None,
            email: None,
            smtp_host: None,
            smtp_port: None,
            smtp_username: None,
            smtp_password: None,
            s3_enabled,
            s3_endpoint: Some("localhost:9000".into()),
            s3_region: None,
            s3_bucket: Some("b".into()),
            s3_access_key: Some("k".into()),
            s3_secret_key: Some("s".into()),
            s3_use_ssl: false,
            s3_path_prefix: Some("p".into()),
            s3_purge_local: false,
            created_at: Utc::now(),
            updated_at: Utc::now(),
            env_configured: HashMap::new(),
        }
    }

    #[test]
    fn test_object_key_with_prefix_and_subfolder() {
        let mirror = mirror_with_prefix("p");
        assert_eq!(
            mirror.object_key("pg1", "shop_20240101_000000.sql"),
            "p/pg1/shop_20240101_000000.sql"
        );
    }

    #[test]
    fn test_object_key_without_prefix() {
        let mirror = mirror_with_prefix("");
        assert_eq!(mirror.object_key("pg1", "f.sql"), "pg1/f.sql");
    }

    #[test]
    fn test_object_key_normalizes_slashes() {
        let mirror = mirror_with_prefix("p/");
        assert_eq!(mirror.object_key("/pg1/", "/f.sql"), "p/pg1/f.sql");
    }

    #[test]
    fn test_config_none_when_disabled() {
        let config = S3Config::from_settings(&settings(false)).unwrap();
        assert!(config.is_none());
    }

    #[test]
    fn test_config_defaults_region() {
        let config = S3Config::from_settings(&settings(true)).unwrap().unwrap();
        assert_eq!(config.region, "us-east-1");
        assert_eq!(config.path_prefix, "p");
    }

    #[test]
    fn test_config_rejects_missing_bucket() {
        let mut s = settings(true);
        s.s3_bucket = None;
        assert!(matches!(
            S3Config::from_settings(&s),
            Err(AppError::S3Config(_))
        ));
    }

    #[test]
    fn test_config_rejects_blank_secret() {
        let mut s = settings(true);
        s.s3_secret_key = Some(String::new());
        assert!(matches!(
            S3Config::from_settings(&s),
            Err(AppError::S3Config(_))
        ));
    }
}
