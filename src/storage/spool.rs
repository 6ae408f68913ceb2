//! Local dump spool.
//!
//! Layout: `<root>/<sanitized-connection-name>/<db>_<YYYYMMDD_HHMMSS>.sql`.
//! Removal and renames are best-effort; the backup record's `local_path`
//! stays authoritative and a missing file is rehydrated from S3 at read time.

use chrono::{DateTime, Utc};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::error::Result;

/// Project a connection name into `[A-Za-z0-9._-]+`.
///
/// Every other character becomes `_`; the result is capped at 255 bytes.
/// Idempotent: sanitizing a sanitized name is the identity.
pub fn sanitize_connection_name(name: &str) -> String {
    let mut sanitized: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-') {
                c
            } else {
                '_'
            }
        })
        .collect();
    // All characters are ASCII at this point, so byte and char counts agree.
    sanitized.truncate(255);
    sanitized
}

/// Filesystem layout of the local spool.
#[derive(Debug, Clone)]
pub struct LocalSpool {
    root: PathBuf,
}

impl LocalSpool {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Per-connection subfolder, created if missing.
    pub async fn connection_dir(&self, connection_name: &str) -> Result<PathBuf> {
        let dir = self.root.join(sanitize_connection_name(connection_name));
        fs::create_dir_all(&dir).await?;
        Ok(dir)
    }

    /// `<db>_<UTC timestamp with seconds>.sql`
    pub fn dump_filename(db_name: &str, at: DateTime<Utc>) -> String {
        format!("{}_{}.sql", db_name, at.format("%Y%m%d_%H%M%S"))
    }

    /// Full dump path inside the connection folder. Two runs over the same
    /// database within one second collide on the timestamp; the later dump
    /// overwrites the earlier one, which is logged here.
    pub async fn prepare_dump_path(
        &self,
        connection_name: &str,
        db_name: &str,
        at: DateTime<Utc>,
    ) -> Result<PathBuf> {
        let dir = self.connection_dir(connection_name).await?;
        let path = dir.join(Self::dump_filename(db_name, at));
        if fs::try_exists(&path).await.unwrap_or(false) {
            tracing::warn!(path = %path.display(), "Overwriting existing spool file");
        }
        Ok(path)
    }

    /// Best-effort removal; failures are logged, never propagated.
    pub async fn remove_file(path: &Path) {
        match fs::remove_file(path).await {
            Ok(()) => tracing::debug!(path = %path.display(), "Removed spool file"),
            Err(e) => {
                tracing::warn!(path = %path.display(), error = %e, "Failed to remove spool file")
            }
        }
    }

    /// Best-effort rename; failures are logged, never propagated.
    pub async fn rename_file(old: &Path, new: &Path) {
        match fs::rename(old, new).await {
            Ok(()) => {}
            Err(e) => tracing::warn!(
                from = %old.display(),
                to = %new.display(),
                error = %e,
                "Failed to rename spool file"
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn test_sanitize_keeps_allowed_characters() {
        assert_eq!(sanitize_connection_name("pg1"), "pg1");
        assert_eq!(sanitize_connection_name("prod-db_v2.1"), "prod-db_v2.1");
    }

    #[test]
    fn test_sanitize_replaces_each_disallowed_character() {
        // One underscore per character, no collapsing
        assert_eq!(sanitize_connection_name("New Name!!"), "New_Name__");
        assert_eq!(sanitize_connection_name("a/b\\c"), "a_b_c");
        assert_eq!(sanitize_connection_name("café"), "caf_");
    }

    #[test]
    fn test_sanitize_is_idempotent() {
        for name in ["New Name!!", "ünï©ode", "plain", "a b  c"] {
            let once = sanitize_connection_name(name);
            assert_eq!(sanitize_connection_name(&once), once);
        }
    }

    #[test]
    fn test_sanitize_output_alphabet() {
        let out = sanitize_connection_name("weird/..\\name with spaces!@#");
        assert!(out
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-')));
    }

    #[test]
    fn test_sanitize_caps_length() {
        let long = "x".repeat(400);
        assert_eq!(sanitize_connection_name(&long).len(), 255);
    }

    #[test]
    fn test_dump_filename_format() {
        let at = Utc.with_ymd_and_hms(2024, 3, 5, 14, 30, 9).unwrap();
        assert_eq!(
            LocalSpool::dump_filename("shop", at),
            "shop_20240305_143009.sql"
        );
    }

    #[tokio::test]
    async fn test_connection_dir_created_with_sanitized_name() {
        let tmp = tempfile::tempdir().unwrap();
        let spool = LocalSpool::new(tmp.path());

        let dir = spool.connection_dir("My Conn!").await.unwrap();
        assert!(dir.ends_with("My_Conn_"));
        assert!(dir.is_dir());
    }

    #[tokio::test]
    async fn test_remove_file_is_best_effort() {
        // Removing a missing file must not panic or error
        LocalSpool::remove_file(Path::new("/nonexistent/velld-test-file.sql")).await;
    }
}
