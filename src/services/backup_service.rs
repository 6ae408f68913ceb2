//! Backup orchestrator.
//!
//! Composes the connection store, dump drivers, SSH tunneling, local spool,
//! S3 mirror, backup records, scheduler and notifier. The public operations
//! here (plus scheduling in `backup_scheduler` and restore in
//! `backup_restore`) are the complete orchestration surface; HTTP handlers
//! stay thin adapters over them.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::task::JoinHandle;
use uuid::Uuid;

use crate::dump;
use crate::error::{AppError, Result};
use crate::models::backup::{
    Backup, BackupListItem, BackupListOptions, BackupStats, BackupStatus,
};
use crate::models::connection::Connection;
use crate::services::backup_store::BackupStore;
use crate::services::connection_store::ConnectionStore;
use crate::services::notification_service::NotificationService;
use crate::services::settings_service::SettingsService;
use crate::ssh::SshTunnel;
use crate::storage::s3::{S3Config, S3Mirror};
use crate::storage::spool::{sanitize_connection_name, LocalSpool};

/// Narrow interface consumed by the connection handlers for S3 upkeep on
/// connection rename/delete, breaking the handler/orchestrator cycle.
#[async_trait]
pub trait S3FolderMaintenance: Send + Sync {
    async fn cleanup_s3_for_connection(&self, connection_id: Uuid) -> Result<()>;
    async fn rename_s3_folder_for_connection(
        &self,
        connection_id: Uuid,
        old_name: &str,
        new_name: &str,
    ) -> Result<()>;
}

pub struct BackupService {
    pub(crate) connections: ConnectionStore,
    pub(crate) store: BackupStore,
    pub(crate) settings: SettingsService,
    pub(crate) notifications: NotificationService,
    pub(crate) spool: LocalSpool,
    /// schedule_id -> running cron job; mutated by schedule create/update/
    /// disable and read by nothing else.
    pub(crate) jobs: Mutex<HashMap<Uuid, JoinHandle<()>>>,
}

impl BackupService {
    pub fn new(
        connections: ConnectionStore,
        store: BackupStore,
        settings: SettingsService,
        notifications: NotificationService,
        backup_dir: impl Into<PathBuf>,
    ) -> Arc<Self> {
        Arc::new(Self {
            connections,
            store,
            settings,
            notifications,
            spool: LocalSpool::new(backup_dir),
            jobs: Mutex::new(HashMap::new()),
        })
    }

    // ------------------------------------------------------------------
    // Record access for handlers
    // ------------------------------------------------------------------

    pub async fn get_backup(&self, id: Uuid) -> Result<Backup> {
        self.store.get(id).await
    }

    pub async fn list_backups(
        &self,
        opts: &BackupListOptions,
    ) -> Result<(Vec<BackupListItem>, i64)> {
        self.store.list_paginated(opts).await
    }

    pub async fn backup_stats(&self, user_id: Uuid) -> Result<BackupStats> {
        self.store.stats(user_id).await
    }

    // ------------------------------------------------------------------
    // CreateBackup
    // ------------------------------------------------------------------

    /// Dump one connection. Fans out to a multi-database run when the
    /// connection selects additional databases.
    pub async fn create_backup(&self, connection_id: Uuid) -> Result<Backup> {
        let conn = self.connections.get(connection_id).await?;

        if !conn.selected_databases.is_empty() {
            self.multi_database_backup(&conn).await
        } else {
            let db_name = conn.database_name.clone();
            self.single_database_backup(&conn, &db_name).await
        }
    }

    async fn single_database_backup(&self, conn: &Connection, db_name: &str) -> Result<Backup> {
        dump::verify_dump_tool(conn.engine)?;

        let tunnel = self.open_tunnel_if_needed(conn).await?;
        let effective = effective_connection(conn, tunnel.as_ref());

        let started = Utc::now();
        let dump_path = self
            .spool
            .prepare_dump_path(&conn.name, db_name, started)
            .await?;

        let mut backup = Backup {
            id: Uuid::new_v4(),
            connection_id: conn.id,
            schedule_id: None,
            status: BackupStatus::InProgress,
            local_path: dump_path.to_string_lossy().into_owned(),
            s3_object_key: None,
            size_bytes: 0,
            started_at: started,
            completed_at: None,
            created_at: started,
            updated_at: started,
        };
        self.store.create(&backup).await?;

        // On dump failure the record intentionally stays in_progress; the
        // scheduler path converts the error into a notification, on-demand
        // callers see it directly.
        self.run_dump(&effective, db_name, &dump_path).await?;

        let size = self.dump_size(&dump_path, db_name).await?;
        let completed = Utc::now();
        self.store.mark_completed(backup.id, size, completed).await?;
        backup.status = BackupStatus::Completed;
        backup.size_bytes = size;
        backup.completed_at = Some(completed);

        // The local copy stays authoritative when the mirror is down.
        match self.upload_to_s3_if_enabled(&mut backup, conn.user_id, &conn.name).await {
            Ok(()) => {
                if let Some(key) = backup.s3_object_key.clone() {
                    self.store.update_s3_object_key(backup.id, &key).await?;
                }
            }
            Err(e) => {
                tracing::warn!(backup_id = %backup.id, error = %e, "Failed to upload backup to S3");
            }
        }

        drop(tunnel);
        Ok(backup)
    }

    async fn multi_database_backup(&self, conn: &Connection) -> Result<Backup> {
        dump::verify_dump_tool(conn.engine)?;

        let tunnel = self.open_tunnel_if_needed(conn).await?;
        let effective = effective_connection(conn, tunnel.as_ref());

        let started = Utc::now();
        let mut failed: Vec<String> = Vec::new();
        let mut successful: Vec<Backup> = Vec::new();

        for db_name in &conn.selected_databases {
            let dump_path = self
                .spool
                .prepare_dump_path(&conn.name, db_name, started)
                .await?;

            if let Err(e) = self.run_dump(&effective, db_name, &dump_path).await {
                tracing::warn!(database = %db_name, error = %e, "Sub-dump failed");
                failed.push(db_name.clone());
                continue;
            }

            let size = match self.dump_size(&dump_path, db_name).await {
                Ok(size) => size,
                Err(e) => {
                    tracing::warn!(database = %db_name, error = %e, "Sub-dump produced no output");
                    failed.push(db_name.clone());
                    continue;
                }
            };

            let completed = Utc::now();
            let mut backup = Backup {
                id: Uuid::new_v4(),
                connection_id: conn.id,
                schedule_id: None,
                status: BackupStatus::Completed,
                local_path: dump_path.to_string_lossy().into_owned(),
                s3_object_key: None,
                size_bytes: size,
                started_at: started,
                completed_at: Some(completed),
                created_at: completed,
                updated_at: completed,
            };

            if let Err(e) = self
                .upload_to_s3_if_enabled(&mut backup, conn.user_id, &conn.name)
                .await
            {
                tracing::warn!(database = %db_name, error = %e, "Failed to upload sub-dump to S3");
            }

            // Failed sub-dumps leave no record; only successful ones persist.
            if let Err(e) = self.store.create(&backup).await {
                tracing::warn!(database = %db_name, error = %e, "Failed to persist sub-dump record");
                failed.push(db_name.clone());
                continue;
            }

            successful.push(backup);
        }

        drop(tunnel);

        if successful.is_empty() {
            return Err(AppError::DumpFailed {
                engine: conn.engine.to_string(),
                stderr: format!("all database backups failed: {:?}", failed),
            });
        }

        if failed.is_empty() {
            tracing::info!(
                connection = %conn.name,
                count = successful.len(),
                "Multi-database backup completed"
            );
        } else {
            tracing::warn!(
                connection = %conn.name,
                succeeded = successful.len(),
                failed = ?failed,
                "Multi-database backup completed with failures"
            );
        }

        Ok(successful.remove(0))
    }

    pub(crate) async fn run_dump(
        &self,
        conn: &Connection,
        db_name: &str,
        dump_path: &Path,
    ) -> Result<()> {
        let mut cmd = dump::dump_command(conn, db_name, dump_path)?;

        tracing::info!(engine = %conn.engine, database = %db_name, "Running dump");

        let output = cmd.output().await.map_err(|e| AppError::DumpFailed {
            engine: conn.engine.to_string(),
            stderr: e.to_string(),
        })?;

        if !output.status.success() {
            let mut stderr = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if stderr.is_empty() {
                stderr = String::from_utf8_lossy(&output.stdout).trim().to_string();
            }
            if stderr.is_empty() {
                stderr = format!("exit status {:?}", output.status.code());
            }
            return Err(AppError::DumpFailed {
                engine: conn.engine.to_string(),
                stderr,
            });
        }

        Ok(())
    }

    /// Size of what the dump produced. MongoDB writes a directory tree next
    /// to the recorded path instead of a single file.
    async fn dump_size(&self, dump_path: &Path, db_name: &str) -> Result<i64> {
        if let Ok(meta) = tokio::fs::metadata(dump_path).await {
            return Ok(meta.len() as i64);
        }

        if let Some(parent) = dump_path.parent() {
            let dir = parent.join(db_name);
            if tokio::fs::metadata(&dir).await.map(|m| m.is_dir()).unwrap_or(false) {
                return Ok(directory_size(&dir).await?);
            }
        }

        Err(AppError::Internal(format!(
            "dump produced no output at {}",
            dump_path.display()
        )))
    }

    pub(crate) async fn open_tunnel_if_needed(
        &self,
        conn: &Connection,
    ) -> Result<Option<SshTunnel>> {
        if !conn.ssh_enabled {
            return Ok(None);
        }
        Ok(Some(SshTunnel::open(conn).await?))
    }

    // ------------------------------------------------------------------
    // S3 mirror
    // ------------------------------------------------------------------

    /// Upload the dump when the user's S3 mirror is enabled and fully
    /// configured, then purge the local file if the user asked for that.
    /// Local deletion never happens before a successful upload.
    async fn upload_to_s3_if_enabled(
        &self,
        backup: &mut Backup,
        user_id: Uuid,
        connection_name: &str,
    ) -> Result<()> {
        let settings = self.settings.get_internal(user_id).await?;
        let Some(config) = S3Config::from_settings(&settings)? else {
            return Ok(());
        };
        let purge_local = settings.s3_purge_local;

        let mirror = S3Mirror::connect(config).await?;
        let subfolder = sanitize_connection_name(connection_name);
        let local_path = PathBuf::from(&backup.local_path);

        let object_key = mirror.upload_file(&local_path, &subfolder).await?;
        backup.s3_object_key = Some(object_key.clone());

        tracing::info!(backup_id = %backup.id, key = %object_key, "Uploaded backup to S3");

        if purge_local {
            LocalSpool::remove_file(&local_path).await;
        }

        Ok(())
    }

    /// Best-effort mirror for cleanup/rename paths: an unconfigured or
    /// unreachable mirror means there is nothing to clean, not an error.
    pub(crate) async fn mirror_for_user(&self, user_id: Uuid) -> Option<S3Mirror> {
        let settings = match self.settings.get_internal(user_id).await {
            Ok(settings) => settings,
            Err(e) => {
                tracing::warn!(error = %e, "Failed to load user settings for S3 maintenance");
                return None;
            }
        };

        let config = match S3Config::from_settings(&settings) {
            Ok(Some(config)) => config,
            Ok(None) => return None,
            Err(e) => {
                tracing::warn!(error = %e, "Incomplete S3 configuration, skipping S3 maintenance");
                return None;
            }
        };

        match S3Mirror::connect(config).await {
            Ok(mirror) => Some(mirror),
            Err(e) => {
                tracing::warn!(error = %e, "Failed to reach S3, skipping S3 maintenance");
                None
            }
        }
    }

    /// Return a readable path for the backup, rehydrating from S3 when the
    /// local file is gone. The second value tells the caller to delete the
    /// path after use.
    pub async fn ensure_file_available(
        &self,
        backup: &Backup,
        user_id: Uuid,
    ) -> Result<(PathBuf, bool)> {
        let local_path = PathBuf::from(&backup.local_path);
        if tokio::fs::try_exists(&local_path).await.unwrap_or(false) {
            return Ok((local_path, false));
        }

        let Some(object_key) = backup
            .s3_object_key
            .as_deref()
            .filter(|key| !key.is_empty())
        else {
            return Err(AppError::BackupMissing);
        };

        let settings = self.settings.get_internal(user_id).await?;
        let Some(config) = S3Config::from_settings(&settings)? else {
            // S3 was turned off after the upload; the object is unreachable.
            return Err(AppError::BackupMissing);
        };
        let mirror = S3Mirror::connect(config).await?;

        let file_name = local_path
            .file_name()
            .ok_or_else(|| AppError::Internal(format!("bad dump path: {}", backup.local_path)))?;
        let temp_path = std::env::temp_dir()
            .join("velld-s3-downloads")
            .join(file_name);

        mirror.download_file(object_key, &temp_path).await?;

        tracing::info!(backup_id = %backup.id, path = %temp_path.display(), "Rehydrated backup from S3");
        Ok((temp_path, true))
    }
}

#[async_trait]
impl S3FolderMaintenance for BackupService {
    /// Delete every mirrored object of the connection's backups.
    /// Best-effort per object; individual failures are logged and skipped.
    async fn cleanup_s3_for_connection(&self, connection_id: Uuid) -> Result<()> {
        let backups = self.store.list_by_connection(connection_id).await?;
        if backups.is_empty() {
            return Ok(());
        }

        let conn = self.connections.get(connection_id).await?;
        let Some(mirror) = self.mirror_for_user(conn.user_id).await else {
            return Ok(());
        };

        let mut deleted = 0usize;
        for backup in &backups {
            let Some(key) = backup.s3_object_key.as_deref().filter(|k| !k.is_empty()) else {
                continue;
            };
            match mirror.delete_file(key).await {
                Ok(()) => deleted += 1,
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "Failed to delete S3 object");
                }
            }
        }

        tracing::info!(connection_id = %connection_id, deleted, "S3 cleanup completed");
        Ok(())
    }

    /// Rewrite object keys after a connection rename: the first occurrence
    /// of the old sanitized folder becomes the new one, copy-then-delete per
    /// object, record updated afterwards. Idempotent when the names sanitize
    /// to the same folder.
    async fn rename_s3_folder_for_connection(
        &self,
        connection_id: Uuid,
        old_name: &str,
        new_name: &str,
    ) -> Result<()> {
        let backups = self.store.list_by_connection(connection_id).await?;
        if backups.is_empty() {
            return Ok(());
        }

        let old_folder = sanitize_connection_name(old_name);
        let new_folder = sanitize_connection_name(new_name);
        if old_folder == new_folder {
            return Ok(());
        }

        let conn = self.connections.get(connection_id).await?;
        let Some(mirror) = self.mirror_for_user(conn.user_id).await else {
            return Ok(());
        };

        let mut renamed = 0usize;
        for backup in &backups {
            let Some(old_key) = backup.s3_object_key.as_deref().filter(|k| !k.is_empty()) else {
                continue;
            };

            let new_key = old_key.replacen(&old_folder, &new_folder, 1);
            if new_key == old_key {
                continue;
            }

            if let Err(e) = mirror.move_file(old_key, &new_key).await {
                tracing::warn!(from = %old_key, to = %new_key, error = %e, "Failed to rename S3 object");
                continue;
            }

            if let Err(e) = self.store.update_s3_object_key(backup.id, &new_key).await {
                tracing::warn!(backup_id = %backup.id, error = %e, "Failed to persist renamed S3 key");
                continue;
            }

            renamed += 1;
        }

        tracing::info!(
            connection_id = %connection_id,
            renamed,
            from = %old_folder,
            to = %new_folder,
            "S3 folder rename completed"
        );
        Ok(())
    }
}

impl Drop for BackupService {
    fn drop(&mut self) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        for (_, handle) in jobs.drain() {
            handle.abort();
        }
    }
}

pub(crate) fn effective_connection(conn: &Connection, tunnel: Option<&SshTunnel>) -> Connection {
    match tunnel {
        Some(tunnel) => {
            let mut effective = conn.clone();
            effective.host = tunnel.host();
            effective.port = tunnel.port();
            effective
        }
        None => conn.clone(),
    }
}

/// Recursive on-disk size of a dump directory.
async fn directory_size(dir: &Path) -> Result<i64> {
    let mut total = 0i64;
    let mut pending = vec![dir.to_path_buf()];

    while let Some(current) = pending.pop() {
        let mut entries = tokio::fs::read_dir(&current).await?;
        while let Some(entry) = entries.next_entry().await? {
            let meta = entry.metadata().await?;
            if meta.is_dir() {
                pending.push(entry.path());
            } else {
                total += meta.len() as i64;
            }
        }
    }

    Ok(total)
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::services::connection_store::tests::{insert_user, sample_connection};
    use crate::services::encryption::EncryptionService;
    use sqlx::SqlitePool;

    pub(crate) async fn service_with_spool(
        spool_dir: &Path,
    ) -> (SqlitePool, Arc<BackupService>, Uuid) {
        let pool = memory_pool().await;
        let vault = EncryptionService::new("test-key");
        let service = BackupService::new(
            ConnectionStore::new(pool.clone(), vault.clone()),
            BackupStore::new(pool.clone()),
            SettingsService::new(pool.clone(), vault),
            NotificationService::new(pool.clone()),
            spool_dir,
        );
        let user_id = insert_user(&pool).await;
        (pool, service, user_id)
    }

    fn completed_backup(connection_id: Uuid, local_path: &str) -> Backup {
        let now = Utc::now();
        Backup {
            id: Uuid::new_v4(),
            connection_id,
            schedule_id: None,
            status: BackupStatus::Completed,
            local_path: local_path.to_string(),
            s3_object_key: None,
            size_bytes: 3,
            started_at: now,
            completed_at: Some(now),
            created_at: now,
            updated_at: now,
        }
    }

    #[tokio::test]
    async fn test_ensure_file_available_prefers_local_file() {
        let tmp = tempfile::tempdir().unwrap();
        let (_pool, service, user_id) = service_with_spool(tmp.path()).await;

        let file = tmp.path().join("shop_20240101_000000.sql");
        tokio::fs::write(&file, b"sql").await.unwrap();

        let backup = completed_backup(Uuid::new_v4(), &file.to_string_lossy());
        let (path, is_temp) = service.ensure_file_available(&backup, user_id).await.unwrap();

        assert_eq!(path, file);
        assert!(!is_temp);
    }

    #[tokio::test]
    async fn test_ensure_file_available_without_key_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let (_pool, service, user_id) = service_with_spool(tmp.path()).await;

        let backup = completed_backup(Uuid::new_v4(), "/nonexistent/shop.sql");
        assert!(matches!(
            service.ensure_file_available(&backup, user_id).await,
            Err(AppError::BackupMissing)
        ));
    }

    #[tokio::test]
    async fn test_ensure_file_available_with_key_but_s3_disabled_is_missing() {
        let tmp = tempfile::tempdir().unwrap();
        let (_pool, service, user_id) = service_with_spool(tmp.path()).await;

        let mut backup = completed_backup(Uuid::new_v4(), "/nonexistent/shop.sql");
        backup.s3_object_key = Some("p/pg1/shop.sql".into());
        assert!(matches!(
            service.ensure_file_available(&backup, user_id).await,
            Err(AppError::BackupMissing)
        ));
    }

    #[tokio::test]
    async fn test_create_backup_unknown_connection() {
        let tmp = tempfile::tempdir().unwrap();
        let (_pool, service, _user) = service_with_spool(tmp.path()).await;

        assert!(matches!(
            service.create_backup(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_rename_is_noop_when_sanitized_names_match() {
        let tmp = tempfile::tempdir().unwrap();
        let (pool, service, user_id) = service_with_spool(tmp.path()).await;

        let conn_store = ConnectionStore::new(pool.clone(), EncryptionService::new("test-key"));
        let conn = sample_connection(user_id);
        conn_store.save(&conn).await.unwrap();

        let mut backup = completed_backup(conn.id, "./backups/old_name/f.sql");
        backup.s3_object_key = Some("p/old_name/f.sql".into());
        service.store.create(&backup).await.unwrap();

        // "old name" and "old?name" both sanitize to "old_name"
        service
            .rename_s3_folder_for_connection(conn.id, "old name", "old?name")
            .await
            .unwrap();

        let unchanged = service.store.get(backup.id).await.unwrap();
        assert_eq!(unchanged.s3_object_key.as_deref(), Some("p/old_name/f.sql"));
    }

    #[test]
    fn test_effective_connection_without_tunnel_is_clone() {
        let conn = sample_connection(Uuid::new_v4());
        let effective = effective_connection(&conn, None);
        assert_eq!(effective.host, conn.host);
        assert_eq!(effective.port, conn.port);
    }
}
