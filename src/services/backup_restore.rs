//! Restore of a prior dump into a compatible target connection.

use std::path::Path;
use uuid::Uuid;

use crate::dump;
use crate::error::{AppError, Result};
use crate::models::connection::Connection;
use crate::services::backup_service::{effective_connection, BackupService};
use crate::storage::spool::LocalSpool;

impl BackupService {
    /// Restore `backup_id` into `connection_id`.
    ///
    /// The target engine must match the backup's origin engine; the dump is
    /// rehydrated from S3 when the local file is gone, and the temp copy is
    /// cleaned up on every exit path.
    pub async fn restore_backup(&self, backup_id: Uuid, connection_id: Uuid) -> Result<()> {
        let backup = self.store.get(backup_id).await?;
        let conn = self.connections.get(connection_id).await?;

        // Cross-engine restores are caller errors; re-check here since the
        // dump format is engine-native.
        if let Ok(origin) = self.connections.get(backup.connection_id).await {
            if origin.engine != conn.engine {
                return Err(AppError::Validation(format!(
                    "backup was taken from a {} database, target is {}",
                    origin.engine, conn.engine
                )));
            }
        }

        let (file_path, is_temp) = self.ensure_file_available(&backup, conn.user_id).await?;

        dump::verify_restore_tool(conn.engine)?;

        let result = self.run_restore(&conn, &file_path).await;

        if is_temp {
            LocalSpool::remove_file(&file_path).await;
        }

        result
    }

    async fn run_restore(&self, conn: &Connection, file_path: &Path) -> Result<()> {
        let tunnel = self.open_tunnel_if_needed(conn).await?;
        let effective = effective_connection(conn, tunnel.as_ref());

        let mut cmd = dump::restore_command(&effective, file_path)?;

        tracing::info!(
            engine = %conn.engine,
            database = %conn.database_name,
            "Running restore"
        );

        let output = cmd.output().await.map_err(|e| AppError::RestoreFailed {
            engine: conn.engine.to_string(),
            detail: e.to_string(),
        })?;

        let validation = dump::validate_restore_output(conn.engine, &conn.database_name, &output);
        drop(tunnel);
        validation
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::backup::{Backup, BackupStatus};
    use crate::models::connection::DatabaseEngine;
    use crate::services::backup_service::tests::service_with_spool;
    use crate::services::connection_store::tests::sample_connection;
    use crate::services::connection_store::ConnectionStore;
    use crate::services::encryption::EncryptionService;
    use chrono::Utc;

    #[tokio::test]
    async fn test_restore_rejects_engine_mismatch() {
        let tmp = tempfile::tempdir().unwrap();
        let (pool, service, user_id) = service_with_spool(tmp.path()).await;
        let conn_store = ConnectionStore::new(pool.clone(), EncryptionService::new("test-key"));

        let origin = sample_connection(user_id);
        conn_store.save(&origin).await.unwrap();

        let mut target = sample_connection(user_id);
        target.name = "cache".into();
        target.engine = DatabaseEngine::Redis;
        conn_store.save(&target).await.unwrap();

        let dump_file = tmp.path().join("shop_20240101_000000.sql");
        tokio::fs::write(&dump_file, b"-- dump").await.unwrap();

        let now = Utc::now();
        let backup = Backup {
            id: Uuid::new_v4(),
            connection_id: origin.id,
            schedule_id: None,
            status: BackupStatus::Completed,
            local_path: dump_file.to_string_lossy().into_owned(),
            s3_object_key: None,
            size_bytes: 7,
            started_at: now,
            completed_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        service.store.create(&backup).await.unwrap();

        assert!(matches!(
            service.restore_backup(backup.id, target.id).await,
            Err(AppError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_missing_backup_record() {
        let tmp = tempfile::tempdir().unwrap();
        let (pool, service, user_id) = service_with_spool(tmp.path()).await;
        let conn_store = ConnectionStore::new(pool.clone(), EncryptionService::new("test-key"));

        let target = sample_connection(user_id);
        conn_store.save(&target).await.unwrap();

        assert!(matches!(
            service.restore_backup(Uuid::new_v4(), target.id).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_restore_missing_file_without_s3() {
        let tmp = tempfile::tempdir().unwrap();
        let (pool, service, user_id) = service_with_spool(tmp.path()).await;
        let conn_store = ConnectionStore::new(pool.clone(), EncryptionService::new("test-key"));

        let conn = sample_connection(user_id);
        conn_store.save(&conn).await.unwrap();

        let now = Utc::now();
        let backup = Backup {
            id: Uuid::new_v4(),
            connection_id: conn.id,
            schedule_id: None,
            status: BackupStatus::Completed,
            local_path: tmp
                .path()
                .join("gone_20240101_000000.sql")
                .to_string_lossy()
                .into_owned(),
            s3_object_key: None,
            size_bytes: 7,
            started_at: now,
            completed_at: Some(now),
            created_at: now,
            updated_at: now,
        };
        service.store.create(&backup).await.unwrap();

        assert!(matches!(
            service.restore_backup(backup.id, conn.id).await,
            Err(AppError::BackupMissing)
        ));
    }
}
