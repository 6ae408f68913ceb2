//! Durable store of backup records and cron schedules.

use chrono::{DateTime, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::backup::{
    Backup, BackupListItem, BackupListOptions, BackupSchedule, BackupStats, BackupStatus,
};

#[derive(Clone)]
pub struct BackupStore {
    db: SqlitePool,
}

const BACKUP_COLUMNS: &str = "id, connection_id, schedule_id, status, local_path, s3_object_key, \
     size_bytes, started_at, completed_at, created_at, updated_at";

impl BackupStore {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    // ------------------------------------------------------------------
    // Backup records
    // ------------------------------------------------------------------

    pub async fn create(&self, backup: &Backup) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO backups (
                id, connection_id, schedule_id, status, local_path, s3_object_key,
                size_bytes, started_at, completed_at, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(backup.id)
        .bind(backup.connection_id)
        .bind(backup.schedule_id)
        .bind(backup.status)
        .bind(&backup.local_path)
        .bind(&backup.s3_object_key)
        .bind(backup.size_bytes)
        .bind(backup.started_at)
        .bind(backup.completed_at)
        .bind(backup.created_at)
        .bind(backup.updated_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Backup> {
        let query = format!("SELECT {} FROM backups WHERE id = ?", BACKUP_COLUMNS);
        sqlx::query_as::<_, Backup>(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Backup not found".into()))
    }

    pub async fn update_status(&self, id: Uuid, status: BackupStatus) -> Result<()> {
        sqlx::query("UPDATE backups SET status = ?, updated_at = ? WHERE id = ?")
            .bind(status)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Stamp a scheduler-produced backup with its schedule.
    pub async fn update_status_and_schedule(
        &self,
        id: Uuid,
        status: BackupStatus,
        schedule_id: Uuid,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE backups SET status = ?, schedule_id = ?, updated_at = ? WHERE id = ?",
        )
        .bind(status)
        .bind(schedule_id)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn update_s3_object_key(&self, id: Uuid, object_key: &str) -> Result<()> {
        sqlx::query("UPDATE backups SET s3_object_key = ?, updated_at = ? WHERE id = ?")
            .bind(object_key)
            .bind(Utc::now())
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Terminal transition for a successful dump.
    pub async fn mark_completed(
        &self,
        id: Uuid,
        size_bytes: i64,
        completed_at: DateTime<Utc>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE backups SET status = ?, size_bytes = ?, completed_at = ?, updated_at = ? WHERE id = ?",
        )
        .bind(BackupStatus::Completed)
        .bind(size_bytes)
        .bind(completed_at)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn list_by_connection(&self, connection_id: Uuid) -> Result<Vec<Backup>> {
        let query = format!(
            "SELECT {} FROM backups WHERE connection_id = ? ORDER BY created_at DESC",
            BACKUP_COLUMNS
        );
        Ok(sqlx::query_as::<_, Backup>(&query)
            .bind(connection_id)
            .fetch_all(&self.db)
            .await?)
    }

    /// Completed backups created before the cutoff; in-progress and failed
    /// records are never eligible for retention.
    pub async fn older_than(
        &self,
        connection_id: Uuid,
        cutoff: DateTime<Utc>,
    ) -> Result<Vec<Backup>> {
        let query = format!(
            "SELECT {} FROM backups \
             WHERE connection_id = ? AND created_at < ? AND status = 'completed'",
            BACKUP_COLUMNS
        );
        Ok(sqlx::query_as::<_, Backup>(&query)
            .bind(connection_id)
            .bind(cutoff)
            .fetch_all(&self.db)
            .await?)
    }

    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM backups WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Paginated backups for a user, joined with connection metadata.
    /// `search` matches a case-insensitive substring of path or status.
    pub async fn list_paginated(
        &self,
        opts: &BackupListOptions,
    ) -> Result<(Vec<BackupListItem>, i64)> {
        let search = opts
            .search
            .as_deref()
            .filter(|s| !s.is_empty())
            .map(|s| format!("%{}%", s.to_lowercase()));

        let (total, items) = match &search {
            Some(pattern) => {
                let total: i64 = sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM backups b
                    INNER JOIN connections c ON b.connection_id = c.id
                    WHERE c.user_id = ?
                      AND (LOWER(b.local_path) LIKE ? OR LOWER(b.status) LIKE ?)
                    "#,
                )
                .bind(opts.user_id)
                .bind(pattern)
                .bind(pattern)
                .fetch_one(&self.db)
                .await?;

                let items = sqlx::query_as::<_, BackupListItem>(
                    r#"
                    SELECT b.id, b.connection_id, c.engine, c.database_name,
                           b.schedule_id, b.status, b.local_path, b.s3_object_key,
                           b.size_bytes, b.started_at, b.completed_at, b.created_at
                    FROM backups b
                    INNER JOIN connections c ON b.connection_id = c.id
                    WHERE c.user_id = ?
                      AND (LOWER(b.local_path) LIKE ? OR LOWER(b.status) LIKE ?)
                    ORDER BY b.created_at DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(opts.user_id)
                .bind(pattern)
                .bind(pattern)
                .bind(opts.limit)
                .bind(opts.offset)
                .fetch_all(&self.db)
                .await?;

                (total, items)
            }
            None => {
                let total: i64 = sqlx::query_scalar(
                    r#"
                    SELECT COUNT(*) FROM backups b
                    INNER JOIN connections c ON b.connection_id = c.id
                    WHERE c.user_id = ?
                    "#,
                )
                .bind(opts.user_id)
                .fetch_one(&self.db)
                .await?;

                let items = sqlx::query_as::<_, BackupListItem>(
                    r#"
                    SELECT b.id, b.connection_id, c.engine, c.database_name,
                           b.schedule_id, b.status, b.local_path, b.s3_object_key,
                           b.size_bytes, b.started_at, b.completed_at, b.created_at
                    FROM backups b
                    INNER JOIN connections c ON b.connection_id = c.id
                    WHERE c.user_id = ?
                    ORDER BY b.created_at DESC
                    LIMIT ? OFFSET ?
                    "#,
                )
                .bind(opts.user_id)
                .bind(opts.limit)
                .bind(opts.offset)
                .fetch_all(&self.db)
                .await?;

                (total, items)
            }
        };

        Ok((items, total))
    }

    pub async fn stats(&self, user_id: Uuid) -> Result<BackupStats> {
        let mut stats = BackupStats::default();

        let (total, failed, total_size): (i64, i64, i64) = sqlx::query_as(
            r#"
            SELECT
                COALESCE(COUNT(*), 0),
                COALESCE(SUM(CASE WHEN b.status != 'completed' THEN 1 ELSE 0 END), 0),
                COALESCE(SUM(b.size_bytes), 0)
            FROM backups b
            INNER JOIN connections c ON b.connection_id = c.id
            WHERE c.user_id = ?
            "#,
        )
        .bind(user_id)
        .fetch_one(&self.db)
        .await?;

        stats.total_backups = total;
        stats.failed_backups = failed;
        stats.total_size = total_size;

        if total > 0 {
            stats.success_rate_percent = (total - failed) as f64 / total as f64 * 100.0;
        }

        // Average duration over records carrying both timestamps.
        let spans: Vec<(DateTime<Utc>, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT b.started_at, b.completed_at
            FROM backups b
            INNER JOIN connections c ON b.connection_id = c.id
            WHERE c.user_id = ? AND b.status = 'completed' AND b.completed_at IS NOT NULL
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        if !spans.is_empty() {
            let total_minutes: f64 = spans
                .iter()
                .map(|(start, end)| (*end - *start).num_milliseconds() as f64 / 60_000.0)
                .sum();
            stats.avg_duration_minutes = total_minutes / spans.len() as f64;
        }

        Ok(stats)
    }

    // ------------------------------------------------------------------
    // Schedules
    // ------------------------------------------------------------------

    pub async fn create_schedule(&self, schedule: &BackupSchedule) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO backup_schedules (
                id, connection_id, enabled, cron_expr, retention_days,
                next_run_time, last_backup_time, created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(schedule.id)
        .bind(schedule.connection_id)
        .bind(schedule.enabled)
        .bind(&schedule.cron_expr)
        .bind(schedule.retention_days)
        .bind(schedule.next_run_time)
        .bind(schedule.last_backup_time)
        .bind(schedule.created_at)
        .bind(schedule.updated_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn update_schedule(&self, schedule: &BackupSchedule) -> Result<()> {
        sqlx::query(
            r#"
            UPDATE backup_schedules SET
                enabled = ?, cron_expr = ?, retention_days = ?,
                next_run_time = ?, last_backup_time = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(schedule.enabled)
        .bind(&schedule.cron_expr)
        .bind(schedule.retention_days)
        .bind(schedule.next_run_time)
        .bind(schedule.last_backup_time)
        .bind(Utc::now())
        .bind(schedule.id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn get_schedule(&self, id: Uuid) -> Result<BackupSchedule> {
        sqlx::query_as::<_, BackupSchedule>(
            "SELECT * FROM backup_schedules WHERE id = ?",
        )
        .bind(id)
        .fetch_optional(&self.db)
        .await?
        .ok_or_else(|| AppError::NotFound("Backup schedule not found".into()))
    }

    pub async fn find_schedule_by_connection(
        &self,
        connection_id: Uuid,
    ) -> Result<Option<BackupSchedule>> {
        Ok(sqlx::query_as::<_, BackupSchedule>(
            "SELECT * FROM backup_schedules WHERE connection_id = ?",
        )
        .bind(connection_id)
        .fetch_optional(&self.db)
        .await?)
    }

    pub async fn get_schedule_by_connection(&self, connection_id: Uuid) -> Result<BackupSchedule> {
        self.find_schedule_by_connection(connection_id)
            .await?
            .ok_or_else(|| AppError::NotFound("No schedule found for connection".into()))
    }

    pub async fn list_enabled_schedules(&self) -> Result<Vec<BackupSchedule>> {
        Ok(sqlx::query_as::<_, BackupSchedule>(
            "SELECT * FROM backup_schedules WHERE enabled = 1 ORDER BY created_at DESC",
        )
        .fetch_all(&self.db)
        .await?)
    }
}
