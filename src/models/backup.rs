//! Backup records and schedules.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

use super::connection::DatabaseEngine;

/// Backup status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum BackupStatus {
    InProgress,
    Completed,
    Failed,
}

impl std::fmt::Display for BackupStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BackupStatus::InProgress => write!(f, "in_progress"),
            BackupStatus::Completed => write!(f, "completed"),
            BackupStatus::Failed => write!(f, "failed"),
        }
    }
}

/// One dump attempt.
///
/// `local_path` is always populated but may point at a file that no longer
/// exists; a set `s3_object_key` means the object was uploaded at some point.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Backup {
    pub id: Uuid,
    pub connection_id: Uuid,
    /// Present iff produced by the scheduler.
    pub schedule_id: Option<Uuid>,
    pub status: BackupStatus,
    pub local_path: String,
    pub s3_object_key: Option<String>,
    pub size_bytes: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Durable cron entry for a connection.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BackupSchedule {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub enabled: bool,
    /// 6-field expression with seconds: sec min hour dom mon dow
    pub cron_expr: String,
    pub retention_days: i64,
    pub next_run_time: Option<DateTime<Utc>>,
    pub last_backup_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Backup list projection joined with its connection.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct BackupListItem {
    pub id: Uuid,
    pub connection_id: Uuid,
    pub engine: DatabaseEngine,
    pub database_name: String,
    pub schedule_id: Option<Uuid>,
    pub status: BackupStatus,
    pub local_path: String,
    pub s3_object_key: Option<String>,
    pub size_bytes: i64,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

/// Aggregate backup statistics for a user.
#[derive(Debug, Clone, Serialize)]
pub struct BackupStats {
    pub total_backups: i64,
    pub failed_backups: i64,
    pub total_size: i64,
    pub avg_duration_minutes: f64,
    pub success_rate_percent: f64,
}

impl Default for BackupStats {
    fn default() -> Self {
        Self {
            total_backups: 0,
            failed_backups: 0,
            total_size: 0,
            avg_duration_minutes: 0.0,
            // No backups means nothing has failed yet
            success_rate_percent: 100.0,
        }
    }
}

/// Request body for POST /backups.
#[derive(Debug, Deserialize)]
pub struct CreateBackupRequest {
    pub connection_id: Uuid,
}

/// Request body for POST /backups/schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct ScheduleBackupRequest {
    pub connection_id: Uuid,
    pub cron_expr: String,
    pub retention_days: i64,
}

/// Request body for PUT /backups/{connection_id}/schedule.
#[derive(Debug, Clone, Deserialize)]
pub struct UpdateScheduleRequest {
    pub cron_expr: String,
    pub retention_days: i64,
}

/// Request body for POST /backups/restore.
#[derive(Debug, Deserialize)]
pub struct RestoreRequest {
    pub backup_id: Uuid,
    pub connection_id: Uuid,
}

/// Pagination options for the backup list.
#[derive(Debug, Clone)]
pub struct BackupListOptions {
    pub user_id: Uuid,
    pub limit: i64,
    pub offset: i64,
    pub search: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backup_status_display() {
        assert_eq!(BackupStatus::InProgress.to_string(), "in_progress");
        assert_eq!(BackupStatus::Completed.to_string(), "completed");
        assert_eq!(BackupStatus::Failed.to_string(), "failed");
    }

    #[test]
    fn test_backup_status_serialization_roundtrip() {
        let status: BackupStatus = serde_json::from_str("\"in_progress\"").unwrap();
        assert_eq!(status, BackupStatus::InProgress);
        assert_eq!(
            serde_json::to_string(&BackupStatus::Completed).unwrap(),
            "\"completed\""
        );
    }

    #[test]
    fn test_stats_default_success_rate_is_full() {
        let stats = BackupStats::default();
        assert_eq!(stats.total_backups, 0);
        assert_eq!(stats.success_rate_percent, 100.0);
    }
}
