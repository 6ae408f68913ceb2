//! Cron scheduling and retention for the backup orchestrator.
//!
//! Each enabled schedule owns a tokio task that sleeps until the next
//! second-resolution cron fire (UTC) and awaits the firing, so firings of
//! one schedule serialize while distinct schedules run concurrently. Job
//! handles live in the orchestrator's mutex-guarded map and never leak out.

use chrono::{Duration, Utc};
use cron::Schedule;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::backup::{BackupSchedule, ScheduleBackupRequest, UpdateScheduleRequest};
use crate::models::notification::NotificationType;
use crate::services::backup_service::BackupService;
use crate::storage::spool::LocalSpool;

impl BackupService {
    /// Parse a 6-field cron expression (sec min hour dom mon dow).
    pub(crate) fn parse_cron(expr: &str) -> Result<Schedule> {
        Schedule::from_str(expr.trim())
            .map_err(|e| AppError::BadCron(format!("'{}': {}", expr, e)))
    }

    /// Startup recovery: re-register every enabled schedule and run at most
    /// one catch-up backup per schedule whose `next_run_time` already passed.
    pub async fn recover_schedules(self: &Arc<Self>) -> Result<()> {
        let schedules = self.store.list_enabled_schedules().await?;
        let now = Utc::now();

        for schedule in schedules {
            if let Some(next_run) = schedule.next_run_time {
                if next_run < now {
                    tracing::info!(
                        schedule_id = %schedule.id,
                        missed = %next_run,
                        "Recovering missed scheduled backup"
                    );
                    let service = Arc::downgrade(self);
                    let missed = schedule.clone();
                    tokio::spawn(async move {
                        if let Some(service) = service.upgrade() {
                            service.execute_scheduled_run(&missed).await;
                        }
                    });
                }
            }

            match Self::parse_cron(&schedule.cron_expr) {
                Ok(cron_schedule) => self.register_job(schedule.id, cron_schedule),
                Err(e) => {
                    tracing::error!(
                        schedule_id = %schedule.id,
                        error = %e,
                        "Skipping schedule with invalid cron expression"
                    );
                }
            }
        }

        Ok(())
    }

    /// Upsert: an existing schedule for the connection is re-enabled and
    /// overwritten, otherwise a new one is created.
    pub async fn schedule_backup(self: &Arc<Self>, req: &ScheduleBackupRequest) -> Result<()> {
        if req.retention_days <= 0 {
            return Err(AppError::Validation(
                "retention_days must be greater than 0".into(),
            ));
        }

        let cron_schedule = Self::parse_cron(&req.cron_expr)?;
        let next_run = cron_schedule.upcoming(Utc).next();
        let now = Utc::now();

        let schedule = match self
            .store
            .find_schedule_by_connection(req.connection_id)
            .await?
        {
            Some(mut existing) => {
                existing.enabled = true;
                existing.cron_expr = req.cron_expr.clone();
                existing.retention_days = req.retention_days;
                existing.next_run_time = next_run;
                existing.updated_at = now;
                self.store.update_schedule(&existing).await?;
                existing
            }
            None => {
                let schedule = BackupSchedule {
                    id: Uuid::new_v4(),
                    connection_id: req.connection_id,
                    enabled: true,
                    cron_expr: req.cron_expr.clone(),
                    retention_days: req.retention_days,
                    next_run_time: next_run,
                    last_backup_time: None,
                    created_at: now,
                    updated_at: now,
                };
                self.store.create_schedule(&schedule).await?;
                schedule
            }
        };

        self.remove_job(schedule.id);
        self.register_job(schedule.id, cron_schedule);
        Ok(())
    }

    pub async fn update_backup_schedule(
        self: &Arc<Self>,
        connection_id: Uuid,
        req: &UpdateScheduleRequest,
    ) -> Result<()> {
        if req.retention_days <= 0 {
            return Err(AppError::Validation(
                "retention_days must be greater than 0".into(),
            ));
        }

        let mut schedule = self.store.get_schedule_by_connection(connection_id).await?;
        let cron_schedule = Self::parse_cron(&req.cron_expr)?;

        schedule.cron_expr = req.cron_expr.clone();
        schedule.retention_days = req.retention_days;
        schedule.next_run_time = cron_schedule.upcoming(Utc).next();
        schedule.updated_at = Utc::now();
        self.store.update_schedule(&schedule).await?;

        self.remove_job(schedule.id);
        self.register_job(schedule.id, cron_schedule);
        Ok(())
    }

    pub async fn disable_backup_schedule(&self, connection_id: Uuid) -> Result<()> {
        let mut schedule = self.store.get_schedule_by_connection(connection_id).await?;

        self.remove_job(schedule.id);

        schedule.enabled = false;
        schedule.updated_at = Utc::now();
        self.store.update_schedule(&schedule).await?;
        Ok(())
    }

    /// Drop the cron job of a connection about to be deleted. The schedule
    /// row itself goes away with the connection's cascade.
    pub async fn forget_jobs_for_connection(&self, connection_id: Uuid) {
        match self.store.find_schedule_by_connection(connection_id).await {
            Ok(Some(schedule)) => self.remove_job(schedule.id),
            Ok(None) => {}
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Failed to look up schedule for job removal");
            }
        }
    }

    pub(crate) fn register_job(self: &Arc<Self>, schedule_id: Uuid, cron_schedule: Schedule) {
        let service = Arc::downgrade(self);

        let handle = tokio::spawn(async move {
            loop {
                let now = Utc::now();
                let Some(next) = cron_schedule.after(&now).next() else {
                    break;
                };
                let wait = (next - now).to_std().unwrap_or_default();
                tokio::time::sleep(wait).await;

                let Some(service) = service.upgrade() else {
                    break;
                };

                // Reload so edits since registration are honored; a deleted
                // or disabled schedule retires the job.
                let schedule = match service.store.get_schedule(schedule_id).await {
                    Ok(schedule) if schedule.enabled => schedule,
                    _ => break,
                };

                service.execute_scheduled_run(&schedule).await;
            }
        });

        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(previous) = jobs.insert(schedule_id, handle) {
            previous.abort();
        }
    }

    pub(crate) fn remove_job(&self, schedule_id: Uuid) {
        let mut jobs = self.jobs.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(handle) = jobs.remove(&schedule_id) {
            handle.abort();
        }
    }

    /// One firing. Every error is caught here; a firing never takes the
    /// engine down.
    pub(crate) async fn execute_scheduled_run(&self, schedule: &BackupSchedule) {
        match self.create_backup(schedule.connection_id).await {
            Ok(backup) => {
                if let Err(e) = self
                    .store
                    .update_status_and_schedule(backup.id, backup.status, schedule.id)
                    .await
                {
                    tracing::error!(backup_id = %backup.id, error = %e, "Failed to stamp backup with schedule");
                }
            }
            Err(e) => {
                tracing::error!(
                    connection_id = %schedule.connection_id,
                    error = %e,
                    "Scheduled backup failed"
                );
                self.notify_backup_failed(schedule.connection_id, &e).await;
            }
        }

        let now = Utc::now();
        let mut updated = schedule.clone();
        if let Ok(cron_schedule) = Self::parse_cron(&schedule.cron_expr) {
            updated.next_run_time = cron_schedule.after(&now).next();
        }
        updated.last_backup_time = Some(now);
        updated.updated_at = now;
        if let Err(e) = self.store.update_schedule(&updated).await {
            tracing::error!(schedule_id = %schedule.id, error = %e, "Failed to update schedule after run");
        }

        if schedule.retention_days > 0 {
            self.cleanup_old_backups(schedule.connection_id, schedule.retention_days)
                .await;
        }
    }

    async fn notify_backup_failed(&self, connection_id: Uuid, error: &AppError) {
        let conn = match self.connections.get(connection_id).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::warn!(connection_id = %connection_id, error = %e, "Cannot notify: connection lookup failed");
                return;
            }
        };

        let metadata = serde_json::json!({
            "connection_id": connection_id,
            "database_type": conn.engine,
            "database_name": conn.database_name,
            "error": error.to_string(),
        });

        if let Err(e) = self
            .notifications
            .create(
                conn.user_id,
                "Backup Failed",
                &error.to_string(),
                NotificationType::BackupFailed,
                Some(metadata),
            )
            .await
        {
            tracing::error!(connection_id = %connection_id, error = %e, "Failed to create failure notification");
        }
    }

    /// Retention GC for one connection: completed backups older than the
    /// cutoff lose their S3 object (when the connection opts in), their
    /// local file, then their record. In-progress records are untouched.
    pub async fn cleanup_old_backups(&self, connection_id: Uuid, retention_days: i64) {
        let cutoff = Utc::now() - Duration::days(retention_days);

        let old_backups = match self.store.older_than(connection_id, cutoff).await {
            Ok(backups) => backups,
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "Failed to fetch backups for retention");
                return;
            }
        };
        if old_backups.is_empty() {
            return;
        }

        let conn = match self.connections.get(connection_id).await {
            Ok(conn) => conn,
            Err(e) => {
                tracing::error!(connection_id = %connection_id, error = %e, "Failed to load connection for retention");
                return;
            }
        };

        let has_mirrored = old_backups
            .iter()
            .any(|b| b.s3_object_key.as_deref().is_some_and(|k| !k.is_empty()));
        let mirror = if conn.s3_cleanup_on_retention && has_mirrored {
            self.mirror_for_user(conn.user_id).await
        } else {
            None
        };

        for backup in &old_backups {
            if let (Some(key), Some(mirror)) = (
                backup.s3_object_key.as_deref().filter(|k| !k.is_empty()),
                mirror.as_ref(),
            ) {
                match mirror.delete_file(key).await {
                    Ok(()) => {
                        tracing::debug!(key = %key, backup_id = %backup.id, "Deleted S3 object (retention)")
                    }
                    Err(e) => {
                        tracing::warn!(key = %key, backup_id = %backup.id, error = %e, "Failed to delete S3 object (retention)")
                    }
                }
            }

            let local_path = Path::new(&backup.local_path);
            if tokio::fs::try_exists(local_path).await.unwrap_or(false) {
                LocalSpool::remove_file(local_path).await;
            }

            if let Err(e) = self.store.delete(backup.id).await {
                tracing::error!(backup_id = %backup.id, error = %e, "Failed to delete backup record (retention)");
            }
        }

        tracing::info!(
            connection_id = %connection_id,
            processed = old_backups.len(),
            "Retention cleanup completed"
        );
    }
}
