//! API module - HTTP handlers and middleware.

pub mod handlers;
pub mod middleware;
pub mod routes;

use sqlx::SqlitePool;
use std::sync::Arc;

use crate::config::Config;
use crate::services::auth_service::AuthService;
use crate::services::backup_service::{BackupService, S3FolderMaintenance};
use crate::services::connection_store::ConnectionStore;
use crate::services::notification_service::NotificationService;
use crate::services::settings_service::SettingsService;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Config,
    pub db: SqlitePool,
    pub auth: AuthService,
    pub connections: ConnectionStore,
    pub settings: SettingsService,
    pub notifications: NotificationService,
    pub backups: Arc<BackupService>,
    /// Narrow S3 upkeep interface the connection handlers consume
    /// (implemented by the backup orchestrator).
    pub s3_maintenance: Arc<dyn S3FolderMaintenance>,
}

impl AppState {
    pub fn new(
        config: Config,
        db: SqlitePool,
        auth: AuthService,
        connections: ConnectionStore,
        settings: SettingsService,
        notifications: NotificationService,
        backups: Arc<BackupService>,
    ) -> Self {
        let s3_maintenance: Arc<dyn S3FolderMaintenance> = backups.clone();
        Self {
            config,
            db,
            auth,
            connections,
            settings,
            notifications,
            backups,
            s3_maintenance,
        }
    }
}

pub type SharedState = Arc<AppState>;
