//! Velld API server - main entry point.

use std::net::SocketAddr;
use std::sync::Arc;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use velld_api::api::{self, routes};
use velld_api::config::Config;
use velld_api::db;
use velld_api::error::Result;
use velld_api::services::auth_service::AuthService;
use velld_api::services::backup_service::BackupService;
use velld_api::services::backup_store::BackupStore;
use velld_api::services::connection_store::ConnectionStore;
use velld_api::services::encryption::EncryptionService;
use velld_api::services::notification_service::NotificationService;
use velld_api::services::settings_service::SettingsService;

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "velld_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // Load configuration
    let config = Config::from_env()?;
    tracing::info!("Starting Velld backup orchestrator");

    // Connect to database
    let db_pool = db::create_pool(&config.database_path).await?;
    tracing::info!("Connected to database");

    // Run migrations
    sqlx::migrate!("./migrations").run(&db_pool).await?;
    tracing::info!("Database migrations complete");

    // Credential vault, loaded once for the whole process
    let vault = EncryptionService::new(&config.encryption_key);

    let connections = ConnectionStore::new(db_pool.clone(), vault.clone());
    let settings = SettingsService::new(db_pool.clone(), vault.clone());
    let notifications = NotificationService::new(db_pool.clone());
    let auth = AuthService::new(db_pool.clone(), &config);

    let backups = BackupService::new(
        connections.clone(),
        BackupStore::new(db_pool.clone()),
        settings.clone(),
        notifications.clone(),
        config.backup_dir.clone(),
    );

    // Re-register enabled schedules and run missed-run recovery
    backups.recover_schedules().await?;
    tracing::info!("Backup schedules recovered");

    // Create application state and router
    let state = Arc::new(api::AppState::new(
        config.clone(),
        db_pool,
        auth,
        connections,
        settings,
        notifications,
        backups,
    ));
    let app = routes::create_router(state);

    // Start server
    let addr: SocketAddr = config.bind_address.parse()?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
