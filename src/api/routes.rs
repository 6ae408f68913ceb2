//! Route definitions for the API.

use axum::{
    middleware,
    routing::{get, post, put},
    Router,
};
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;

use super::handlers::{auth, backups, connections, health, notifications, settings};
use super::middleware::auth_middleware;
use super::SharedState;

/// Create the main API router
pub fn create_router(state: SharedState) -> Router {
    let public = Router::new()
        .route("/auth/register", post(auth::register))
        .route("/auth/login", post(auth::login));

    let protected = Router::new()
        .route("/auth/profile", get(auth::profile))
        .route(
            "/connections",
            post(connections::save_connection)
                .get(connections::list_connections)
                .put(connections::update_connection),
        )
        .route(
            "/connections/:id",
            get(connections::get_connection).delete(connections::delete_connection),
        )
        .route(
            "/connections/:id/databases",
            put(connections::update_selected_databases),
        )
        .route(
            "/connections/:id/settings",
            post(connections::update_connection_settings),
        )
        .route(
            "/backups",
            post(backups::create_backup).get(backups::list_backups),
        )
        .route("/backups/stats", get(backups::backup_stats))
        .route("/backups/schedule", post(backups::schedule_backup))
        .route("/backups/restore", post(backups::restore_backup))
        .route(
            "/backups/compare/:source_id/:target_id",
            get(backups::compare_backups),
        )
        .route("/backups/:id", get(backups::get_backup))
        .route("/backups/:id/download", get(backups::download_backup))
        .route("/backups/:id/schedule", put(backups::update_schedule))
        .route(
            "/backups/:id/schedule/disable",
            post(backups::disable_schedule),
        )
        .route(
            "/notifications",
            get(notifications::list_notifications).delete(notifications::delete_notifications),
        )
        .route("/notifications/mark-read", post(notifications::mark_read))
        .route(
            "/settings",
            get(settings::get_settings).put(settings::update_settings),
        )
        .layer(middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ));

    Router::new()
        .route("/health", get(health::health))
        .nest("/api", public.merge(protected))
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
