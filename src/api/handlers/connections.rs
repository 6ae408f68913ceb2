//! Connection endpoints.
//!
//! Deleting or renaming a connection triggers best-effort S3 upkeep through
//! the orchestrator's maintenance interface; storage errors never block the
//! connection change itself.

use axum::{
    extract::{Path, Query, State},
    Extension, Json,
};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use crate::api::middleware::AuthExtension;
use crate::api::SharedState;
use crate::error::Result;
use crate::models::connection::{
    Connection, ConnectionListItem, ConnectionRequest, UpdateConnectionSettingsRequest,
    UpdateSelectedDatabasesRequest,
};

fn connection_from_request(req: &ConnectionRequest, user_id: Uuid, existing: Option<&Connection>) -> Connection {
    let now = Utc::now();
    Connection {
        id: req.id.unwrap_or_else(Uuid::new_v4),
        name: req.name.clone(),
        engine: req.engine,
        host: req.host.clone(),
        port: req.port,
        username: req.username.clone(),
        password: req.password.clone(),
        database_name: req.database.clone(),
        selected_databases: existing
            .map(|e| e.selected_databases.clone())
            .unwrap_or_default(),
        ssl: req.ssl,
        ssh_enabled: req.ssh_enabled,
        ssh_host: req.ssh_host.clone(),
        ssh_port: req.ssh_port,
        ssh_username: req.ssh_username.clone(),
        ssh_password: req.ssh_password.clone(),
        ssh_private_key: req.ssh_private_key.clone(),
        s3_cleanup_on_retention: req
            .s3_cleanup_on_retention
            .or(existing.map(|e| e.s3_cleanup_on_retention))
            .unwrap_or(true),
        database_size: existing.map(|e| e.database_size).unwrap_or(0),
        status: "connected".into(),
        user_id,
        created_at: existing.map(|e| e.created_at).unwrap_or(now),
        updated_at: now,
    }
}

pub async fn save_connection(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(req): Json<ConnectionRequest>,
) -> Result<Json<Connection>> {
    req.validate()?;

    let conn = connection_from_request(&req, auth.user_id, None);
    state.connections.save(&conn).await?;
    Ok(Json(conn))
}

pub async fn list_connections(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<Json<Vec<ConnectionListItem>>> {
    let connections = state.connections.list_for_user(auth.user_id).await?;
    Ok(Json(connections))
}

pub async fn get_connection(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Connection>> {
    let conn = state.connections.get(id).await?;
    Ok(Json(conn))
}

pub async fn update_connection(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(req): Json<ConnectionRequest>,
) -> Result<Json<Connection>> {
    req.validate()?;

    let id = req
        .id
        .ok_or_else(|| crate::error::AppError::Validation("id is required".into()))?;
    let existing = state.connections.get(id).await?;

    let conn = connection_from_request(&req, auth.user_id, Some(&existing));
    state.connections.update(&conn).await?;

    // Keep mirrored objects under the renamed folder; a storage failure is
    // only a warning.
    if existing.name != conn.name {
        if let Err(e) = state
            .s3_maintenance
            .rename_s3_folder_for_connection(id, &existing.name, &conn.name)
            .await
        {
            tracing::warn!(connection_id = %id, error = %e, "S3 folder rename failed");
        }
    }

    Ok(Json(conn))
}

#[derive(Debug, Deserialize)]
pub struct DeleteQuery {
    /// When true, mirrored S3 objects are removed as well.
    #[serde(default)]
    pub remove_s3: bool,
}

pub async fn delete_connection(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Query(query): Query<DeleteQuery>,
) -> Result<Json<serde_json::Value>> {
    state.backups.forget_jobs_for_connection(id).await;

    if query.remove_s3 {
        if let Err(e) = state.s3_maintenance.cleanup_s3_for_connection(id).await {
            tracing::warn!(connection_id = %id, error = %e, "S3 cleanup failed");
        }
    }

    state.connections.delete(id).await?;
    Ok(Json(json!({ "message": "Connection deleted successfully" })))
}

pub async fn update_selected_databases(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateSelectedDatabasesRequest>,
) -> Result<Json<serde_json::Value>> {
    state
        .connections
        .update_selected_databases(id, &req.databases)
        .await?;
    Ok(Json(json!({ "message": "Selected databases updated successfully" })))
}

pub async fn update_connection_settings(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
    Json(req): Json<UpdateConnectionSettingsRequest>,
) -> Result<Json<serde_json::Value>> {
    if let Some(cleanup) = req.s3_cleanup_on_retention {
        state.connections.update_s3_cleanup_flag(id, cleanup).await?;
    }
    Ok(Json(json!({ "message": "Connection settings updated successfully" })))
}
