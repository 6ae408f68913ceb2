//! Backup endpoints: on-demand dumps, listing, download, restore,
//! scheduling and pairwise comparison.

use axum::{
    extract::{Path, Query, State},
    http::header,
    response::IntoResponse,
    Extension, Json,
};
use serde::Deserialize;
use serde_json::json;
use uuid::Uuid;

use super::Paginated;
use crate::api::middleware::AuthExtension;
use crate::api::SharedState;
use crate::error::{AppError, Result};
use crate::models::backup::{
    Backup, BackupListItem, BackupListOptions, BackupStats, CreateBackupRequest, RestoreRequest,
    ScheduleBackupRequest, UpdateScheduleRequest,
};
use crate::services::diff_service::{self, DiffResponse};
use crate::storage::spool::LocalSpool;

pub async fn create_backup(
    State(state): State<SharedState>,
    Json(req): Json<CreateBackupRequest>,
) -> Result<Json<Backup>> {
    let backup = state.backups.create_backup(req.connection_id).await?;
    Ok(Json(backup))
}

pub async fn get_backup(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Backup>> {
    let backup = state.backups.get_backup(id).await?;
    Ok(Json(backup))
}

#[derive(Debug, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub search: Option<String>,
}

pub async fn list_backups(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Paginated<BackupListItem>>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let opts = BackupListOptions {
        user_id: auth.user_id,
        limit,
        offset: (page - 1) * limit,
        search: query.search,
    };

    let (data, total) = state.backups.list_backups(&opts).await?;
    Ok(Json(Paginated {
        data,
        total,
        page,
        limit,
    }))
}

pub async fn backup_stats(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<Json<BackupStats>> {
    let stats = state.backups.backup_stats(auth.user_id).await?;
    Ok(Json(stats))
}

pub async fn download_backup(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse> {
    let backup = state.backups.get_backup(id).await?;

    let (file_path, is_temp) = state
        .backups
        .ensure_file_available(&backup, auth.user_id)
        .await?;

    let content = tokio::fs::read(&file_path).await;

    if is_temp {
        LocalSpool::remove_file(&file_path).await;
    }

    let content = content?;
    let filename = std::path::Path::new(&backup.local_path)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "backup.sql".to_string());

    Ok((
        [
            (header::CONTENT_TYPE, "application/octet-stream".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename={}", filename),
            ),
        ],
        content,
    ))
}

pub async fn restore_backup(
    State(state): State<SharedState>,
    Json(req): Json<RestoreRequest>,
) -> Result<Json<serde_json::Value>> {
    state
        .backups
        .restore_backup(req.backup_id, req.connection_id)
        .await?;
    Ok(Json(json!({ "message": "Backup restored successfully" })))
}

pub async fn schedule_backup(
    State(state): State<SharedState>,
    Json(req): Json<ScheduleBackupRequest>,
) -> Result<Json<serde_json::Value>> {
    state.backups.schedule_backup(&req).await?;
    Ok(Json(json!({ "message": "Backup scheduled successfully" })))
}

pub async fn update_schedule(
    State(state): State<SharedState>,
    Path(connection_id): Path<Uuid>,
    Json(req): Json<UpdateScheduleRequest>,
) -> Result<Json<serde_json::Value>> {
    state
        .backups
        .update_backup_schedule(connection_id, &req)
        .await?;
    Ok(Json(json!({ "message": "Backup schedule updated successfully" })))
}

pub async fn disable_schedule(
    State(state): State<SharedState>,
    Path(connection_id): Path<Uuid>,
) -> Result<Json<serde_json::Value>> {
    state.backups.disable_backup_schedule(connection_id).await?;
    Ok(Json(json!({ "message": "Backup schedule disabled successfully" })))
}

pub async fn compare_backups(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Path((source_id, target_id)): Path<(Uuid, Uuid)>,
) -> Result<Json<DiffResponse>> {
    let source = state.backups.get_backup(source_id).await?;
    let target = state.backups.get_backup(target_id).await?;

    let (source_path, source_temp) = state
        .backups
        .ensure_file_available(&source, auth.user_id)
        .await?;

    let (target_path, target_temp) = match state
        .backups
        .ensure_file_available(&target, auth.user_id)
        .await
    {
        Ok(available) => available,
        Err(e) => {
            if source_temp {
                LocalSpool::remove_file(&source_path).await;
            }
            return Err(e);
        }
    };

    let source_content = tokio::fs::read_to_string(&source_path).await;
    let target_content = tokio::fs::read_to_string(&target_path).await;

    if source_temp {
        LocalSpool::remove_file(&source_path).await;
    }
    if target_temp {
        LocalSpool::remove_file(&target_path).await;
    }

    let diff = match (source_content, target_content) {
        (Ok(source_content), Ok(target_content)) => {
            diff_service::generate_diff(&source_content, &target_content)
        }
        (Err(e), _) | (_, Err(e)) => return Err(AppError::Io(e)),
    };

    Ok(Json(diff))
}
