//! Notification feed endpoints.

use axum::{extract::State, Extension, Json};
use serde_json::json;

use crate::api::middleware::AuthExtension;
use crate::api::SharedState;
use crate::error::Result;
use crate::models::notification::{Notification, NotificationIdsRequest};

pub async fn list_notifications(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<Json<Vec<Notification>>> {
    let feed = state.notifications.list_for_user(auth.user_id).await?;
    Ok(Json(feed))
}

pub async fn mark_read(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(req): Json<NotificationIdsRequest>,
) -> Result<Json<serde_json::Value>> {
    state.notifications.mark_read(auth.user_id, &req.ids).await?;
    Ok(Json(json!({ "message": "Notifications marked as read" })))
}

pub async fn delete_notifications(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(req): Json<NotificationIdsRequest>,
) -> Result<Json<serde_json::Value>> {
    state.notifications.delete(auth.user_id, &req.ids).await?;
    Ok(Json(json!({ "message": "Notifications deleted" })))
}
