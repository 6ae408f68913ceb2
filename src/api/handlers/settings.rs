//! User settings endpoints.

use axum::{extract::State, Extension, Json};

use crate::api::middleware::AuthExtension;
use crate::api::SharedState;
use crate::error::Result;
use crate::models::settings::{UpdateSettingsRequest, UserSettings};

pub async fn get_settings(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<Json<UserSettings>> {
    let settings = state.settings.get(auth.user_id).await?;
    Ok(Json(settings))
}

pub async fn update_settings(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
    Json(req): Json<UpdateSettingsRequest>,
) -> Result<Json<UserSettings>> {
    let settings = state.settings.update(auth.user_id, &req).await?;
    Ok(Json(settings))
}
