//! Registration, login and profile.

use axum::{extract::State, Extension, Json};

use crate::api::middleware::AuthExtension;
use crate::api::SharedState;
use crate::error::Result;
use crate::models::user::{LoginRequest, RegisterRequest, TokenResponse, User};

pub async fn register(
    State(state): State<SharedState>,
    Json(req): Json<RegisterRequest>,
) -> Result<Json<TokenResponse>> {
    let response = state.auth.register(&req).await?;
    Ok(Json(response))
}

pub async fn login(
    State(state): State<SharedState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<TokenResponse>> {
    let response = state.auth.login(&req).await?;
    Ok(Json(response))
}

pub async fn profile(
    State(state): State<SharedState>,
    Extension(auth): Extension<AuthExtension>,
) -> Result<Json<User>> {
    let user = state.auth.get_user(auth.user_id).await?;
    Ok(Json(user))
}
