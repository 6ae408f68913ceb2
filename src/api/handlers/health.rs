//! Liveness probe with a database ping.

use axum::{extract::State, Json};
use serde_json::json;

use crate::api::SharedState;
use crate::error::Result;

pub async fn health(State(state): State<SharedState>) -> Result<Json<serde_json::Value>> {
    sqlx::query_scalar::<_, i64>("SELECT 1")
        .fetch_one(&state.db)
        .await?;

    Ok(Json(json!({ "status": "ok" })))
}
