//! Thin HTTP adapters over the orchestrator and stores.

pub mod auth;
pub mod backups;
pub mod connections;
pub mod health;
pub mod notifications;
pub mod settings;

use serde::Serialize;

/// Envelope for paginated list responses.
#[derive(Debug, Serialize)]
pub struct Paginated<T> {
    pub data: Vec<T>,
    pub total: i64,
    pub page: i64,
    pub limit: i64,
}
