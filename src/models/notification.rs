//! Persisted user-feed notifications.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum NotificationType {
    BackupFailed,
    BackupCompleted,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, sqlx::Type)]
#[sqlx(rename_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum NotificationStatus {
    Unread,
    Read,
}

#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Notification {
    pub id: Uuid,
    pub user_id: Uuid,
    pub title: String,
    pub message: String,
    #[sqlx(rename = "type")]
    #[serde(rename = "type")]
    pub kind: NotificationType,
    pub status: NotificationStatus,
    /// Structured context such as connection_id and error text.
    pub metadata: Option<serde_json::Value>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Request body for POST /notifications/mark-read and DELETE /notifications.
#[derive(Debug, Deserialize)]
pub struct NotificationIdsRequest {
    pub ids: Vec<Uuid>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_serialization() {
        assert_eq!(
            serde_json::to_string(&NotificationType::BackupFailed).unwrap(),
            "\"backup_failed\""
        );
        assert_eq!(
            serde_json::to_string(&NotificationStatus::Unread).unwrap(),
            "\"unread\""
        );
    }

    #[test]
    fn test_kind_renamed_to_type_in_json() {
        let n = Notification {
            id: Uuid::new_v4(),
            user_id: Uuid::new_v4(),
            title: "Backup Failed".into(),
            message: "dump failed".into(),
            kind: NotificationType::BackupFailed,
            status: NotificationStatus::Unread,
            metadata: None,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        };
        let json = serde_json::to_value(&n).unwrap();
        assert_eq!(json["type"], "backup_failed");
        assert!(json.get("kind").is_none());
    }
}
