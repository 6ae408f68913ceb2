//! Persisted user-feed notifications.

use chrono::{Duration, Utc};
use sqlx::SqlitePool;
use uuid::Uuid;

use crate::error::Result;
use crate::models::notification::{Notification, NotificationStatus, NotificationType};

#[derive(Clone)]
pub struct NotificationService {
    db: SqlitePool,
}

impl NotificationService {
    pub fn new(db: SqlitePool) -> Self {
        Self { db }
    }

    pub async fn create(
        &self,
        user_id: Uuid,
        title: &str,
        message: &str,
        kind: NotificationType,
        metadata: Option<serde_json::Value>,
    ) -> Result<Notification> {
        let now = Utc::now();
        let notification = Notification {
            id: Uuid::new_v4(),
            user_id,
            title: title.to_string(),
            message: message.to_string(),
            kind,
            status: NotificationStatus::Unread,
            metadata,
            created_at: now,
            updated_at: now,
        };

        sqlx::query(
            r#"
            INSERT INTO notifications
                (id, user_id, title, message, type, status, metadata, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(notification.id)
        .bind(notification.user_id)
        .bind(&notification.title)
        .bind(&notification.message)
        .bind(notification.kind)
        .bind(notification.status)
        .bind(&notification.metadata)
        .bind(notification.created_at)
        .bind(notification.updated_at)
        .execute(&self.db)
        .await?;

        Ok(notification)
    }

    /// Feed query: everything unread plus read items from the last 7 days,
    /// unread first, then newest-first, capped at 50.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<Notification>> {
        let cutoff = Utc::now() - Duration::days(7);

        Ok(sqlx::query_as::<_, Notification>(
            r#"
            SELECT id, user_id, title, message, type, status, metadata,
                   created_at, updated_at
            FROM notifications
            WHERE user_id = ? AND (status = 'unread' OR created_at > ?)
            ORDER BY
                CASE WHEN status = 'unread' THEN 0 ELSE 1 END,
                created_at DESC
            LIMIT 50
            "#,
        )
        .bind(user_id)
        .bind(cutoff)
        .fetch_all(&self.db)
        .await?)
    }

    pub async fn mark_read(&self, user_id: Uuid, ids: &[Uuid]) -> Result<()> {
        for id in ids {
            sqlx::query(
                "UPDATE notifications SET status = ?, updated_at = ? WHERE user_id = ? AND id = ?",
            )
            .bind(NotificationStatus::Read)
            .bind(Utc::now())
            .bind(user_id)
            .bind(id)
            .execute(&self.db)
            .await?;
        }
        Ok(())
    }

    pub async fn delete(&self, user_id: Uuid, ids: &[Uuid]) -> Result<()> {
        for id in ids {
            sqlx::query("DELETE FROM notifications WHERE user_id = ? AND id = ?")
                .bind(user_id)
                .bind(id)
                .execute(&self.db)
                .await?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::memory_pool;
    use crate::services::connection_store::tests::insert_user;

    async fn backdate(pool: &SqlitePool, id: Uuid, days: i64) {
        sqlx::query("UPDATE notifications SET created_at = ? WHERE id = ?")
            .bind(Utc::now() - Duration::days(days))
            .bind(id)
            .execute(pool)
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_feed_orders_unread_first() {
        let pool = memory_pool().await;
        let service = NotificationService::new(pool.clone());
        let user_id = insert_user(&pool).await;

        let older_unread = service
            .create(user_id, "Backup Failed", "boom", NotificationType::BackupFailed, None)
            .await
            .unwrap();
        backdate(&pool, older_unread.id, 1).await;

        let newer_read = service
            .create(user_id, "Backup Completed", "ok", NotificationType::BackupCompleted, None)
            .await
            .unwrap();
        service.mark_read(user_id, &[newer_read.id]).await.unwrap();

        let feed = service.list_for_user(user_id).await.unwrap();
        assert_eq!(feed.len(), 2);
        assert_eq!(feed[0].id, older_unread.id);
        assert_eq!(feed[1].id, newer_read.id);
    }

    #[tokio::test]
    async fn test_feed_drops_read_items_older_than_a_week() {
        let pool = memory_pool().await;
        let service = NotificationService::new(pool.clone());
        let user_id = insert_user(&pool).await;

        let stale_read = service
            .create(user_id, "old", "old", NotificationType::BackupCompleted, None)
            .await
            .unwrap();
        service.mark_read(user_id, &[stale_read.id]).await.unwrap();
        backdate(&pool, stale_read.id, 8).await;

        let stale_unread = service
            .create(user_id, "older", "unread survives", NotificationType::BackupFailed, None)
            .await
            .unwrap();
        backdate(&pool, stale_unread.id, 30).await;

        let feed = service.list_for_user(user_id).await.unwrap();
        assert_eq!(feed.len(), 1);
        assert_eq!(feed[0].id, stale_unread.id);
    }

    #[tokio::test]
    async fn test_metadata_roundtrip() {
        let pool = memory_pool().await;
        let service = NotificationService::new(pool.clone());
        let user_id = insert_user(&pool).await;

        let metadata = serde_json::json!({
            "connection_id": "abc",
            "database_type": "postgresql",
            "error": "dump failed",
        });
        service
            .create(
                user_id,
                "Backup Failed",
                "dump failed",
                NotificationType::BackupFailed,
                Some(metadata.clone()),
            )
            .await
            .unwrap();

        let feed = service.list_for_user(user_id).await.unwrap();
        assert_eq!(feed[0].metadata.as_ref().unwrap(), &metadata);
    }

    #[tokio::test]
    async fn test_delete_scoped_to_user() {
        let pool = memory_pool().await;
        let service = NotificationService::new(pool.clone());
        let owner = insert_user(&pool).await;
        let other = insert_user(&pool).await;

        let n = service
            .create(owner, "t", "m", NotificationType::BackupFailed, None)
            .await
            .unwrap();

        // A different user cannot delete someone else's notification
        service.delete(other, &[n.id]).await.unwrap();
        assert_eq!(service.list_for_user(owner).await.unwrap().len(), 1);

        service.delete(owner, &[n.id]).await.unwrap();
        assert!(service.list_for_user(owner).await.unwrap().is_empty());
    }
}
