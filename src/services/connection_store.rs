//! Durable store of target database connections.
//!
//! Credentials (username, password, SSH password, SSH private key) are
//! vault-encrypted on write and decrypted on read; plaintext secrets never
//! reach the table.

use chrono::{DateTime, Utc};
use sqlx::{FromRow, SqlitePool};
use uuid::Uuid;

use crate::error::{AppError, Result};
use crate::models::connection::{Connection, ConnectionListItem, DatabaseEngine};
use crate::services::encryption::EncryptionService;

#[derive(Clone)]
pub struct ConnectionStore {
    db: SqlitePool,
    vault: EncryptionService,
}

/// Raw row with encrypted credential columns.
#[derive(FromRow)]
struct ConnectionRow {
    id: Uuid,
    name: String,
    engine: DatabaseEngine,
    host: String,
    port: u16,
    username: String,
    password: String,
    database_name: String,
    selected_databases: String,
    ssl: bool,
    ssh_enabled: bool,
    ssh_host: String,
    ssh_port: u16,
    ssh_username: String,
    ssh_password: String,
    ssh_private_key: String,
    s3_cleanup_on_retention: bool,
    database_size: i64,
    status: String,
    user_id: Uuid,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

const SELECT_COLUMNS: &str = "id, name, engine, host, port, username, password, database_name, \
     selected_databases, ssl, ssh_enabled, ssh_host, ssh_port, ssh_username, \
     ssh_password, ssh_private_key, s3_cleanup_on_retention, database_size, \
     status, user_id, created_at, updated_at";

impl ConnectionStore {
    pub fn new(db: SqlitePool, vault: EncryptionService) -> Self {
        Self { db, vault }
    }

    fn decrypt_row(&self, row: ConnectionRow) -> Result<Connection> {
        let selected_databases = parse_selected_databases(&row.selected_databases);

        Ok(Connection {
            id: row.id,
            name: row.name,
            engine: row.engine,
            host: row.host,
            port: row.port,
            username: self.vault.decrypt(&row.username)?,
            password: self.vault.decrypt(&row.password)?,
            database_name: row.database_name,
            selected_databases,
            ssl: row.ssl,
            ssh_enabled: row.ssh_enabled,
            ssh_host: row.ssh_host,
            ssh_port: row.ssh_port,
            ssh_username: row.ssh_username,
            ssh_password: self.vault.decrypt_optional(&row.ssh_password)?,
            ssh_private_key: self.vault.decrypt_optional(&row.ssh_private_key)?,
            s3_cleanup_on_retention: row.s3_cleanup_on_retention,
            database_size: row.database_size,
            status: row.status,
            user_id: row.user_id,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }

    pub async fn save(&self, conn: &Connection) -> Result<()> {
        let username = self.vault.encrypt(&conn.username)?;
        let password = self.vault.encrypt(&conn.password)?;
        let ssh_password = self.vault.encrypt_optional(&conn.ssh_password)?;
        let ssh_private_key = self.vault.encrypt_optional(&conn.ssh_private_key)?;

        sqlx::query(
            r#"
            INSERT INTO connections (
                id, name, engine, host, port, username, password, database_name,
                selected_databases, ssl, ssh_enabled, ssh_host, ssh_port,
                ssh_username, ssh_password, ssh_private_key,
                s3_cleanup_on_retention, database_size, status, user_id,
                created_at, updated_at
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(conn.id)
        .bind(&conn.name)
        .bind(conn.engine)
        .bind(&conn.host)
        .bind(conn.port)
        .bind(&username)
        .bind(&password)
        .bind(&conn.database_name)
        .bind(conn.selected_databases.join(","))
        .bind(conn.ssl)
        .bind(conn.ssh_enabled)
        .bind(&conn.ssh_host)
        .bind(conn.ssh_port)
        .bind(&conn.ssh_username)
        .bind(&ssh_password)
        .bind(&ssh_private_key)
        .bind(conn.s3_cleanup_on_retention)
        .bind(conn.database_size)
        .bind(&conn.status)
        .bind(conn.user_id)
        .bind(conn.created_at)
        .bind(conn.updated_at)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    pub async fn get(&self, id: Uuid) -> Result<Connection> {
        let query = format!("SELECT {} FROM connections WHERE id = ?", SELECT_COLUMNS);
        let row = sqlx::query_as::<_, ConnectionRow>(&query)
            .bind(id)
            .fetch_optional(&self.db)
            .await?
            .ok_or_else(|| AppError::NotFound("Connection not found".into()))?;

        self.decrypt_row(row)
    }

    pub async fn update(&self, conn: &Connection) -> Result<()> {
        let username = self.vault.encrypt(&conn.username)?;
        let password = self.vault.encrypt(&conn.password)?;
        let ssh_password = self.vault.encrypt_optional(&conn.ssh_password)?;
        let ssh_private_key = self.vault.encrypt_optional(&conn.ssh_private_key)?;

        sqlx::query(
            r#"
            UPDATE connections SET
                name = ?, engine = ?, host = ?, port = ?, username = ?,
                password = ?, database_name = ?, ssl = ?, ssh_enabled = ?,
                ssh_host = ?, ssh_port = ?, ssh_username = ?, ssh_password = ?,
                ssh_private_key = ?, s3_cleanup_on_retention = ?,
                database_size = ?, status = ?, updated_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&conn.name)
        .bind(conn.engine)
        .bind(&conn.host)
        .bind(conn.port)
        .bind(&username)
        .bind(&password)
        .bind(&conn.database_name)
        .bind(conn.ssl)
        .bind(conn.ssh_enabled)
        .bind(&conn.ssh_host)
        .bind(conn.ssh_port)
        .bind(&conn.ssh_username)
        .bind(&ssh_password)
        .bind(&ssh_private_key)
        .bind(conn.s3_cleanup_on_retention)
        .bind(conn.database_size)
        .bind(&conn.status)
        .bind(Utc::now())
        .bind(conn.id)
        .execute(&self.db)
        .await?;

        Ok(())
    }

    /// Cascades to the connection's schedule and backup records.
    pub async fn delete(&self, id: Uuid) -> Result<()> {
        sqlx::query("DELETE FROM connections WHERE id = ?")
            .bind(id)
            .execute(&self.db)
            .await?;
        Ok(())
    }

    /// Connections with last-backup and active-schedule projections.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<ConnectionListItem>> {
        let items = sqlx::query_as::<_, ConnectionListItem>(
            r#"
            SELECT
                c.id, c.name, c.engine, c.host, c.status, c.database_size,
                (SELECT MAX(b.completed_at) FROM backups b
                  WHERE b.connection_id = c.id) AS last_backup_time,
                COALESCE(bs.enabled, 0) AS backup_enabled,
                bs.cron_expr AS cron_expr,
                bs.retention_days AS retention_days,
                c.s3_cleanup_on_retention
            FROM connections c
            LEFT JOIN backup_schedules bs
                ON bs.connection_id = c.id AND bs.enabled = 1
            WHERE c.user_id = ?
            ORDER BY c.created_at DESC
            "#,
        )
        .bind(user_id)
        .fetch_all(&self.db)
        .await?;

        Ok(items)
    }

    /// Persisted as a bare comma-joined string; names containing commas are
    /// not supported.
    pub async fn update_selected_databases(&self, id: Uuid, databases: &[String]) -> Result<()> {
        sqlx::query(
            "UPDATE connections SET selected_databases = ?, updated_at = ? WHERE id = ?",
        )
        .bind(databases.join(","))
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }

    pub async fn update_s3_cleanup_flag(&self, id: Uuid, cleanup: bool) -> Result<()> {
        sqlx::query(
            "UPDATE connections SET s3_cleanup_on_retention = ?, updated_at = ? WHERE id = ?",
        )
        .bind(cleanup)
        .bind(Utc::now())
        .bind(id)
        .execute(&self.db)
        .await?;
        Ok(())
    }
}

fn parse_selected_databases(raw: &str) -> Vec<String> {
    raw.split(',')
        .filter(|part| !part.is_empty())
        .map(|part| part.to_string())
        .collect()
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::db::memory_pool;

    pub(crate) async fn insert_user(pool: &SqlitePool) -> Uuid {
        let user_id = Uuid::new_v4();
        sqlx::query(
            "INSERT INTO users (id, username, password_hash, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(user_id)
        .bind(format!("user-{}", user_id))
        .bind("hash")
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(pool)
        .await
        .unwrap();
        user_id
    }

    pub(crate) fn sample_connection(user_id: Uuid) -> Connection {
        Connection {
            id: Uuid::new_v4(),
            name: "pg1".into(),
            engine: DatabaseEngine::PostgreSql,
            host: "localhost".into(),
            port: 5432,
            username: "postgres".into(),
            password: "hunter2".into(),
            database_name: "shop".into(),
            selected_databases: vec![],
            ssl: false,
            ssh_enabled: false,
            ssh_host: String::new(),
            ssh_port: 22,
            ssh_username: String::new(),
            ssh_password: String::new(),
            ssh_private_key: String::new(),
            s3_cleanup_on_retention: true,
            database_size: 0,
            status: "connected".into(),
            user_id,
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    #[test]
    fn test_parse_selected_databases() {
        assert_eq!(parse_selected_databases(""), Vec::<String>::new());
        assert_eq!(parse_selected_databases("a"), vec!["a"]);
        assert_eq!(parse_selected_databases("a,b,c"), vec!["a", "b", "c"]);
        // Empty segments from stray commas are dropped
        assert_eq!(parse_selected_databases("a,,b,"), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_save_get_roundtrip_decrypts_credentials() {
        let pool = memory_pool().await;
        let store = ConnectionStore::new(pool.clone(), EncryptionService::new("test-key"));
        let user_id = insert_user(&pool).await;

        let mut conn = sample_connection(user_id);
        conn.ssh_enabled = true;
        conn.ssh_host = "jump".into();
        conn.ssh_username = "ops".into();
        conn.ssh_private_key = "keydata".into();
        store.save(&conn).await.unwrap();

        let loaded = store.get(conn.id).await.unwrap();
        assert_eq!(loaded.username, "postgres");
        assert_eq!(loaded.password, "hunter2");
        assert_eq!(loaded.ssh_private_key, "keydata");
        assert_eq!(loaded.ssh_password, "");

        // The table itself never sees plaintext
        let stored: (String, String) =
            sqlx::query_as("SELECT username, password FROM connections WHERE id = ?")
                .bind(conn.id)
                .fetch_one(&pool)
                .await
                .unwrap();
        assert_ne!(stored.0, "postgres");
        assert_ne!(stored.1, "hunter2");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let pool = memory_pool().await;
        let store = ConnectionStore::new(pool, EncryptionService::new("k"));
        assert!(matches!(
            store.get(Uuid::new_v4()).await,
            Err(AppError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_selected_databases_roundtrip() {
        let pool = memory_pool().await;
        let store = ConnectionStore::new(pool.clone(), EncryptionService::new("k"));
        let user_id = insert_user(&pool).await;

        let conn = sample_connection(user_id);
        store.save(&conn).await.unwrap();

        store
            .update_selected_databases(conn.id, &["shop".into(), "crm".into()])
            .await
            .unwrap();

        let loaded = store.get(conn.id).await.unwrap();
        assert_eq!(loaded.selected_databases, vec!["shop", "crm"]);
    }

    #[tokio::test]
    async fn test_s3_cleanup_flag_update() {
        let pool = memory_pool().await;
        let store = ConnectionStore::new(pool.clone(), EncryptionService::new("k"));
        let user_id = insert_user(&pool).await;

        let conn = sample_connection(user_id);
        store.save(&conn).await.unwrap();
        assert!(store.get(conn.id).await.unwrap().s3_cleanup_on_retention);

        store.update_s3_cleanup_flag(conn.id, false).await.unwrap();
        assert!(!store.get(conn.id).await.unwrap().s3_cleanup_on_retention);
    }

    #[tokio::test]
    async fn test_list_for_user_projects_schedule() {
        let pool = memory_pool().await;
        let store = ConnectionStore::new(pool.clone(), EncryptionService::new("k"));
        let user_id = insert_user(&pool).await;

        let conn = sample_connection(user_id);
        store.save(&conn).await.unwrap();

        sqlx::query(
            r#"
            INSERT INTO backup_schedules
                (id, connection_id, enabled, cron_expr, retention_days, created_at, updated_at)
            VALUES (?, ?, 1, '0 0 0 * * *', 30, ?, ?)
            "#,
        )
        .bind(Uuid::new_v4())
        .bind(conn.id)
        .bind(Utc::now())
        .bind(Utc::now())
        .execute(&pool)
        .await
        .unwrap();

        let items = store.list_for_user(user_id).await.unwrap();
        assert_eq!(items.len(), 1);
        assert!(items[0].backup_enabled);
        assert_eq!(items[0].cron_expr.as_deref(), Some("0 0 0 * * *"));
        assert_eq!(items[0].retention_days, Some(30));
        assert!(items[0].last_backup_time.is_none());
    }
}
