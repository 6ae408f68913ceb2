//! MongoDB: `mongodump` / `mongorestore`.
//!
//! `mongodump` writes a BSON directory tree under `--out`; the builders agree
//! that this is the parent directory of the recorded dump path, which is the
//! same directory `mongorestore` later reads.

use std::path::Path;
use tokio::process::Command;

use crate::models::connection::Connection;

pub(super) fn dump_command(
    bin: &Path,
    conn: &Connection,
    db_name: &str,
    output: &Path,
) -> Command {
    let out_dir = output.parent().unwrap_or_else(|| Path::new("."));

    let mut cmd = Command::new(bin);
    cmd.arg("--host")
        .arg(&conn.host)
        .arg("--port")
        .arg(conn.port.to_string())
        .arg("--db")
        .arg(db_name)
        .arg("--out")
        .arg(out_dir);

    if !conn.username.is_empty() {
        cmd.arg("--username").arg(&conn.username);
    }
    if !conn.password.is_empty() {
        cmd.arg("--password").arg(&conn.password);
    }
    if conn.ssl {
        cmd.arg("--ssl");
    }
    cmd
}

pub(super) fn restore_command(bin: &Path, conn: &Connection, input: &Path) -> Command {
    let dump_dir = input.parent().unwrap_or_else(|| Path::new("."));

    let mut cmd = Command::new(bin);
    cmd.arg("--host")
        .arg(&conn.host)
        .arg("--port")
        .arg(conn.port.to_string())
        .arg("--db")
        .arg(&conn.database_name);

    if !conn.username.is_empty() {
        cmd.arg("--username").arg(&conn.username);
    }
    if !conn.password.is_empty() {
        cmd.arg("--password").arg(&conn.password);
    }
    if conn.ssl {
        cmd.arg("--ssl");
    }

    cmd.arg(dump_dir);
    cmd
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::connection::DatabaseEngine;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_conn(username: &str, password: &str) -> Connection {
        Connection {
            id: Uuid::new_v4(),
            name: "mongo1".into(),
            engine: DatabaseEngine::MongoDb,
            host: "localhost".into(),
            port: 27017,
            username: username.into(),
            password: password.into(),
            database_name: "events".into(),
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
            user_id: Uuid::new_v4(),
            created_at: Utc::now(),
            updated_at: Utc::now(),
        }
    }

    fn args_of(cmd: &Command) -> Vec<String> {
        cmd.as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect()
    }

    #[test]
    fn test_dump_targets_parent_directory() {
        let conn = test_conn("", "");
        let cmd = dump_command(
            Path::new("mongodump"),
            &conn,
            "events",
            Path::new("/backups/mongo1/events_20240101_000000.sql"),
        );
        let args = args_of(&cmd);
        let out_pos = args.iter().position(|a| a == "--out").unwrap();
        assert_eq!(args[out_pos + 1], "/backups/mongo1");
    }

    #[test]
    fn test_restore_reads_dump_directory() {
        let conn = test_conn("admin", "pw");
        let cmd = restore_command(
            Path::new("mongorestore"),
            &conn,
            Path::new("/backups/mongo1/events_20240101_000000.sql"),
        );
        let args = args_of(&cmd);
        assert_eq!(args.last().unwrap(), "/backups/mongo1");
        assert!(args.contains(&"--username".to_string()));
        assert!(args.contains(&"--password".to_string()));
    }

    #[test]
    fn test_credentials_omitted_when_empty() {
        let conn = test_conn("", "");
        let cmd = dump_command(Path::new("mongodump"), &conn, "events", Path::new("/x/y.sql"));
        let args = args_of(&cmd);
        assert!(!args.contains(&"--username".to_string()));
        assert!(!args.contains(&"--password".to_string()));
    }
}
