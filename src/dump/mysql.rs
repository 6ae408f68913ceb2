//! MySQL / MariaDB: `mysqldump` / `mysql`.

use std::path::Path;
use std::process::Stdio;
use tokio::process::Command;

use crate::error::Result;
use crate::models::connection::Connection;

pub(super) fn dump_command(
    bin: &Path,
    conn: &Connection,
    db_name: &str,
    output: &Path,
) -> Command {
    let mut cmd = Command::new(bin);
    cmd.arg("-h")
        .arg(&conn.host)
        .arg("-P")
        .arg(conn.port.to_string())
        .arg("-u")
        .arg(&conn.username)
        .arg(format!("-p{}", conn.password))
        .arg("--result-file")
        .arg(output)
        .arg(db_name);
    cmd
}

/// The restore reads the dump through stdin, so the SQL file never appears
/// on the argument vector.
pub(super) fn restore_command(bin: &Path, conn: &Connection, input: &Path) -> Result<Command> {
    let file = std::fs::File::open(input)?;

    let mut cmd = Command::new(bin);
    cmd.arg("-h")
        .arg(&conn.host)
        .arg("-P")
        .arg(conn.port.to_string())
        .arg("-u")
        .arg(&conn.username)
        .arg(format!("-p{}", conn.password))
        .arg(&conn.database_name)
        .stdin(Stdio::from(file));
    Ok(cmd)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::connection::DatabaseEngine;
    use chrono::Utc;
    use uuid::Uuid;

    fn test_conn() -> Connection {
        Connection {
            id: Uuid::new_v4(),
            name: "m1".into(),
            engine: DatabaseEngine::MySql,
            host: "db.internal".into(),
            port: 3306,
            username: "root".into(),
            password: "pw".into(),
            database_name: "app".into(),
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

    #[test]
    fn test_dump_command_arguments() {
        let conn = test_conn();
        let cmd = dump_command(
            Path::new("mysqldump"),
            &conn,
            "app",
            Path::new("/tmp/app.sql"),
        );
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        assert!(args.contains(&"-ppw".to_string()));
        assert!(args.contains(&"--result-file".to_string()));
        // Target database is the trailing positional argument
        assert_eq!(args.last().unwrap(), "app");
    }

    #[test]
    fn test_restore_command_pipes_file_via_stdin() {
        let tmp = tempfile::NamedTempFile::new().unwrap();
        let conn = test_conn();
        let cmd = restore_command(Path::new("mysql"), &conn, tmp.path()).unwrap();
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().to_string())
            .collect();

        // The dump path never shows up as an argument
        assert!(!args.iter().any(|a| a.contains(&tmp.path().to_string_lossy().to_string())));
        assert_eq!(args.last().unwrap(), "app");
    }

    #[test]
    fn test_restore_command_fails_on_missing_file() {
        let conn = test_conn();
        let result = restore_command(Path::new("mysql"), &conn, Path::new("/nonexistent.sql"));
        assert!(result.is_err());
    }
}
