//! PostgreSQL: `pg_dump` / `psql`.

use std::path::Path;
use std::process::Output;
use tokio::process::Command;

use crate::error::{AppError, Result};
use crate::models::connection::Connection;

/// The password goes through PGPASSWORD, never the argument vector.
pub(super) fn dump_command(
    bin: &Path,
    conn: &Connection,
    db_name: &str,
    output: &Path,
) -> Command {
    let mut cmd = Command::new(bin);
    cmd.arg("-h")
        .arg(&conn.host)
        .arg("-p")
        .arg(conn.port.to_string())
        .arg("-U")
        .arg(&conn.username)
        .arg("-d")
        .arg(db_name)
        .arg("-f")
        .arg(output);
    cmd.env("PGPASSWORD", &conn.password);
    if conn.ssl {
        cmd.env("PGSSLMODE", "require");
    }
    cmd
}

/// `ON_ERROR_STOP=1` makes psql exit non-zero on the first failed statement,
/// which is what lets [`validate_restore_output`] trust its line scan.
pub(super) fn restore_command(bin: &Path, conn: &Connection, input: &Path) -> Command {
    let mut cmd = Command::new(bin);
    cmd.arg("-h")
        .arg(&conn.host)
        .arg("-p")
        .arg(conn.port.to_string())
        .arg("-U")
        .arg(&conn.username)
        .arg("-d")
        .arg(&conn.database_name)
        .arg("-f")
        .arg(input)
        .arg("-v")
        .arg("ON_ERROR_STOP=1");
    cmd.env("PGPASSWORD", &conn.password);
    if conn.ssl {
        cmd.env("PGSSLMODE", "require");
    }
    cmd
}

const NON_CRITICAL_PATTERNS: &[&str] = &[
    "WARNING:",
    "NOTICE:",
    "must be member of role",
    "no privileges",
];

fn is_critical_line(line: &str) -> bool {
    !NON_CRITICAL_PATTERNS.iter().any(|p| line.contains(p))
}

/// Line-scan psql output. Ownership/privilege noise is tolerated even when
/// the process exits non-zero; remaining `ERROR:` lines are critical.
pub(super) fn validate_restore_output(output: &Output) -> Result<()> {
    let stdout = String::from_utf8_lossy(&output.stdout);
    let stderr = String::from_utf8_lossy(&output.stderr);

    let critical: Vec<&str> = stdout
        .lines()
        .chain(stderr.lines())
        .filter(|line| line.contains("ERROR:"))
        .filter(|line| is_critical_line(line))
        .collect();

    if critical.is_empty() {
        return Ok(());
    }

    if critical.iter().any(|line| line.contains("already exists")) {
        return Err(AppError::RestoreTargetNotEmpty);
    }

    Err(AppError::RestoreFailed {
        engine: "postgresql".into(),
        detail: format!("{} error(s)", critical.len()),
    })
}
