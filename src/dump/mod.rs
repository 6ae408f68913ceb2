//! Dump driver registry: per-engine command builders for logical dumps and
//! restores, plus tool discovery on PATH.
//!
//! Passwords travel the way each tool expects them (PGPASSWORD environment,
//! `-p<pw>` argument, `--password` argument). Argument vectors are never
//! logged verbatim.

pub mod mongodb;
pub mod mysql;
pub mod postgres;
pub mod redis;

use std::path::{Path, PathBuf};
use std::process::Output;
use tokio::process::Command;

use crate::error::{AppError, Result};
use crate::models::connection::{Connection, DatabaseEngine};

/// Binary that produces a dump for each engine.
pub fn dump_tool(engine: DatabaseEngine) -> &'static str {
    match engine {
        DatabaseEngine::PostgreSql => "pg_dump",
        DatabaseEngine::MySql | DatabaseEngine::MariaDb => "mysqldump",
        DatabaseEngine::MongoDb => "mongodump",
        DatabaseEngine::Redis => "redis-cli",
    }
}

/// Binary that restores a dump; `None` for engines without restore support.
pub fn restore_tool(engine: DatabaseEngine) -> Option<&'static str> {
    match engine {
        DatabaseEngine::PostgreSql => Some("psql"),
        DatabaseEngine::MySql | DatabaseEngine::MariaDb => Some("mysql"),
        DatabaseEngine::MongoDb => Some("mongorestore"),
        DatabaseEngine::Redis => None,
    }
}

#[cfg(windows)]
fn executable_name(tool: &str) -> String {
    format!("{}.exe", tool)
}

#[cfg(not(windows))]
fn executable_name(tool: &str) -> String {
    tool.to_string()
}

fn find_tool_in(dirs: impl Iterator<Item = PathBuf>, tool: &str) -> Option<PathBuf> {
    let file_name = executable_name(tool);
    for dir in dirs {
        let candidate = dir.join(&file_name);
        if candidate.is_file() {
            return Some(candidate);
        }
    }
    None
}

/// Probe PATH for a client tool.
pub fn find_tool(tool: &str) -> Option<PathBuf> {
    let path_var = std::env::var_os("PATH")?;
    find_tool_in(std::env::split_paths(&path_var), tool)
}

fn require_tool(engine: DatabaseEngine, tool: &str) -> Result<PathBuf> {
    find_tool(tool).ok_or_else(|| AppError::ToolMissing {
        engine: engine.to_string(),
        tool: tool.to_string(),
    })
}

/// Fail early when the engine's dump tool is not installed.
pub fn verify_dump_tool(engine: DatabaseEngine) -> Result<()> {
    require_tool(engine, dump_tool(engine)).map(|_| ())
}

/// Fail early when the engine's restore tool is not installed (or the
/// engine has no restore path at all).
pub fn verify_restore_tool(engine: DatabaseEngine) -> Result<()> {
    let tool = restore_tool(engine).ok_or_else(|| {
        AppError::Validation(format!("restore is not supported for {}", engine))
    })?;
    require_tool(engine, tool).map(|_| ())
}

/// Build the dump command for one database, writing to `output`.
///
/// `conn.host`/`conn.port` must already point at the effective endpoint
/// (loopback when an SSH tunnel is active).
pub fn dump_command(conn: &Connection, db_name: &str, output: &Path) -> Result<Command> {
    let bin = require_tool(conn.engine, dump_tool(conn.engine))?;
    let mut cmd = match conn.engine {
        DatabaseEngine::PostgreSql => postgres::dump_command(&bin, conn, db_name, output),
        DatabaseEngine::MySql | DatabaseEngine::MariaDb => {
            mysql::dump_command(&bin, conn, db_name, output)
        }
        DatabaseEngine::MongoDb => mongodb::dump_command(&bin, conn, db_name, output),
        DatabaseEngine::Redis => redis::dump_command(&bin, conn, output),
    };
    // On-demand operations are cancelled by dropping the future; reap the
    // child instead of leaving it dumping into the spool.
    cmd.kill_on_drop(true);
    Ok(cmd)
}

/// Build the restore command reading from `input`.
pub fn restore_command(conn: &Connection, input: &Path) -> Result<Command> {
    let tool = restore_tool(conn.engine).ok_or_else(|| {
        AppError::Validation(format!("restore is not supported for {}", conn.engine))
    })?;
    let bin = require_tool(conn.engine, tool)?;
    let mut cmd = match conn.engine {
        DatabaseEngine::PostgreSql => postgres::restore_command(&bin, conn, input),
        DatabaseEngine::MySql | DatabaseEngine::MariaDb => {
            mysql::restore_command(&bin, conn, input)?
        }
        DatabaseEngine::MongoDb => mongodb::restore_command(&bin, conn, input),
        DatabaseEngine::Redis => unreachable!("redis restore rejected above"),
    };
    cmd.kill_on_drop(true);
    Ok(cmd)
}

/// Interpret the restore tool's exit status and output.
///
/// PostgreSQL output is line-scanned regardless of exit code; the other
/// engines treat any non-zero exit as failure.
pub fn validate_restore_output(
    engine: DatabaseEngine,
    db_name: &str,
    output: &Output,
) -> Result<()> {
    match engine {
        DatabaseEngine::PostgreSql => postgres::validate_restore_output(output),
        DatabaseEngine::MySql | DatabaseEngine::MariaDb | DatabaseEngine::MongoDb => {
            if output.status.success() {
                return Ok(());
            }
            let mut detail = String::from_utf8_lossy(&output.stderr).trim().to_string();
            if detail.is_empty() {
                detail = format!("exit status {:?}", output.status.code());
            }
            Err(AppError::RestoreFailed {
                engine: engine.to_string(),
                detail: format!("database '{}': {}", db_name, detail),
            })
        }
        DatabaseEngine::Redis => Err(AppError::Validation(
            "restore is not supported for redis".into(),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tool_table() {
        assert_eq!(dump_tool(DatabaseEngine::PostgreSql), "pg_dump");
        assert_eq!(dump_tool(DatabaseEngine::MariaDb), "mysqldump");
        assert_eq!(dump_tool(DatabaseEngine::Redis), "redis-cli");
        assert_eq!(restore_tool(DatabaseEngine::MongoDb), Some("mongorestore"));
        assert_eq!(restore_tool(DatabaseEngine::Redis), None);
    }

    #[test]
    fn test_find_tool_in_locates_existing_binary() {
        let tmp = tempfile::tempdir().unwrap();
        let tool_path = tmp.path().join(executable_name("pg_dump"));
        std::fs::write(&tool_path, b"#!/bin/sh\n").unwrap();

        let found = find_tool_in(std::iter::once(tmp.path().to_path_buf()), "pg_dump");
        assert_eq!(found, Some(tool_path));
    }

    #[test]
    fn test_find_tool_in_misses_absent_binary() {
        let tmp = tempfile::tempdir().unwrap();
        let found = find_tool_in(std::iter::once(tmp.path().to_path_buf()), "pg_dump");
        assert!(found.is_none());
    }

    #[test]
    fn test_redis_restore_rejected() {
        assert!(matches!(
            verify_restore_tool(DatabaseEngine::Redis),
            Err(AppError::Validation(_))
        ));
    }
}
