//! Redis: `redis-cli --rdb`. Dump only; restores are rejected upstream.

use std::path::Path;
use tokio::process::Command;

use crate::models::connection::Connection;

pub(super) fn dump_command(bin: &Path, conn: &Connection, output: &Path) -> Command {
    let mut cmd = Command::new(bin);
    cmd.arg("-h").arg(&conn.host).arg("-p").arg(conn.port.to_string());

    if !conn.password.is_empty() {
        cmd.arg("-a").arg(&conn.password);
    }
    if conn.ssl {
        cmd.arg("--tls");
    }

    cmd.arg("--rdb").arg(output);
    cmd
}
