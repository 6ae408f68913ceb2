//! SSH tunnel manager.
//!
//! Opens an ephemeral local-forward through a jump host: a loopback listener
//! on a random port relays accepted connections to the target database via
//! `channel_direct_tcpip`. A tunnel lives for a single dump or restore and is
//! torn down on drop, which covers every exit path including panics.

use std::io::{Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use ssh2::{Channel, Session};

use crate::error::{AppError, Result};
use crate::models::connection::Connection;

const ACCEPT_POLL: Duration = Duration::from_millis(50);
const RELAY_IDLE: Duration = Duration::from_millis(5);

/// Connection parameters captured before entering the blocking setup task.
struct TunnelParams {
    ssh_host: String,
    ssh_port: u16,
    ssh_username: String,
    ssh_password: String,
    ssh_private_key: String,
    target_host: String,
    target_port: u16,
}

/// A live local-forward tunnel. The effective database endpoint is
/// `127.0.0.1:self.port()` for as long as this value is alive.
pub struct SshTunnel {
    local_addr: SocketAddr,
    shutdown: Arc<AtomicBool>,
    relay_thread: Option<JoinHandle<()>>,
}

impl SshTunnel {
    /// Establish a tunnel for an SSH-enabled connection.
    ///
    /// Private-key authentication is preferred when both a key and a
    /// password are stored.
    pub async fn open(conn: &Connection) -> Result<SshTunnel> {
        let params = TunnelParams {
            ssh_host: conn.ssh_host.clone(),
            ssh_port: conn.ssh_port,
            ssh_username: conn.ssh_username.clone(),
            ssh_password: conn.ssh_password.clone(),
            ssh_private_key: conn.ssh_private_key.clone(),
            target_host: conn.host.clone(),
            target_port: conn.port,
        };

        tokio::task::spawn_blocking(move || Self::open_blocking(params))
            .await
            .map_err(|e| AppError::Tunnel(format!("tunnel setup task failed: {}", e)))?
    }

    fn open_blocking(params: TunnelParams) -> Result<SshTunnel> {
        let jump_addr = format!("{}:{}", params.ssh_host, params.ssh_port);
        let tcp = TcpStream::connect(&jump_addr)
            .map_err(|e| AppError::Tunnel(format!("connect {}: {}", jump_addr, e)))?;

        let mut session =
            Session::new().map_err(|e| AppError::Tunnel(format!("session init: {}", e)))?;
        session.set_tcp_stream(tcp);
        session
            .handshake()
            .map_err(|e| AppError::Tunnel(format!("handshake with {}: {}", jump_addr, e)))?;

        if !params.ssh_private_key.is_empty() {
            session
                .userauth_pubkey_memory(
                    &params.ssh_username,
                    None,
                    &params.ssh_private_key,
                    None,
                )
                .map_err(|e| AppError::Tunnel(format!("private key auth: {}", e)))?;
        } else {
            session
                .userauth_password(&params.ssh_username, &params.ssh_password)
                .map_err(|e| AppError::Tunnel(format!("password auth: {}", e)))?;
        }

        if !session.authenticated() {
            return Err(AppError::Tunnel("authentication rejected".into()));
        }

        let listener = TcpListener::bind(("127.0.0.1", 0))
            .map_err(|e| AppError::Tunnel(format!("bind loopback listener: {}", e)))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| AppError::Tunnel(format!("local addr: {}", e)))?;

        let shutdown = Arc::new(AtomicBool::new(false));
        let thread_shutdown = shutdown.clone();
        let target = (params.target_host, params.target_port);

        let relay_thread = std::thread::Builder::new()
            .name("ssh-tunnel".into())
            .spawn(move || accept_loop(session, listener, target, thread_shutdown))
            .map_err(|e| AppError::Tunnel(format!("spawn relay thread: {}", e)))?;

        tracing::debug!(local = %local_addr, "SSH tunnel established");

        Ok(SshTunnel {
            local_addr,
            shutdown,
            relay_thread: Some(relay_thread),
        })
    }

    pub fn host(&self) -> String {
        self.local_addr.ip().to_string()
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }
}

impl Drop for SshTunnel {
    fn drop(&mut self) {
        self.shutdown.store(true, Ordering::Relaxed);
        if let Some(thread) = self.relay_thread.take() {
            let _ = thread.join();
        }
        tracing::debug!(local = %self.local_addr, "SSH tunnel closed");
    }
}

fn accept_loop(
    session: Session,
    listener: TcpListener,
    target: (String, u16),
    shutdown: Arc<AtomicBool>,
) {
    if listener.set_nonblocking(true).is_err() {
        return;
    }

    while !shutdown.load(Ordering::Relaxed) {
        match listener.accept() {
            Ok((stream, _)) => {
                session.set_blocking(true);
                match session.channel_direct_tcpip(&target.0, target.1, None) {
                    Ok(channel) => relay(stream, channel, &session, &shutdown),
                    Err(e) => {
                        tracing::warn!(error = %e, "Failed to open forward channel");
                    }
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(e) => {
                tracing::warn!(error = %e, "Tunnel listener error");
                break;
            }
        }
    }
}

/// Pump bytes both ways over one forwarded connection. The session switches
/// to non-blocking mode so a single thread can interleave both directions.
fn relay(mut stream: TcpStream, mut channel: Channel, session: &Session, shutdown: &AtomicBool) {
    if stream.set_nonblocking(true).is_err() {
        return;
    }
    session.set_blocking(false);

    let mut buf = [0u8; 16384];
    loop {
        if shutdown.load(Ordering::Relaxed) {
            break;
        }

        let mut idle = true;

        match stream.read(&mut buf) {
            Ok(0) => break,
            Ok(n) => {
                idle = false;
                if write_all_channel(&mut channel, &buf[..n]).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(_) => break,
        }

        match channel.read(&mut buf) {
            Ok(0) => {
                if channel.eof() {
                    break;
                }
            }
            Ok(n) => {
                idle = false;
                if stream.write_all(&buf[..n]).is_err() {
                    break;
                }
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {}
            Err(_) => break,
        }

        if idle {
            std::thread::sleep(RELAY_IDLE);
        }
    }

    session.set_blocking(true);
    let _ = channel.close();
    let _ = channel.wait_close();
}

/// `write` on a non-blocking channel may accept a partial buffer; keep
/// pushing until everything is through.
fn write_all_channel(channel: &mut Channel, mut data: &[u8]) -> std::io::Result<()> {
    while !data.is_empty() {
        match channel.write(data) {
            Ok(0) => {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::WriteZero,
                    "channel closed",
                ))
            }
            Ok(n) => data = &data[n..],
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                std::thread::sleep(RELAY_IDLE);
            }
            Err(e) => return Err(e),
        }
    }
    Ok(())
}
