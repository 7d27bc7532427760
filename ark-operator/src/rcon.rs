//! RCON client pool (§4.7).
//!
//! Ark speaks the same wire protocol as Source engine RCON: little-endian
//! `i32 size`, `i32 request id`, `i32 packet type`, a NUL-terminated body
//! and a trailing NUL byte. Connections are pooled process-wide, keyed by
//! `(host, port)`, so repeated commands against the same server (restart
//! announce ladder, health probes) reuse one TCP connection instead of
//! reauthenticating every time.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::Mutex;

use crate::util::Error;

const PACKET_AUTH: i32 = 3;
const PACKET_AUTH_RESPONSE: i32 = 2;
const PACKET_COMMAND: i32 = 2;
const PACKET_RESPONSE: i32 = 0;
const SEND_TIMEOUT: Duration = Duration::from_secs(3);

struct Connection {
    stream: TcpStream,
    next_id: i32,
}

impl Connection {
    async fn connect(host: &str, port: u16, password: &str) -> Result<Self, Error> {
        let stream = TcpStream::connect((host, port)).await.map_err(|e| Error::Rcon {
            host: host.to_string(),
            port,
            message: e.to_string(),
        })?;
        let mut conn = Connection { stream, next_id: 1 };
        conn.authenticate(host, port, password).await?;
        Ok(conn)
    }

    async fn authenticate(&mut self, host: &str, port: u16, password: &str) -> Result<(), Error> {
        let id = self.next_id;
        self.next_id += 1;
        write_packet(&mut self.stream, id, PACKET_AUTH, password).await.map_err(|e| Error::Rcon {
            host: host.to_string(),
            port,
            message: e.to_string(),
        })?;
        let (resp_id, resp_type, _) = read_packet(&mut self.stream).await.map_err(|e| Error::Rcon {
            host: host.to_string(),
            port,
            message: e.to_string(),
        })?;
        if resp_type != PACKET_AUTH_RESPONSE || resp_id != id {
            return Err(Error::Rcon {
                host: host.to_string(),
                port,
                message: "authentication rejected".to_string(),
            });
        }
        Ok(())
    }

    async fn command(&mut self, host: &str, port: u16, command: &str) -> Result<String, Error> {
        let id = self.next_id;
        self.next_id += 1;
        write_packet(&mut self.stream, id, PACKET_COMMAND, command)
            .await
            .map_err(|e| Error::Rcon { host: host.to_string(), port, message: e.to_string() })?;
        let (_, _, body) = read_packet(&mut self.stream)
            .await
            .map_err(|e| Error::Rcon { host: host.to_string(), port, message: e.to_string() })?;
        Ok(body)
    }
}

async fn write_packet(stream: &mut TcpStream, id: i32, kind: i32, body: &str) -> std::io::Result<()> {
    let mut payload = Vec::with_capacity(body.len() + 14);
    let size = (body.len() + 10) as i32;
    payload.extend_from_slice(&size.to_le_bytes());
    payload.extend_from_slice(&id.to_le_bytes());
    payload.extend_from_slice(&kind.to_le_bytes());
    payload.extend_from_slice(body.as_bytes());
    payload.push(0);
    payload.push(0);
    stream.write_all(&payload).await
}

async fn read_packet(stream: &mut TcpStream) -> std::io::Result<(i32, i32, String)> {
    let mut len_buf = [0u8; 4];
    stream.read_exact(&mut len_buf).await?;
    let len = i32::from_le_bytes(len_buf) as usize;
    let mut body = vec![0u8; len];
    stream.read_exact(&mut body).await?;
    let id = i32::from_le_bytes(body[0..4].try_into().unwrap());
    let kind = i32::from_le_bytes(body[4..8].try_into().unwrap());
    let text = String::from_utf8_lossy(&body[8..len.saturating_sub(2)]).to_string();
    Ok((id, kind, text))
}

/// Process-wide pool of authenticated RCON connections.
///
/// One `Mutex<Connection>` per `(host, port)` pair lets concurrent callers
/// for *different* servers proceed in parallel while serializing commands
/// against the *same* server, matching how a single dedicated server
/// instance only ever processes one RCON command at a time.
#[derive(Clone, Default)]
pub struct RconPool {
    connections: Arc<Mutex<HashMap<(String, u16), Arc<Mutex<Connection>>>>>,
}

impl RconPool {
    pub fn new() -> Self {
        Self::default()
    }

    async fn connection(&self, host: &str, port: u16, password: &str) -> Result<Arc<Mutex<Connection>>, Error> {
        let mut connections = self.connections.lock().await;
        if let Some(existing) = connections.get(&(host.to_string(), port)) {
            return Ok(existing.clone());
        }
        let conn = Connection::connect(host, port, password).await?;
        let handle = Arc::new(Mutex::new(conn));
        connections.insert((host.to_string(), port), handle.clone());
        Ok(handle)
    }

    /// Sends one command to a single server, evicting the pooled
    /// connection if the attempt fails so the next call reconnects fresh.
    pub async fn send(&self, host: &str, port: u16, password: &str, command: &str) -> Result<String, Error> {
        let handle = self.connection(host, port, password).await?;
        let result = {
            let mut conn = handle.lock().await;
            tokio::time::timeout(SEND_TIMEOUT, conn.command(host, port, command))
                .await
                .map_err(|_| Error::Rcon {
                    host: host.to_string(),
                    port,
                    message: "timed out waiting for response".to_string(),
                })?
        };
        if result.is_err() {
            self.connections.lock().await.remove(&(host.to_string(), port));
        }
        result
    }

    /// Sends the same command to every `(host, port)` target, collecting
    /// per-target results rather than failing fast, since one unreachable
    /// map shouldn't block an announce going out to the rest of the
    /// cluster.
    pub async fn send_all(
        &self,
        targets: &[(String, u16, String)],
        command: &str,
    ) -> Vec<(String, u16, Result<String, Error>)> {
        let futures = targets.iter().map(|(host, port, password)| async move {
            let result = self.send(host, *port, password, command).await;
            (host.clone(), *port, result)
        });
        futures::future::join_all(futures).await
    }

    pub async fn close_all(&self) {
        self.connections.lock().await.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pool_starts_empty() {
        let pool = RconPool::new();
        assert!(pool.connections.try_lock().unwrap().is_empty());
    }
}
