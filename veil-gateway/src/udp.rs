//! Upstream UDP resolver client
//!
//! Connects once to the configured resolver and runs a dedicated reader
//! task that copies each datagram onto the shared response channel the
//! dispatch loop consumes. Writes are plain non-blocking UDP sends.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::UdpSocket;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::error::{Error, Result};

/// Receive buffer size; one ethernet-MTU datagram
pub const MAX_DATAGRAM: usize = 1500;

/// Full-duplex client for a classic `host:53` resolver
pub struct UdpUpstream {
    server: String,
    socket: Arc<UdpSocket>,
    reader: JoinHandle<()>,
}

impl UdpUpstream {
    /// Connect to `server` and start the reader. Responses are published
    /// on `responses`; the reader exits when the socket errors or the
    /// channel closes.
    pub async fn connect(server: &str, responses: mpsc::Sender<Vec<u8>>) -> Result<Self> {
        let addr = resolve_server(server).await?;
        let bind_addr: SocketAddr = if addr.is_ipv6() {
            "[::]:0".parse().expect("literal bind address")
        } else {
            "0.0.0.0:0".parse().expect("literal bind address")
        };
        let socket = UdpSocket::bind(bind_addr).await?;
        socket.connect(addr).await?;
        let socket = Arc::new(socket);

        log::info!("upstream resolver connected: {}", server);

        let reader = tokio::spawn(reader_loop(server.to_string(), socket.clone(), responses));

        Ok(UdpUpstream {
            server: server.to_string(),
            socket,
            reader,
        })
    }

    /// Ship one wire message to the resolver.
    pub async fn send(&self, data: &[u8]) -> Result<()> {
        self.socket.send(data).await?;
        Ok(())
    }

    /// The configured `host:port` endpoint
    pub fn server(&self) -> &str {
        &self.server
    }
}

impl Drop for UdpUpstream {
    fn drop(&mut self) {
        self.reader.abort();
    }
}

async fn resolve_server(server: &str) -> Result<SocketAddr> {
    let mut addrs = tokio::net::lookup_host(server).await?;
    addrs
        .next()
        .ok_or_else(|| Error::Config(format!("no address for resolver '{}'", server)))
}

async fn reader_loop(server: String, socket: Arc<UdpSocket>, responses: mpsc::Sender<Vec<u8>>) {
    let mut buf = [0u8; MAX_DATAGRAM];
    loop {
        match socket.recv(&mut buf).await {
            Ok(n) => {
                match responses.try_send(buf[..n].to_vec()) {
                    Ok(()) => {}
                    Err(mpsc::error::TrySendError::Full(_)) => {
                        log::warn!("response channel full, dropping datagram from {}", server);
                    }
                    Err(mpsc::error::TrySendError::Closed(_)) => break,
                }
            }
            Err(e) => {
                log::warn!("upstream reader for {} terminated: {}", server, e);
                break;
            }
        }
    }
}
