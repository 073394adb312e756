//! UDP front-end
//!
//! A plain UDP listener that feeds the dispatch engine. It performs the
//! protocol discrimination the tunnel layer would otherwise do: every
//! datagram is parsed as DNS, queries go to the engine with a return
//! envelope naming the originating flow, and replies are written back
//! through the shared socket.

use std::net::SocketAddr;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::net::UdpSocket;
use tokio::sync::broadcast;

use crate::dispatch::{DnsGateway, ReplyWriter};
use crate::error::Result;
use crate::registry::ReturnEnvelope;
use crate::udp::MAX_DATAGRAM;

/// UDP listener front-end for the gateway
pub struct UdpFrontend {
    socket: Arc<UdpSocket>,
    local_addr: SocketAddr,
}

/// Reply writer over the front-end socket: sends the payload back to the
/// envelope's source address.
struct SocketReplyWriter {
    socket: Arc<UdpSocket>,
}

#[async_trait]
impl ReplyWriter for SocketReplyWriter {
    async fn write_reply(&self, envelope: &ReturnEnvelope, payload: &[u8]) -> std::io::Result<()> {
        self.socket.send_to(payload, envelope.src).await?;
        Ok(())
    }
}

impl UdpFrontend {
    /// Bind the listener.
    pub async fn bind(addr: &str) -> Result<Self> {
        let socket = UdpSocket::bind(addr).await?;
        let local_addr = socket.local_addr()?;
        log::info!("DNS front-end listening on {}", local_addr);
        Ok(UdpFrontend {
            socket: Arc::new(socket),
            local_addr,
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// The reply writer the gateway should be constructed with.
    pub fn writer(&self) -> Arc<dyn ReplyWriter> {
        Arc::new(SocketReplyWriter {
            socket: self.socket.clone(),
        })
    }

    /// Accept queries until shutdown. Each query is handled on its own
    /// task; responses flow back through [`SocketReplyWriter`].
    pub async fn run(
        self,
        gateway: Arc<DnsGateway>,
        mut shutdown: broadcast::Receiver<()>,
    ) -> Result<()> {
        let mut buf = vec![0u8; MAX_DATAGRAM];
        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    log::info!("front-end shutting down");
                    break;
                }
                received = self.socket.recv_from(&mut buf) => {
                    let (len, src) = match received {
                        Ok(received) => received,
                        Err(e) => {
                            // transient on UDP (e.g. ICMP unreachable bounces)
                            log::error!("front-end receive error: {}", e);
                            continue;
                        }
                    };

                    let query = match veil_dns::parse(&buf[..len]) {
                        Ok(message) => message,
                        Err(e) => {
                            log::debug!("dropping unparseable datagram from {}: {}", src, e);
                            continue;
                        }
                    };
                    if !query.is_query() {
                        log::debug!("dropping non-query message from {}", src);
                        continue;
                    }

                    let envelope = ReturnEnvelope {
                        src,
                        dst: self.local_addr,
                    };
                    let gateway = gateway.clone();
                    tokio::spawn(async move {
                        if let Err(e) = gateway.handle_query(envelope, query).await {
                            log::warn!("query from {} failed: {}", src, e);
                        }
                    });
                }
            }
        }
        Ok(())
    }
}
