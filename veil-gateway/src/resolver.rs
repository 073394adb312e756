//! One-shot resolver
//!
//! A small client for ad-hoc lookups (the CLI `lookup` subcommand): sends
//! a single A query to the configured resolver and returns the parsed
//! answers with their computed expiry.

use std::net::{IpAddr, Ipv4Addr};
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use veil_dns::types::rtype;
use veil_dns::{Labels, Message};

use crate::error::{Error, Result};
use crate::udp::UdpUpstream;

/// How long to wait for an answer
const RESOLVE_TIMEOUT: Duration = Duration::from_secs(5);

/// One resolved address and when it stops being valid
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolveResult {
    pub address: IpAddr,
    pub not_after: Instant,
}

/// Blocking-style resolver over the upstream UDP client
pub struct Resolver {
    udp: UdpUpstream,
    responses: mpsc::Receiver<Vec<u8>>,
    next_id: u16,
}

impl Resolver {
    /// Connect to a `host:53` resolver.
    pub async fn new(server: &str) -> Result<Self> {
        let (tx, responses) = mpsc::channel(16);
        let udp = UdpUpstream::connect(server, tx).await?;
        Ok(Resolver {
            udp,
            responses,
            next_id: 1,
        })
    }

    /// Resolve `name` to its A records.
    pub async fn resolve(&mut self, name: &str) -> Result<Vec<ResolveResult>> {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1).max(1);

        let query = Message::query(id, Labels::from_name(name), rtype::A);
        let data = query.marshal()?;
        let start = Instant::now();
        self.udp.send(&data).await?;

        let deadline = start + RESOLVE_TIMEOUT;
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                return Err(Error::Timeout(name.to_string()));
            }

            let response = tokio::time::timeout(remaining, self.responses.recv())
                .await
                .map_err(|_| Error::Timeout(name.to_string()))?
                .ok_or_else(|| Error::Config("resolver reader terminated".into()))?;

            let message = match veil_dns::parse(&response) {
                Ok(message) => message,
                Err(e) => {
                    log::debug!("ignoring unparseable response: {}", e);
                    continue;
                }
            };
            if message.id != id || !message.response {
                log::debug!("ignoring response for unknown request {:#06x}", message.id);
                continue;
            }

            log::trace!("{}", message.dump());

            let results = message
                .answers
                .iter()
                .filter(|answer| answer.rtype == rtype::A)
                .filter_map(|answer| {
                    let octets: [u8; 4] = answer.rdata.bytes().try_into().ok()?;
                    Some(ResolveResult {
                        address: IpAddr::V4(Ipv4Addr::from(octets)),
                        not_after: start + Duration::from_secs(answer.ttl as u64),
                    })
                })
                .collect();
            return Ok(results);
        }
    }

    /// The resolver endpoint this client talks to
    pub fn server(&self) -> &str {
        self.udp.server()
    }
}
