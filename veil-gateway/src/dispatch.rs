//! Dispatch engine
//!
//! Consumes parsed DNS queries from a front-end and drives them through
//! the pipeline: deny-list check, passthrough detection, padding, synthetic
//! ID assignment, upstream selection. Responses from the UDP reader and
//! from per-query DoH tasks arrive on one shared channel; the dispatch
//! loop claims each from the registry, restores the original transaction
//! ID in place and hands the reply to the front-end writer.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc, RwLock};

use veil_dns::types::Rcode;
use veil_dns::{pad_message, DenyList, Labels, Message};

use crate::doh::DohClient;
use crate::error::{Error, Result};
use crate::event::{EventKind, EventSink};
use crate::registry::{RequestRegistry, ReturnEnvelope};
use crate::udp::UdpUpstream;

/// Response fan-in channel depth; enqueues drop on overflow rather than
/// back-pressuring the dispatch path
const RESPONSE_CHANNEL_DEPTH: usize = 256;

/// Writes a fully-formed DNS reply back onto the flow named by the
/// envelope. Implemented by the front-end that owns the ingress socket.
#[async_trait]
pub trait ReplyWriter: Send + Sync {
    async fn write_reply(&self, envelope: &ReturnEnvelope, payload: &[u8]) -> std::io::Result<()>;
}

/// The DNS interception engine
pub struct DnsGateway {
    deny_list: DenyList,
    doh: Option<Arc<DohClient>>,
    udp: RwLock<Arc<UdpUpstream>>,
    registry: Arc<RequestRegistry>,
    events: EventSink,
    writer: Arc<dyn ReplyWriter>,
    no_pad: bool,
    responses_tx: mpsc::Sender<Vec<u8>>,
    responses_rx: Mutex<Option<mpsc::Receiver<Vec<u8>>>>,
}

impl DnsGateway {
    /// Connect the upstream resolver and assemble the engine.
    /// [`run`](Self::run) must be driving the response loop before any
    /// query is handled.
    pub async fn new(
        resolver: &str,
        deny_list: DenyList,
        doh: Option<DohClient>,
        writer: Arc<dyn ReplyWriter>,
        events: EventSink,
        no_pad: bool,
    ) -> Result<Self> {
        let (responses_tx, responses_rx) = mpsc::channel(RESPONSE_CHANNEL_DEPTH);
        let udp = UdpUpstream::connect(resolver, responses_tx.clone()).await?;

        log::info!(
            "gateway ready: resolver={}, doh={}, deny-list patterns={}",
            resolver,
            doh.is_some(),
            deny_list.len()
        );

        Ok(DnsGateway {
            deny_list,
            doh: doh.map(Arc::new),
            udp: RwLock::new(Arc::new(udp)),
            registry: Arc::new(RequestRegistry::new()),
            events,
            writer,
            no_pad,
            responses_tx,
            responses_rx: Mutex::new(Some(responses_rx)),
        })
    }

    /// The pending-request registry (shared for inspection)
    pub fn registry(&self) -> &Arc<RequestRegistry> {
        &self.registry
    }

    /// Swap the upstream resolver. The old client's reader exits; its
    /// late responses age out of the registry.
    pub async fn set_server(&self, server: &str) -> Result<()> {
        let upstream = UdpUpstream::connect(server, self.responses_tx.clone()).await?;
        *self.udp.write().await = Arc::new(upstream);

        let host = server.rsplit_once(':').map(|(h, _)| h).unwrap_or(server);
        self.events.emit(EventKind::Config, Labels::from_name(host));
        log::info!("upstream resolver set to {}", server);
        Ok(())
    }

    /// Process one captured DNS query.
    pub async fn handle_query(&self, envelope: ReturnEnvelope, mut query: Message) -> Result<()> {
        log::trace!("{}", query.dump());
        let mut passthrough = false;

        for question in &query.questions {
            if let Some(pattern) = self.deny_list.matched(&question.labels) {
                log::debug!("blocked {} (pattern {})", question.labels, pattern);
                self.events.emit(EventKind::Block, question.labels.clone());
                return self.write_nxdomain(&envelope, &query).await;
            }
            if let Some(doh) = &self.doh {
                if doh.is_passthrough(&question.labels.to_string()) {
                    passthrough = true;
                }
            }
            self.events.emit(EventKind::Query, question.labels.clone());
        }

        if passthrough && query.questions.len() > 1 {
            return Err(Error::MultiQuestionPassthrough(query.questions.len()));
        }

        let doh = match (&self.doh, passthrough) {
            (Some(doh), false) => Some(Arc::clone(doh)),
            _ => None,
        };
        let mut data = if doh.is_some() && !self.no_pad {
            pad_message(&mut query)?
        } else {
            query.marshal()?
        };

        let synthetic_id = self.registry.register(envelope, query.id);
        data[0..2].copy_from_slice(&synthetic_id.to_be_bytes());

        if let Some(doh) = doh {
            // one task per in-flight DoH request; the response joins the
            // same channel the UDP reader feeds
            let responses = self.responses_tx.clone();
            tokio::spawn(async move {
                match doh.send_query(&data).await {
                    Ok(response) => {
                        if responses.try_send(response).is_err() {
                            log::warn!("response channel full, dropping DoH response");
                        }
                    }
                    Err(e) => {
                        log::warn!("DoH query {:#06x} failed: {}", synthetic_id, e);
                    }
                }
            });
            return Ok(());
        }

        self.udp.read().await.send(&data).await
    }

    /// Drain the response channel until shutdown. Call once.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let mut responses = self
            .responses_rx
            .lock()
            .expect("response receiver lock poisoned")
            .take()
            .ok_or_else(|| Error::Config("gateway response loop already running".into()))?;

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    log::info!("gateway shutting down");
                    break;
                }
                response = responses.recv() => {
                    match response {
                        Some(bytes) => self.handle_response(bytes).await,
                        None => break,
                    }
                }
            }
        }
        Ok(())
    }

    /// Correlate one upstream response and deliver it to the flow that
    /// asked. Unparseable or unknown-ID responses are dropped.
    async fn handle_response(&self, mut data: Vec<u8>) {
        let message = match veil_dns::parse(&data) {
            Ok(message) => message,
            Err(e) => {
                log::warn!("dropping unparseable upstream response: {}", e);
                return;
            }
        };

        let Some((envelope, original_id)) = self.registry.claim(message.id) else {
            log::warn!("dropping response with unknown ID {:#06x}", message.id);
            return;
        };

        data[0..2].copy_from_slice(&original_id.to_be_bytes());

        if let Err(e) = self.writer.write_reply(&envelope, &data).await {
            log::error!("failed to write reply: {}", e);
        }
    }

    /// Fabricate the NXDOMAIN answer for a deny-listed query.
    async fn write_nxdomain(&self, envelope: &ReturnEnvelope, query: &Message) -> Result<()> {
        let reply = nxdomain_reply(query);
        let data = reply.marshal()?;
        self.writer.write_reply(envelope, &data).await?;
        Ok(())
    }
}

/// NXDOMAIN response mirroring the query: same ID, opcode, RD and
/// questions; authoritative answer with every record section empty.
fn nxdomain_reply(query: &Message) -> Message {
    Message {
        id: query.id,
        response: true,
        opcode: query.opcode,
        authoritative: true,
        truncated: false,
        recursion_desired: query.recursion_desired,
        recursion_available: false,
        rcode: Rcode::NX_DOMAIN,
        questions: query.questions.clone(),
        answers: Vec::new(),
        authority: Vec::new(),
        additional: Vec::new(),
    }
}
