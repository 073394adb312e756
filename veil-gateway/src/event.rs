//! Observability events
//!
//! The gateway emits one event per question (query or block) and one per
//! configuration change on an optional channel. Delivery is lossy: the
//! dispatch path never blocks on a slow consumer.

use tokio::sync::mpsc;

use veil_dns::Labels;

/// What happened to a name
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    /// A question was forwarded upstream
    Query,
    /// A question matched the deny-list and was answered locally
    Block,
    /// The gateway configuration changed (e.g. a resolver swap)
    Config,
}

impl std::fmt::Display for EventKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EventKind::Query => write!(f, "query"),
            EventKind::Block => write!(f, "block"),
            EventKind::Config => write!(f, "config"),
        }
    }
}

/// An event emitted by the dispatch engine
#[derive(Debug, Clone)]
pub struct GatewayEvent {
    pub kind: EventKind,
    pub name: Labels,
}

/// Lossy event sender. A missing channel or a full buffer drops the event.
#[derive(Clone, Default)]
pub struct EventSink {
    tx: Option<mpsc::Sender<GatewayEvent>>,
}

impl EventSink {
    pub fn new(tx: mpsc::Sender<GatewayEvent>) -> Self {
        EventSink { tx: Some(tx) }
    }

    /// A sink that discards everything
    pub fn disabled() -> Self {
        EventSink::default()
    }

    pub fn emit(&self, kind: EventKind, name: Labels) {
        if let Some(tx) = &self.tx {
            if let Err(e) = tx.try_send(GatewayEvent { kind, name }) {
                log::debug!("event channel full or closed, dropping event: {}", e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_emit_and_receive() {
        let (tx, mut rx) = mpsc::channel(4);
        let sink = EventSink::new(tx);
        sink.emit(EventKind::Block, Labels::from_name("ads.example"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.kind, EventKind::Block);
        assert_eq!(event.name.to_string(), "ads.example");
    }

    #[test]
    fn test_disabled_sink_does_not_panic() {
        EventSink::disabled().emit(EventKind::Query, Labels::from_name("example.com"));
    }

    #[tokio::test]
    async fn test_full_channel_drops_event() {
        let (tx, _rx) = mpsc::channel(1);
        let sink = EventSink::new(tx);
        sink.emit(EventKind::Query, Labels::from_name("one.example"));
        // second emit exceeds the buffer; it must not block or panic
        sink.emit(EventKind::Query, Labels::from_name("two.example"));
    }
}
