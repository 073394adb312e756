//! Pending request registry
//!
//! Outbound queries are rewritten to a fresh synthetic 16-bit transaction
//! ID before they leave the gateway; the registry binds each synthetic ID
//! to the originating flow so the asynchronous response can be routed
//! back. Entries age out after [`PENDING_TTL`]; a response arriving later
//! is dropped on the unknown-ID path.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use rand::rngs::OsRng;
use rand::RngCore;

/// How long a pending entry stays claimable
pub const PENDING_TTL: Duration = Duration::from_secs(30);

/// Random ID draws per allocation round before sweeping
const ALLOC_ATTEMPTS: usize = 10;

/// Addressing a front-end needs to mirror a reply back onto the
/// originating flow. A value copy, never aliased with receive buffers.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReturnEnvelope {
    /// Where the query came from (reply destination)
    pub src: SocketAddr,
    /// Where the query was addressed (reply source)
    pub dst: SocketAddr,
}

#[derive(Debug)]
struct Pending {
    original_id: u16,
    envelope: ReturnEnvelope,
    enqueued: Instant,
}

/// Table of in-flight queries keyed by synthetic transaction ID
#[derive(Debug, Default)]
pub struct RequestRegistry {
    pending: Mutex<HashMap<u16, Pending>>,
}

impl RequestRegistry {
    pub fn new() -> Self {
        RequestRegistry::default()
    }

    /// Allocate a synthetic ID and bind it to the flow.
    ///
    /// IDs are drawn from the system CSPRNG, ten attempts per round; a
    /// fully-collided round sweeps expired entries and tries again.
    /// Expired entries are also swept up front, so a registration attempt
    /// always clears anything older than [`PENDING_TTL`].
    pub fn register(&self, envelope: ReturnEnvelope, original_id: u16) -> u16 {
        let mut pending = self.pending.lock().expect("registry mutex poisoned");
        sweep(&mut pending, Instant::now());

        loop {
            for _ in 0..ALLOC_ATTEMPTS {
                let id = random_id();
                if !pending.contains_key(&id) {
                    pending.insert(
                        id,
                        Pending {
                            original_id,
                            envelope,
                            enqueued: Instant::now(),
                        },
                    );
                    return id;
                }
            }
            sweep(&mut pending, Instant::now());
        }
    }

    /// Take the entry for a response. `None` means unknown or already
    /// claimed or expired; the caller drops the response.
    pub fn claim(&self, id: u16) -> Option<(ReturnEnvelope, u16)> {
        let mut pending = self.pending.lock().expect("registry mutex poisoned");
        pending
            .remove(&id)
            .map(|entry| (entry.envelope, entry.original_id))
    }

    /// Number of live entries
    pub fn len(&self) -> usize {
        self.pending.lock().expect("registry mutex poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    #[cfg(test)]
    fn insert_aged(&self, id: u16, original_id: u16, envelope: ReturnEnvelope, age: Duration) {
        let mut pending = self.pending.lock().unwrap();
        pending.insert(
            id,
            Pending {
                original_id,
                envelope,
                enqueued: Instant::now() - age,
            },
        );
    }
}

fn sweep(pending: &mut HashMap<u16, Pending>, now: Instant) {
    pending.retain(|_, entry| now.duration_since(entry.enqueued) <= PENDING_TTL);
}

fn random_id() -> u16 {
    let mut buf = [0u8; 2];
    OsRng.fill_bytes(&mut buf);
    u16::from_be_bytes(buf)
}
