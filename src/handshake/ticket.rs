//! Session tickets (§3, §4.4 "0-RTT resumption").
//!
//! Plaintext payload layout (104 bytes): `issued_at_ms(8) ||
//! client_id_hash(8) || send_key(32) || recv_key(32) || send_nonce(12) ||
//! recv_nonce(12)`. The wire blob is `nonce(12) || AEAD(ticket_key, nonce,
//! ∅, plaintext)`, mirroring the INIT wire layout (`SPEC_FULL.md` §3).

use std::collections::HashMap;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand_core::{OsRng, RngCore};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::crypto::{aead_open, aead_seal};
use crate::session::SessionKeys;

pub const TICKET_PLAINTEXT_LEN: usize = 8 + 8 + 32 + 32 + 12 + 12;
pub const DEFAULT_TICKET_LIFETIME: Duration = Duration::from_secs(24 * 3600);
const MAX_TICKETS_PER_CLIENT: usize = 4;
const MAX_TICKETS_TOTAL: usize = 4096;

/// The server's ticket-encryption key, rotated independently of sessions.
/// Held as a zeroized handle (§5 "Zeroization discipline").
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct TicketKey(pub [u8; 32]);

impl TicketKey {
    pub fn generate() -> Self {
        let mut key = [0u8; 32];
        OsRng.fill_bytes(&mut key);
        TicketKey(key)
    }
}

#[derive(Clone)]
pub struct SessionTicketPlaintext {
    pub issued_at_ms: u64,
    pub client_id_hash: u64,
    pub keys: SessionKeys,
}

impl SessionTicketPlaintext {
    fn to_bytes(&self) -> [u8; TICKET_PLAINTEXT_LEN] {
        let mut buf = [0u8; TICKET_PLAINTEXT_LEN];
        buf[0..8].copy_from_slice(&self.issued_at_ms.to_be_bytes());
        buf[8..16].copy_from_slice(&self.client_id_hash.to_be_bytes());
        buf[16..48].copy_from_slice(&self.keys.send_key);
        buf[48..80].copy_from_slice(&self.keys.recv_key);
        buf[80..92].copy_from_slice(&self.keys.send_nonce_base);
        buf[92..104].copy_from_slice(&self.keys.recv_nonce_base);
        buf
    }

    fn from_bytes(buf: &[u8]) -> Option<Self> {
        if buf.len() != TICKET_PLAINTEXT_LEN {
            return None;
        }
        let issued_at_ms = u64::from_be_bytes(buf[0..8].try_into().ok()?);
        let client_id_hash = u64::from_be_bytes(buf[8..16].try_into().ok()?);
        let keys = SessionKeys {
            send_key: buf[16..48].try_into().ok()?,
            recv_key: buf[48..80].try_into().ok()?,
            send_nonce_base: buf[80..92].try_into().ok()?,
            recv_nonce_base: buf[92..104].try_into().ok()?,
        };
        Some(SessionTicketPlaintext { issued_at_ms, client_id_hash, keys })
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Issues a fresh opaque ticket blob for `client_id_hash`/`keys`.
pub fn issue(ticket_key: &TicketKey, client_id_hash: u64, keys: SessionKeys) -> Vec<u8> {
    let plaintext = SessionTicketPlaintext {
        issued_at_ms: now_ms(),
        client_id_hash,
        keys,
    };
    let body = plaintext.to_bytes();

    let mut nonce = [0u8; 12];
    OsRng.fill_bytes(&mut nonce);
    let sealed = aead_seal(&ticket_key.0, &nonce, &[], &body)
        .expect("AEAD seal cannot fail for valid key/nonce lengths");

    let mut blob = Vec::with_capacity(12 + sealed.len());
    blob.extend_from_slice(&nonce);
    blob.extend_from_slice(&sealed);
    blob
}

/// Decrypts and freshness-checks a ticket blob. Any failure (auth failure,
/// expired, truncated) returns `None` — the caller drops the frame and waits
/// for a fresh INIT, per §4.4.
pub fn validate(
    ticket_key: &TicketKey,
    blob: &[u8],
    lifetime: Duration,
) -> Option<SessionTicketPlaintext> {
    if blob.len() < 12 {
        return None;
    }
    let (nonce, sealed) = blob.split_at(12);
    let nonce: [u8; 12] = nonce.try_into().ok()?;
    let plaintext_bytes = aead_open(&ticket_key.0, &nonce, &[], sealed)?;
    let plaintext = SessionTicketPlaintext::from_bytes(&plaintext_bytes)?;

    let now = now_ms();
    let expires_at = plaintext.issued_at_ms.saturating_add(lifetime.as_millis() as u64);
    if now >= expires_at {
        return None;
    }
    Some(plaintext)
}

/// Server-side cache bounding tickets issued per client and in total, used
/// to enforce the anti-replay nonce check on resumption (§4.4 "Ticket
/// caches ... bounded").
#[derive(Default)]
pub struct TicketCache {
    by_client: HashMap<u64, Vec<[u8; 16]>>,
    total: usize,
}

impl TicketCache {
    /// Records that `nonce` (the ticket's embedded anti-replay nonce) has
    /// been consumed for `client_id_hash`. Returns `false` if it was already
    /// used (a replay) and the ticket must be rejected.
    pub fn consume(&mut self, client_id_hash: u64, nonce: [u8; 16]) -> bool {
        let entries = self.by_client.entry(client_id_hash).or_default();
        if entries.contains(&nonce) {
            return false;
        }
        entries.push(nonce);
        self.total += 1;
        if entries.len() > MAX_TICKETS_PER_CLIENT {
            entries.remove(0);
        }
        if self.total > MAX_TICKETS_TOTAL {
            // Evict from the largest bucket to keep the global bound; exact
            // victim choice is not safety-critical, only a memory bound.
            if let Some((_, v)) = self
                .by_client
                .iter_mut()
                .max_by_key(|(_, v)| v.len())
            {
                if !v.is_empty() {
                    v.remove(0);
                    self.total -= 1;
                }
            }
        }
        true
    }
}
