//! `Session`: the authoritative per-peer state (C5, §3, §4.5).
//!
//! Grounded in spirit on `src/session/mod.rs`'s per-session registry idiom
//! (a single struct owning everything needed to service one peer), rebuilt
//! entirely around tunnel semantics — sequence counters, replay window, ACK
//! bitmap, retransmit buffer, obfuscation profile — in place of the
//! teacher's agent-runner bookkeeping.

use std::time::{Duration, Instant};

use rand_core::{OsRng, RngCore};

use crate::crypto::{aead_open, aead_seal, hkdf, sequence_nonce};
use crate::error::VeilError;
use crate::obfuscation::ObfuscationProfile;
use crate::proto::{build_datagram, control_kind, decode, parse_datagram, WireFrame};
use crate::session::ack::AckBitmap;
use crate::session::keys::{SessionKeys, SESSION_KEY_MATERIAL_LEN};
use crate::session::replay::{ReplayCheck, ReplayWindow};
use crate::session::retransmit::{RetransmitBuffer, RetransmitSweep, DEFAULT_CAPACITY};

const REKEY_BYTES_THRESHOLD: u64 = 1 << 30; // 1 GiB
const REKEY_PACKETS_THRESHOLD: u64 = 1 << 24;
const REKEY_ELAPSED: Duration = Duration::from_secs(3600);
const REKEY_DRAIN_GRACE: Duration = Duration::from_secs(2);
const MAX_CONSECUTIVE_AUTH_FAILURES: u32 = 16;

/// A previously-rotated keyset kept alive until in-flight packets encrypted
/// under it have drained (§3 invariant: previous keys cleared no later than
/// `rekey_drain_grace` after rotation).
struct RetiredKeys {
    keys: SessionKeys,
    retired_at: Instant,
}

pub struct Session {
    pub session_id: u64,
    pub is_initiator: bool,

    keys: SessionKeys,
    previous_keys: Option<RetiredKeys>,

    pub send_seq: u64,
    replay_window: ReplayWindow,
    ack_state: AckBitmap,
    retransmit_buffer: RetransmitBuffer,

    pub obfuscation_profile: ObfuscationProfile,

    pub created_at: Instant,
    pub last_activity: Instant,
    pub bytes_sent_since_rekey: u64,
    pub packets_sent_since_rekey: u64,
    rekey_started_at: Instant,
    pub rekey_generation: u32,
    rekey_in_progress: bool,

    pub consecutive_auth_failures: u32,

    pub replay_drops: u64,
    pub auth_failures_total: u64,
}

/// What the caller should do after decrypting an inbound datagram.
pub enum InboundOutcome {
    /// Frame authenticated and passed replay checks; dispatch on its kind.
    Accepted(WireFrame),
    /// Dropped per policy (replay, auth failure, malformed) — counters are
    /// already updated internally; no further action beyond logging.
    Dropped,
    /// Consecutive auth failures exceeded the fatal threshold; the session
    /// must be torn down.
    Fatal,
}

impl Session {
    pub fn new(
        session_id: u64,
        is_initiator: bool,
        keys: SessionKeys,
        obfuscation_profile: ObfuscationProfile,
    ) -> Self {
        let now = Instant::now();
        Session {
            session_id,
            is_initiator,
            keys,
            previous_keys: None,
            // Counter 0 is reserved for the RESPONSE frame (§4.4); the first
            // data frame uses counter 1.
            send_seq: if is_initiator { 1 } else { 0 },
            replay_window: ReplayWindow::default(),
            ack_state: AckBitmap::default(),
            retransmit_buffer: RetransmitBuffer::new(DEFAULT_CAPACITY),
            obfuscation_profile,
            created_at: now,
            last_activity: now,
            bytes_sent_since_rekey: 0,
            packets_sent_since_rekey: 0,
            rekey_started_at: now,
            rekey_generation: 0,
            rekey_in_progress: false,
            consecutive_auth_failures: 0,
            replay_drops: 0,
            auth_failures_total: 0,
        }
    }

    pub fn recv_seq_high(&self) -> u64 {
        self.replay_window.recv_seq_high()
    }

    pub fn ack_state(&self) -> &AckBitmap {
        &self.ack_state
    }

    /// §4.5 "Encrypt outbound": seals one already-fragmented frame, applies
    /// padding, and returns the obfuscated datagram ready to send. Also
    /// records it in the retransmit buffer.
    pub fn encrypt_outbound(&mut self, mut frame: WireFrame) -> Vec<u8> {
        let seq = self.send_seq;
        self.send_seq += 1;

        let padding_len = self.obfuscation_profile.padding_len(seq);
        if let WireFrame::Data { payload, .. } = &mut frame {
            let mut padding = vec![0u8; padding_len];
            if self.obfuscation_profile.config.entropy_normalization {
                self.obfuscation_profile.apply_entropy_normalization(&mut padding, seq);
            }
            payload.extend_from_slice(&padding);
        }

        let frame_bytes = frame.encode();
        let nonce = sequence_nonce(&self.keys.send_nonce_base, seq);
        let ciphertext = aead_seal(&self.keys.send_key, &nonce, &[], &frame_bytes)
            .expect("AEAD seal cannot fail for valid key/nonce lengths");

        let datagram = build_datagram(&self.obfuscation_profile, seq, &ciphertext);

        self.retransmit_buffer.insert(seq, datagram.clone(), Instant::now());
        self.bytes_sent_since_rekey += datagram.len() as u64;
        self.packets_sent_since_rekey += 1;
        self.last_activity = Instant::now();

        datagram
    }

    /// §4.5 "Decrypt inbound datagram": full pipeline from raw datagram to
    /// dispatch-ready frame, including replay protection and the fatal
    /// auth-failure threshold (§4.4 state machine, post-Established).
    pub fn decrypt_inbound(&mut self, datagram: &[u8]) -> InboundOutcome {
        let parsed = match parse_datagram(&self.obfuscation_profile, datagram) {
            Some(p) => p,
            None => return InboundOutcome::Dropped,
        };

        match self.replay_window.check(parsed.seq) {
            ReplayCheck::TooOld | ReplayCheck::AlreadySeen => {
                self.replay_drops += 1;
                return InboundOutcome::Dropped;
            }
            ReplayCheck::Accept => {}
        }

        let nonce = sequence_nonce(&self.keys.recv_nonce_base, parsed.seq);
        let plaintext = aead_open(&self.keys.recv_key, &nonce, &[], parsed.ciphertext).or_else(|| {
            // Try the retiring keyset too — packets encrypted just before a
            // rekey may still be in flight during the drain grace period.
            self.previous_keys.as_ref().and_then(|retired| {
                let nonce = sequence_nonce(&retired.keys.recv_nonce_base, parsed.seq);
                aead_open(&retired.keys.recv_key, &nonce, &[], parsed.ciphertext)
            })
        });

        let plaintext = match plaintext {
            Some(pt) => pt,
            None => {
                self.auth_failures_total += 1;
                self.consecutive_auth_failures += 1;
                if self.consecutive_auth_failures >= MAX_CONSECUTIVE_AUTH_FAILURES {
                    return InboundOutcome::Fatal;
                }
                return InboundOutcome::Dropped;
            }
        };

        self.consecutive_auth_failures = 0;
        self.replay_window.accept(parsed.seq);
        self.last_activity = Instant::now();

        match decode(&plaintext) {
            Ok(frame) => InboundOutcome::Accepted(frame),
            Err(_) => InboundOutcome::Dropped,
        }
    }

    pub fn ack(&mut self, seq: u64) {
        self.ack_state.ack(seq);
    }

    pub fn is_acked(&self, seq: u64) -> bool {
        self.ack_state.is_acked(seq)
    }

    pub fn remove_acked(&mut self, seq: u64) {
        self.retransmit_buffer.remove(seq);
    }

    pub fn retransmit_sweep(&mut self, now: Instant) -> RetransmitSweep {
        self.retransmit_buffer.sweep(now)
    }

    pub fn retransmit_buffer_len(&self) -> usize {
        self.retransmit_buffer.len()
    }

    /// §4.5 "Rekey": true once either byte-count, packet-count, or elapsed
    /// thresholds are exceeded.
    pub fn rekey_due(&self) -> bool {
        self.bytes_sent_since_rekey > REKEY_BYTES_THRESHOLD
            || self.packets_sent_since_rekey > REKEY_PACKETS_THRESHOLD
            || self.rekey_started_at.elapsed() > REKEY_ELAPSED
    }

    /// Begins a rekey: derives a fresh salt, computes the next generation's
    /// keys deterministically from the current `recv_key` (Open Question #2
    /// resolution), and returns the `Control{kRekey}` payload to send. The
    /// new keys are not switched into `send_key` until the control frame's
    /// ACK arrives — see [`Session::confirm_rekey`].
    pub fn begin_rekey(&mut self) -> (WireFrame, SessionKeys) {
        let mut salt = [0u8; 32];
        OsRng.fill_bytes(&mut salt);

        let next_generation = self.rekey_generation.wrapping_add(1);
        let new_keys =
            derive_rekeyed_keys(&self.keys.recv_key, next_generation, &salt, self.is_initiator);

        let mut payload = Vec::with_capacity(4 + 32);
        payload.extend_from_slice(&next_generation.to_be_bytes());
        payload.extend_from_slice(&salt);

        self.rekey_in_progress = true;
        (
            WireFrame::Control {
                kind: control_kind::REKEY,
                payload,
            },
            new_keys,
        )
    }

    /// Called when the peer's ACK for the rekey control frame arrives:
    /// retires the current keys (kept for `REKEY_DRAIN_GRACE`) and switches
    /// to `new_keys`.
    pub fn confirm_rekey(&mut self, new_keys: SessionKeys, new_generation: u32) {
        let old_keys = std::mem::replace(&mut self.keys, new_keys);
        self.previous_keys = Some(RetiredKeys {
            keys: old_keys,
            retired_at: Instant::now(),
        });
        self.rekey_generation = new_generation;
        self.rekey_in_progress = false;
        self.bytes_sent_since_rekey = 0;
        self.packets_sent_since_rekey = 0;
        self.rekey_started_at = Instant::now();
    }

    /// Processes a peer-initiated `Control{kRekey}` payload (generation +
    /// salt), deriving the same keys the peer derived, and adopts them
    /// immediately for receive (the peer is the one switching `send_key`
    /// after their own ACK wait, so the receiver side just needs to be
    /// ready to decrypt under the new generation).
    pub fn apply_peer_rekey(&mut self, payload: &[u8]) -> Result<(), VeilError> {
        if payload.len() != 4 + 32 {
            return Err(VeilError::ProtocolDrop("malformed rekey control frame".into()));
        }
        let generation = u32::from_be_bytes(payload[0..4].try_into().unwrap());
        let salt: [u8; 32] = payload[4..36].try_into().unwrap();
        let new_keys =
            derive_rekeyed_keys(&self.keys.send_key, generation, &salt, self.is_initiator);
        self.confirm_rekey(new_keys, generation);
        Ok(())
    }

    /// Drops the retired keyset once the drain grace period has elapsed.
    /// Should be polled from the event loop's idle tick.
    pub fn expire_retired_keys(&mut self) {
        if let Some(retired) = &self.previous_keys {
            if retired.retired_at.elapsed() >= REKEY_DRAIN_GRACE {
                self.previous_keys = None;
            }
        }
    }
}

/// Open Question #2 resolution: `new_keys = HKDF(salt = old_key ||
/// generation_be || fresh_salt, ikm = old_key)`, expanded exactly as in the
/// handshake (88 bytes, same field layout).
fn derive_rekeyed_keys(
    old_key: &[u8; 32],
    generation: u32,
    fresh_salt: &[u8; 32],
    is_initiator: bool,
) -> SessionKeys {
    let mut salt = Vec::with_capacity(32 + 4 + 32);
    salt.extend_from_slice(old_key);
    salt.extend_from_slice(&generation.to_be_bytes());
    salt.extend_from_slice(fresh_salt);

    let material = hkdf(&salt, old_key, b"veil-session-v1", SESSION_KEY_MATERIAL_LEN)
        .expect("88 bytes is within HKDF expand bounds");
    // Both peers derive the identical `material` (the IKM and salt are the
    // same 32-byte key on both sides); role assignment mirrors the initial
    // handshake so directions stay crossed after the rotation.
    SessionKeys::from_material(&material, is_initiator)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscation::ObfuscationConfig;

    fn test_session(is_initiator: bool) -> Session {
        let keys = SessionKeys {
            send_key: [1u8; 32],
            recv_key: [2u8; 32],
            send_nonce_base: [0u8; 12],
            recv_nonce_base: [0u8; 12],
        };
        let profile = ObfuscationProfile::new([9u8; 32], ObfuscationConfig::default());
        Session::new(42, is_initiator, keys, profile)
    }

    #[test]
    fn initiator_counter_starts_at_one() {
        let s = test_session(true);
        assert_eq!(s.send_seq, 1);
    }

    #[test]
    fn encrypt_then_decrypt_roundtrips_between_peers() {
        let mut a = test_session(true);
        let mut b = test_session(false);
        // Swap keys so a.send == b.recv and vice versa, mimicking a real
        // handshake's directional assignment.
        std::mem::swap(&mut a.keys, &mut b.keys);

        let frame = WireFrame::Data {
            stream_id: 0,
            sequence: a.send_seq,
            fin: false,
            payload: b"hello".to_vec(),
        };
        let datagram = a.encrypt_outbound(frame);
        match b.decrypt_inbound(&datagram) {
            InboundOutcome::Accepted(WireFrame::Data { payload, .. }) => {
                assert!(payload.starts_with(b"hello"));
            }
            _ => panic!("expected accepted data frame"),
        }
    }

    #[test]
    fn replay_is_dropped() {
        let mut a = test_session(true);
        let mut b = test_session(false);
        std::mem::swap(&mut a.keys, &mut b.keys);

        let frame = WireFrame::Data {
            stream_id: 0,
            sequence: a.send_seq,
            fin: false,
            payload: b"x".to_vec(),
        };
        let datagram = a.encrypt_outbound(frame);
        assert!(matches!(b.decrypt_inbound(&datagram), InboundOutcome::Accepted(_)));
        assert!(matches!(b.decrypt_inbound(&datagram), InboundOutcome::Dropped));
        assert_eq!(b.replay_drops, 1);
    }
}
