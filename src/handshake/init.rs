//! INIT/RESPONSE construction and processing (§4.4).
//!
//! One resolution beyond the three Open Questions recorded in
//! `SPEC_FULL.md` §4/§9: the literal RESPONSE payload in §4.4
//! (`ephemeral_pub(32) || session_id(8) || [ticket]`, all AEAD-sealed under
//! the responder's freshly *derived* send key) is circular — deriving that
//! send key requires the ECDH shared secret, which requires the responder's
//! ephemeral public key, which is exactly the first field of the payload it
//! would be sealing. This implementation sends `ephemeral_pub` as a
//! cleartext prefix (mirroring INIT's cleartext nonce prefix) and AEAD-seals
//! only `session_id || [ticket]`, which both sides can derive keys for
//! without circularity. Recorded here rather than guessed silently.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use rand_core::{OsRng, RngCore};

use crate::crypto::{
    aead_open, aead_seal, hkdf_expand, hkdf_extract, public_key_from_bytes, sequence_nonce,
    KeyPair, Psk,
};
use crate::error::VeilError;
use crate::handshake::nonce_cache::ReplayNonceCache;
use crate::session::keys::{SessionKeys, SESSION_KEY_MATERIAL_LEN};

pub const DEFAULT_SKEW_TOLERANCE: Duration = Duration::from_secs(30);
pub const DEFAULT_NONCE_CACHE_CAPACITY: usize = 10_000;

pub struct HandshakeConfig {
    pub skew_tolerance: Duration,
    pub nonce_cache_capacity: usize,
}

impl Default for HandshakeConfig {
    fn default() -> Self {
        HandshakeConfig {
            skew_tolerance: DEFAULT_SKEW_TOLERANCE,
            nonce_cache_capacity: DEFAULT_NONCE_CACHE_CAPACITY,
        }
    }
}

fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

fn init_key(psk: &Psk) -> [u8; 32] {
    let prk = hkdf_extract(&psk.0, &[]);
    let okm = hkdf_expand(&prk, b"veil-init", 32).expect("32 bytes is within HKDF expand bounds");
    let mut key = [0u8; 32];
    key.copy_from_slice(&okm);
    key
}

/// State the initiator retains between sending INIT and processing RESPONSE.
pub struct PendingInit {
    pub ephemeral: KeyPair,
    pub init_nonce: [u8; 16],
}

/// Builds the INIT datagram: `nonce(12) || AEAD(seal(...))`.
pub fn build_init(psk: &Psk) -> (Vec<u8>, PendingInit) {
    let ephemeral = KeyPair::generate();
    let mut init_nonce = [0u8; 16];
    OsRng.fill_bytes(&mut init_nonce);
    let timestamp_ms = now_ms();

    let mut plaintext = Vec::with_capacity(32 + 8 + 16);
    plaintext.extend_from_slice(&ephemeral.public_bytes());
    plaintext.extend_from_slice(&timestamp_ms.to_be_bytes());
    plaintext.extend_from_slice(&init_nonce);

    let mut wire_nonce = [0u8; 12];
    OsRng.fill_bytes(&mut wire_nonce);
    let key = init_key(psk);
    let sealed = aead_seal(&key, &wire_nonce, &[], &plaintext)
        .expect("AEAD seal cannot fail for valid key/nonce lengths");

    let mut wire = Vec::with_capacity(12 + sealed.len());
    wire.extend_from_slice(&wire_nonce);
    wire.extend_from_slice(&sealed);

    (wire, PendingInit { ephemeral, init_nonce })
}

/// What the responder learned from a validated INIT.
pub struct AcceptedInit {
    pub initiator_pub_bytes: [u8; 32],
    pub init_nonce: [u8; 16],
}

/// §4.4 "Responder processing of INIT", steps 1-3. Step 1's failure and
/// step 2/3's rejections are all silent drops (anti-probing / replay), so
/// this returns `None` rather than a typed error.
pub fn process_init(
    psk: &Psk,
    nonce_cache: &mut ReplayNonceCache,
    config: &HandshakeConfig,
    wire: &[u8],
) -> Option<AcceptedInit> {
    if wire.len() < 12 {
        return None;
    }
    let (nonce, sealed) = wire.split_at(12);
    let nonce: [u8; 12] = nonce.try_into().ok()?;
    let key = init_key(psk);
    let plaintext = aead_open(&key, &nonce, &[], sealed)?;
    if plaintext.len() != 32 + 8 + 16 {
        return None;
    }

    let initiator_pub_bytes: [u8; 32] = plaintext[0..32].try_into().ok()?;
    let timestamp_ms = u64::from_be_bytes(plaintext[32..40].try_into().ok()?);
    let init_nonce: [u8; 16] = plaintext[40..56].try_into().ok()?;

    let now = now_ms();
    let skew = now.abs_diff(timestamp_ms);
    if skew > config.skew_tolerance.as_millis() as u64 {
        return None;
    }

    if nonce_cache.check_and_insert(init_nonce) {
        return None;
    }

    Some(AcceptedInit { initiator_pub_bytes, init_nonce })
}

/// §4.4 step 5: derives `SessionKeys` for either side given the ECDH shared
/// secret and the handshake transcript (`initiator_pub || responder_pub`).
pub fn derive_session_keys(
    psk: &Psk,
    init_nonce: &[u8; 16],
    shared: &[u8; 32],
    initiator_pub: &[u8; 32],
    responder_pub: &[u8; 32],
    is_initiator: bool,
) -> SessionKeys {
    let mut salt = Vec::with_capacity(32 + 16);
    salt.extend_from_slice(&psk.0);
    salt.extend_from_slice(init_nonce);
    let prk = hkdf_extract(&salt, shared);

    let mut info = Vec::with_capacity(16 + 32 + 32);
    info.extend_from_slice(b"veil-session-v1");
    info.extend_from_slice(initiator_pub);
    info.extend_from_slice(responder_pub);

    let material = hkdf_expand(&prk, &info, SESSION_KEY_MATERIAL_LEN)
        .expect("88 bytes is within HKDF expand bounds");
    SessionKeys::from_material(&material, is_initiator)
}

/// Builds the RESPONSE datagram: `responder_ephemeral_pub(32, clear) ||
/// ciphertext` where the ciphertext seals `Control{kHandshakeResponse}`
/// carrying `session_id || [ticket]`, keyed by the responder's freshly
/// derived send key at counter 0 (reserved).
pub fn build_response(
    responder_send_key: &[u8; 32],
    responder_send_nonce_base: &[u8; 12],
    responder_ephemeral_pub: [u8; 32],
    session_id: u64,
    ticket: Option<&[u8]>,
) -> Vec<u8> {
    use crate::proto::{control_kind, WireFrame};

    let mut control_payload = Vec::with_capacity(8 + ticket.map_or(0, |t| 2 + t.len()));
    control_payload.extend_from_slice(&session_id.to_be_bytes());
    if let Some(t) = ticket {
        control_payload.extend_from_slice(&(t.len() as u16).to_be_bytes());
        control_payload.extend_from_slice(t);
    }

    let frame = WireFrame::Control {
        kind: control_kind::HANDSHAKE_RESPONSE,
        payload: control_payload,
    };
    let frame_bytes = frame.encode();

    let nonce = sequence_nonce(responder_send_nonce_base, 0);
    let ciphertext = aead_seal(responder_send_key, &nonce, &[], &frame_bytes)
        .expect("AEAD seal cannot fail for valid key/nonce lengths");

    let mut wire = Vec::with_capacity(32 + ciphertext.len());
    wire.extend_from_slice(&responder_ephemeral_pub);
    wire.extend_from_slice(&ciphertext);
    wire
}

pub struct AcceptedResponse {
    pub session_id: u64,
    pub ticket: Option<Vec<u8>>,
}

/// §4.4 "Initiator processing of RESPONSE". The initiator already holds its
/// own ephemeral secret and the retained `init_nonce`; it reads the
/// cleartext responder ephemeral public key, completes the ECDH, derives
/// the same `SessionKeys`, and decrypts the remainder at counter 0.
pub fn process_response(
    psk: &Psk,
    pending: &PendingInit,
    wire: &[u8],
) -> Result<(AcceptedResponse, SessionKeys), VeilError> {
    if wire.len() < 32 {
        return Err(VeilError::HandshakeReject("RESPONSE too short".into()));
    }
    let (responder_pub_bytes, ciphertext) = wire.split_at(32);
    let responder_pub_bytes: [u8; 32] = responder_pub_bytes.try_into().unwrap();
    let responder_pub = public_key_from_bytes(responder_pub_bytes);

    let shared = pending
        .ephemeral
        .ecdh(&responder_pub)
        .map_err(|e| VeilError::HandshakeReject(e.to_string()))?;

    let initiator_pub = pending.ephemeral.public_bytes();
    let keys = derive_session_keys(
        psk,
        &pending.init_nonce,
        shared.as_bytes(),
        &initiator_pub,
        &responder_pub_bytes,
        true,
    );

    let nonce = sequence_nonce(&keys.recv_nonce_base, 0);
    let plaintext = aead_open(&keys.recv_key, &nonce, &[], ciphertext)
        .ok_or_else(|| VeilError::HandshakeReject("RESPONSE authentication failed".into()))?;

    let frame = crate::proto::decode(&plaintext)
        .map_err(|e| VeilError::HandshakeReject(e.to_string()))?;

    let crate::proto::WireFrame::Control { payload, .. } = frame else {
        return Err(VeilError::HandshakeReject("RESPONSE frame was not Control".into()));
    };
    if payload.len() < 8 {
        return Err(VeilError::HandshakeReject("RESPONSE control payload too short".into()));
    }
    let session_id = u64::from_be_bytes(payload[0..8].try_into().unwrap());
    let ticket = if payload.len() > 8 {
        if payload.len() < 10 {
            return Err(VeilError::HandshakeReject("truncated ticket length prefix".into()));
        }
        let ticket_len = u16::from_be_bytes(payload[8..10].try_into().unwrap()) as usize;
        if payload.len() != 10 + ticket_len {
            return Err(VeilError::HandshakeReject("ticket length mismatch".into()));
        }
        Some(payload[10..].to_vec())
    } else {
        None
    };

    Ok((AcceptedResponse { session_id, ticket }, keys))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn psk() -> Psk {
        Psk((0..32u8).collect::<Vec<_>>().try_into().unwrap())
    }

    #[test]
    fn full_handshake_establishes_matching_session_keys() {
        let psk = psk();
        let mut cache = ReplayNonceCache::new(10_000);
        let config = HandshakeConfig::default();

        let (init_wire, pending) = build_init(&psk);
        let accepted_init = process_init(&psk, &mut cache, &config, &init_wire).unwrap();

        let responder_ephemeral = KeyPair::generate();
        let initiator_pub = public_key_from_bytes(accepted_init.initiator_pub_bytes);
        let shared = responder_ephemeral.ecdh(&initiator_pub).unwrap();
        let responder_keys = derive_session_keys(
            &psk,
            &accepted_init.init_nonce,
            shared.as_bytes(),
            &accepted_init.initiator_pub_bytes,
            &responder_ephemeral.public_bytes(),
            false,
        );

        let response_wire = build_response(
            &responder_keys.send_key,
            &responder_keys.send_nonce_base,
            responder_ephemeral.public_bytes(),
            0xC0FFEE,
            None,
        );

        let (accepted_response, initiator_keys) =
            process_response(&psk, &pending, &response_wire).unwrap();

        assert_eq!(accepted_response.session_id, 0xC0FFEE);
        assert_eq!(initiator_keys.send_key, responder_keys.recv_key);
        assert_eq!(initiator_keys.recv_key, responder_keys.send_key);
    }

    #[test]
    fn replayed_init_nonce_is_rejected() {
        let psk = psk();
        let mut cache = ReplayNonceCache::new(10_000);
        let config = HandshakeConfig::default();
        let (init_wire, _pending) = build_init(&psk);
        assert!(process_init(&psk, &mut cache, &config, &init_wire).is_some());
        assert!(process_init(&psk, &mut cache, &config, &init_wire).is_none());
    }
}
