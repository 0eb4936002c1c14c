//! End-to-end handshake scenarios (§8): loopback INIT/RESPONSE, replayed
//! nonce, and stale-clock rejection, exercised purely through the public
//! `veil::handshake` API rather than over a real socket.

use veil::crypto::{public_key_from_bytes, KeyPair, Psk};
use veil::handshake::{
    build_init, build_response, derive_session_keys, process_init, process_response,
    HandshakeConfig, ReplayNonceCache,
};

fn psk(byte: u8) -> Psk {
    Psk([byte; 32])
}

/// Drives a full INIT -> RESPONSE exchange between two independent sides
/// and returns each side's derived keys.
fn run_handshake(shared_psk: &Psk) -> (veil::session::SessionKeys, veil::session::SessionKeys, u64) {
    let mut nonce_cache = ReplayNonceCache::new(10_000);
    let config = HandshakeConfig::default();

    let (init_wire, pending) = build_init(shared_psk);
    let accepted_init = process_init(shared_psk, &mut nonce_cache, &config, &init_wire)
        .expect("valid INIT must be accepted");

    let responder_ephemeral = KeyPair::generate();
    let initiator_pub = public_key_from_bytes(accepted_init.initiator_pub_bytes);
    let shared = responder_ephemeral.ecdh(&initiator_pub).unwrap();
    let responder_keys = derive_session_keys(
        shared_psk,
        &accepted_init.init_nonce,
        shared.as_bytes(),
        &accepted_init.initiator_pub_bytes,
        &responder_ephemeral.public_bytes(),
        false,
    );

    let session_id = 0x5EED_0001;
    let response_wire = build_response(
        &responder_keys.send_key,
        &responder_keys.send_nonce_base,
        responder_ephemeral.public_bytes(),
        session_id,
        None,
    );

    let (accepted_response, initiator_keys) =
        process_response(shared_psk, &pending, &response_wire).expect("valid RESPONSE must be accepted");
    assert_eq!(accepted_response.session_id, session_id);

    (initiator_keys, responder_keys, session_id)
}

#[test]
fn loopback_handshake_crosses_send_and_recv_keys() {
    let shared_psk = psk(0x42);
    let (initiator_keys, responder_keys, _session_id) = run_handshake(&shared_psk);

    assert_eq!(initiator_keys.send_key, responder_keys.recv_key);
    assert_eq!(initiator_keys.recv_key, responder_keys.send_key);
    assert_eq!(initiator_keys.send_nonce_base, responder_keys.recv_nonce_base);
    assert_eq!(initiator_keys.recv_nonce_base, responder_keys.send_nonce_base);
}

#[test]
fn mismatched_psk_is_rejected() {
    let mut nonce_cache = ReplayNonceCache::new(10_000);
    let config = HandshakeConfig::default();

    let (init_wire, _pending) = build_init(&psk(0x11));
    assert!(process_init(&psk(0x22), &mut nonce_cache, &config, &init_wire).is_none());
}

#[test]
fn replayed_init_is_dropped_on_second_delivery() {
    let shared_psk = psk(0x77);
    let mut nonce_cache = ReplayNonceCache::new(10_000);
    let config = HandshakeConfig::default();

    let (init_wire, _pending) = build_init(&shared_psk);
    assert!(process_init(&shared_psk, &mut nonce_cache, &config, &init_wire).is_some());
    assert!(process_init(&shared_psk, &mut nonce_cache, &config, &init_wire).is_none());
}

#[test]
fn garbage_response_is_rejected_without_panicking() {
    let shared_psk = psk(0x99);
    let (_init_wire, pending) = build_init(&shared_psk);
    let garbage = vec![0u8; 10];
    assert!(process_response(&shared_psk, &pending, &garbage).is_err());
}
