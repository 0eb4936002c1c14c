//! ChaCha20-Poly1305 AEAD seal/open (C1).
//!
//! Grounded on `relay/crypto.rs::encrypt`/`decrypt`; generalized to take an
//! explicit nonce and AAD rather than an internal counter, since the tunnel
//! layer derives nonces from the sequence number (`sequence_nonce`) rather
//! than a simple monotonic counter.

use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Key, Nonce,
};

use crate::error::CryptoError;

pub const TAG_LEN: usize = 16;
pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;

/// Seals `plaintext`, returning `ciphertext || 16-byte tag` (length
/// `plaintext.len() + 16`).
pub fn aead_seal(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> Result<Vec<u8>, CryptoError> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            chacha20poly1305::aead::Payload { msg: plaintext, aad },
        )
        .map_err(|_| CryptoError::AeadOpenFailed)
}

/// Opens a sealed buffer. Returns `None` on authentication failure — never a
/// distinguishable error, and never partial plaintext.
pub fn aead_open(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    sealed: &[u8],
) -> Option<Vec<u8>> {
    let cipher = ChaCha20Poly1305::new(Key::from_slice(key));
    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            chacha20poly1305::aead::Payload { msg: sealed, aad },
        )
        .ok()
}
