//! Sequence-number nonce derivation and wire-sequence obfuscation (C1, §4.1).
//!
//! `sequence_prf` is **not** cryptographic secrecy: it is a one-round,
//! self-inverse Feistel permutation whose only job is to destroy the
//! linear-counter pattern a plain `send_seq` would leave on the wire. No
//! teacher analog exists for this (the teacher's relay nonces are flat
//! counters); the construction below follows the spec's literal round
//! function: four bytes of ChaCha20 keystream keyed by the obfuscation key,
//! with the right half plus a domain tag forming the stream nonce.

use chacha20::cipher::{KeyIvInit, StreamCipher, StreamCipherSeek};
use chacha20::{ChaCha20, Key, Nonce};

use crate::crypto::aead::NONCE_LEN;

/// XORs the big-endian 8-byte counter into the low 8 bytes of `base_nonce`.
pub fn sequence_nonce(base_nonce: &[u8; NONCE_LEN], counter: u64) -> [u8; NONCE_LEN] {
    let mut nonce = *base_nonce;
    let ctr_be = counter.to_be_bytes();
    for i in 0..8 {
        nonce[4 + i] ^= ctr_be[i];
    }
    nonce
}

const DOMAIN_TAG: [u8; 4] = *b"vseq";

/// One-round Feistel PRP over a 64-bit sequence number. Splits `seq` into two
/// 32-bit halves `(l, r)`, XORs `l` with four bytes of ChaCha20 keystream
/// derived from `(obf_key, r, domain tag)`, and leaves `r` untouched: output
/// is `(l', r)`. Unlike a textbook Feistel round, this does *not* swap the
/// halves, which is what makes a single round self-inverse: `r` never
/// changes, so applying the same XOR mask a second time cancels it.
pub fn sequence_prf(obf_key: &[u8; 32], seq: u64) -> u64 {
    let l = (seq >> 32) as u32;
    let r = seq as u32;

    let round_output = feistel_round(obf_key, r);
    let l_prime = l ^ round_output;

    ((l_prime as u64) << 32) | (r as u64)
}

fn feistel_round(obf_key: &[u8; 32], half: u32) -> u32 {
    // Stream-cipher nonce: domain tag || half (BE), 12 bytes total — keeps the
    // keystream position deterministic and distinct per half value.
    let mut nonce_bytes = [0u8; 12];
    nonce_bytes[..4].copy_from_slice(&DOMAIN_TAG);
    nonce_bytes[4..8].copy_from_slice(&half.to_be_bytes());
    // bytes 8..12 stay zero — we always seek to keystream position 0.

    let mut cipher = ChaCha20::new(Key::from_slice(obf_key), Nonce::from_slice(&nonce_bytes));
    cipher.seek(0u32);
    let mut block = [0u8; 4];
    cipher.apply_keystream(&mut block);
    u32::from_be_bytes(block)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prf_is_self_inverse() {
        let key = [9u8; 32];
        for seq in [0u64, 1, 42, u64::MAX, 0x0000_0000_ffff_ffff] {
            assert_eq!(sequence_prf(&key, sequence_prf(&key, seq)), seq);
        }
    }

    #[test]
    fn nonce_differs_per_counter() {
        let base = [0u8; NONCE_LEN];
        assert_ne!(sequence_nonce(&base, 1), sequence_nonce(&base, 2));
    }
}
