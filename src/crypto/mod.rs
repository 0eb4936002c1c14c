//! Crypto primitives (C1): X25519 ECDH, HKDF-SHA256, HMAC-SHA256,
//! ChaCha20-Poly1305 AEAD, and the sequence-number obfuscation PRF.
//!
//! Grounded on `relay/crypto.rs`'s handshake shape (X25519 → HKDF → AEAD),
//! generalized and split into focused submodules since the tunnel layer
//! needs the PRK, raw HMAC, and a nonce-derivation function individually
//! rather than bundled behind a single `RelayE2e`-style type.

pub mod aead;
pub mod kdf;
pub mod keys;
pub mod seq;

pub use aead::{aead_open, aead_seal};
pub use kdf::{hkdf, hkdf_expand, hkdf_extract, hmac_sha256};
pub use keys::{public_key_from_bytes, KeyPair, Psk, SharedSecret};
pub use seq::{sequence_nonce, sequence_prf};
