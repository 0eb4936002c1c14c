//! X25519 key pairs and ECDH (C1).

use rand_core::OsRng;
use x25519_dalek::{PublicKey, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::CryptoError;

/// An ephemeral (or static) X25519 key pair. The secret half is zeroed on
/// drop; it is never `Clone` or `Debug` to avoid accidental leakage into logs.
#[derive(ZeroizeOnDrop)]
pub struct KeyPair {
    #[zeroize(skip)]
    public: PublicKey,
    secret: StaticSecret,
}

impl KeyPair {
    /// Generates a fresh key pair from the OS RNG.
    pub fn generate() -> Self {
        let secret = StaticSecret::random_from_rng(OsRng);
        let public = PublicKey::from(&secret);
        KeyPair { public, secret }
    }

    pub fn public(&self) -> &PublicKey {
        &self.public
    }

    pub fn public_bytes(&self) -> [u8; 32] {
        *self.public.as_bytes()
    }

    /// X25519 Diffie-Hellman. Fails if the result is the all-zero identity
    /// point, which happens only for a degenerate/malicious peer key.
    pub fn ecdh(&self, peer_public: &PublicKey) -> Result<SharedSecret, CryptoError> {
        let shared = self.secret.diffie_hellman(peer_public);
        if shared.as_bytes().iter().all(|&b| b == 0) {
            return Err(CryptoError::DegenerateSharedSecret);
        }
        Ok(SharedSecret(*shared.as_bytes()))
    }
}

/// Wraps a 32-byte X25519 shared secret, zeroed on drop.
#[derive(ZeroizeOnDrop)]
pub struct SharedSecret([u8; 32]);

impl SharedSecret {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

/// Parses a raw 32-byte public key as received on the wire.
pub fn public_key_from_bytes(bytes: [u8; 32]) -> PublicKey {
    PublicKey::from(bytes)
}

/// A 32-byte pre-shared key loaded from disk. Zeroed on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Psk(pub [u8; 32]);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ecdh_agrees_both_directions() {
        let a = KeyPair::generate();
        let b = KeyPair::generate();
        let shared_a = a.ecdh(b.public()).unwrap();
        let shared_b = b.ecdh(a.public()).unwrap();
        assert_eq!(shared_a.as_bytes(), shared_b.as_bytes());
    }
}
