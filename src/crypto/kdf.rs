//! HKDF-SHA256 extract/expand (RFC 5869) and session-key derivation (C1).
//!
//! Grounded on `relay/crypto.rs::derive_cipher`'s HKDF-over-HMAC construction,
//! generalized here to expose extract and expand separately (the handshake
//! needs the PRK itself, not just a derived cipher key).

use hkdf::Hkdf;
use hmac::{Hmac, Mac};
use sha2::Sha256;
use zeroize::Zeroize;

use crate::error::CryptoError;

const MAX_EXPAND_LEN: usize = 255 * 32;

/// `HKDF-Extract(salt, ikm) -> PRK`. An empty salt is treated as 32 zero
/// bytes, matching RFC 5869 and making `hkdf_extract([], ikm)` equal to
/// `hkdf_extract([0u8; 32], ikm)`.
pub fn hkdf_extract(salt: &[u8], ikm: &[u8]) -> [u8; 32] {
    let zero_salt = [0u8; 32];
    let salt = if salt.is_empty() { &zero_salt[..] } else { salt };
    let (prk, _) = Hkdf::<Sha256>::extract(Some(salt), ikm);
    prk.into()
}

/// `HKDF-Expand(prk, info, len) -> OKM`. `len` must be at most `255*32`.
pub fn hkdf_expand(prk: &[u8; 32], info: &[u8], len: usize) -> Result<Vec<u8>, CryptoError> {
    if len > MAX_EXPAND_LEN {
        return Err(CryptoError::ExpandLengthTooLarge(len));
    }
    let hk = Hkdf::<Sha256>::from_prk(prk).map_err(|_| CryptoError::ExpandLengthTooLarge(len))?;
    let mut okm = vec![0u8; len];
    hk.expand(info, &mut okm)
        .map_err(|_| CryptoError::ExpandLengthTooLarge(len))?;
    Ok(okm)
}

/// One-shot HKDF: `extract` then `expand`, used where the PRK itself is not
/// needed separately (e.g. deriving a single-purpose symmetric key).
pub fn hkdf(salt: &[u8], ikm: &[u8], info: &[u8], len: usize) -> Result<Vec<u8>, CryptoError> {
    let prk = hkdf_extract(salt, ikm);
    let out = hkdf_expand(&prk, info, len);
    let mut prk = prk;
    prk.zeroize();
    out
}

type HmacSha256 = Hmac<Sha256>;

/// Raw HMAC-SHA256, used directly by the obfuscation layer's per-tag sampling
/// (§4.3) and the sequence-obfuscation PRF (§4.1), both of which need a tagged
/// pseudorandom value rather than a KDF chain.
pub fn hmac_sha256(key: &[u8], data: &[u8]) -> [u8; 32] {
    let mut mac = HmacSha256::new_from_slice(key).expect("HMAC accepts any key length");
    mac.update(data);
    mac.finalize().into_bytes().into()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_salt_equals_zero_salt() {
        let ikm = b"some input key material";
        let a = hkdf_extract(&[], ikm);
        let b = hkdf_extract(&[0u8; 32], ikm);
        assert_eq!(a, b);
    }

    #[test]
    fn expand_rejects_oversized_length() {
        let prk = [1u8; 32];
        assert!(hkdf_expand(&prk, b"info", 255 * 32 + 1).is_err());
    }
}
