//! UDP datagram assembly/parsing (§6, Open Question #1).
//!
//! Wire layout, fixed by `SPEC_FULL.md` §4's resolution of the prefix-length
//! recovery question:
//!
//! ```text
//! obf_sequence (8 B, big-endian, PRP of the real sequence)
//! prefix       (prefix_len random bytes, prefix_len derived from seq)
//! ciphertext   (AEAD output: frame_bytes || 16-byte tag)
//! ```
//!
//! The obfuscated sequence sits at a fixed offset so the receiver can recover
//! `seq` (and hence `prefix_len`) before it knows anything else about the
//! datagram.

use crate::crypto::sequence_prf;
use crate::obfuscation::profile::ObfuscationProfile;

const OBF_SEQ_LEN: usize = 8;

/// Assembles a datagram from an already-sealed ciphertext.
pub fn build_datagram(profile: &ObfuscationProfile, seq: u64, ciphertext: &[u8]) -> Vec<u8> {
    let obf_seq = sequence_prf(&profile.obf_key, seq);
    let prefix_len = profile.prefix_len(seq);
    let prefix = profile.random_prefix(seq, prefix_len);

    let mut out = Vec::with_capacity(OBF_SEQ_LEN + prefix_len + ciphertext.len());
    out.extend_from_slice(&obf_seq.to_be_bytes());
    out.extend_from_slice(&prefix);
    out.extend_from_slice(ciphertext);
    out
}

/// Parsed datagram header: the recovered real sequence number and a view
/// into the remaining ciphertext.
pub struct ParsedDatagram<'a> {
    pub seq: u64,
    pub ciphertext: &'a [u8],
}

/// Parses the fixed obf-seq field, deobfuscates it, derives the expected
/// prefix length for that sequence, and slices off prefix + ciphertext.
/// Returns `None` if the datagram is shorter than the minimum possible
/// framing (obf-seq field plus the minimum prefix length).
pub fn parse_datagram<'a>(
    profile: &ObfuscationProfile,
    buf: &'a [u8],
) -> Option<ParsedDatagram<'a>> {
    if buf.len() < OBF_SEQ_LEN {
        return None;
    }
    let obf_seq = u64::from_be_bytes(buf[..OBF_SEQ_LEN].try_into().unwrap());
    let seq = sequence_prf(&profile.obf_key, obf_seq);
    let prefix_len = profile.prefix_len(seq);

    let body = &buf[OBF_SEQ_LEN..];
    if body.len() < prefix_len {
        return None;
    }
    Some(ParsedDatagram {
        seq,
        ciphertext: &body[prefix_len..],
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::obfuscation::profile::ObfuscationConfig;

    #[test]
    fn build_then_parse_recovers_seq_and_ciphertext() {
        let profile = ObfuscationProfile::new([3u8; 32], ObfuscationConfig::default());
        let ct = b"some ciphertext bytes + tag".to_vec();
        let datagram = build_datagram(&profile, 77, &ct);
        let parsed = parse_datagram(&profile, &datagram).unwrap();
        assert_eq!(parsed.seq, 77);
        assert_eq!(parsed.ciphertext, &ct[..]);
    }
}
