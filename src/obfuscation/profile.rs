//! Deterministic-per-session obfuscation profile (C3, §4.3).
//!
//! Every decision here is a pure function of `(seed, sequence, context_tag)`,
//! computed via HMAC-SHA256 and taking the high 8 bytes of the output as a
//! `u64`. No teacher analog exists for this; it generalizes the
//! HKDF-over-HMAC construction in `relay/crypto.rs` into direct HMAC sampling
//! keyed by a per-session seed rather than a per-connection shared secret.

use serde::{Deserialize, Serialize};

use crate::crypto::hmac_sha256;

/// Size-class weights and bounds for padding (§4.3 "Padding size class").
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct PaddingClass {
    pub weight: u32,
    pub min: usize,
    pub max: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JitterDistribution {
    Uniform,
    Poisson,
    Exponential,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum HeartbeatTimingModel {
    Uniform { min_ms: u64, max_ms: u64 },
    Exponential {
        mean_ms: u64,
        max_gap_ms: u64,
        p_long_gap: f64,
    },
    Burst {
        burst_interval_ms: u64,
        burst_min: u32,
        burst_max: u32,
        silence_min_ms: u64,
        silence_max_ms: u64,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PayloadMimicKind {
    Empty,
    Timestamp,
    IotSensor,
    GenericTelemetry,
    RandomSize,
    MimicDns,
    MimicStun,
    MimicRtp,
}

/// Tunable configuration for an [`ObfuscationProfile`]; everything here is
/// non-secret (bounds/weights), unlike the 32-byte seed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObfuscationConfig {
    pub padding_small: PaddingClass,
    pub padding_medium: PaddingClass,
    pub padding_large: PaddingClass,
    pub padding_jitter: usize,
    pub min_prefix: usize,
    pub max_prefix: usize,
    pub jitter_distribution: JitterDistribution,
    pub max_timing_jitter_ms: u64,
    pub heartbeat_timing: HeartbeatTimingModel,
    pub payload_mimic: PayloadMimicKind,
    pub entropy_normalization: bool,
}

impl Default for ObfuscationConfig {
    fn default() -> Self {
        ObfuscationConfig {
            padding_small: PaddingClass { weight: 5, min: 0, max: 16 },
            padding_medium: PaddingClass { weight: 3, min: 16, max: 64 },
            padding_large: PaddingClass { weight: 1, min: 64, max: 256 },
            padding_jitter: 8,
            min_prefix: 4,
            max_prefix: 12,
            jitter_distribution: JitterDistribution::Uniform,
            max_timing_jitter_ms: 50,
            heartbeat_timing: HeartbeatTimingModel::Uniform { min_ms: 15_000, max_ms: 30_000 },
            payload_mimic: PayloadMimicKind::GenericTelemetry,
            entropy_normalization: true,
        }
    }
}

/// A per-session obfuscation profile: a 32-byte seed plus the tunables above.
/// `obf_key` is derived once from the seed and used by `sequence_prf`.
#[derive(Clone)]
pub struct ObfuscationProfile {
    pub seed: [u8; 32],
    pub obf_key: [u8; 32],
    pub config: ObfuscationConfig,
}

fn derive_u64(seed: &[u8; 32], seq: u64, tag: &[u8]) -> u64 {
    let mut data = Vec::with_capacity(8 + tag.len());
    data.extend_from_slice(&seq.to_be_bytes());
    data.extend_from_slice(tag);
    let digest = hmac_sha256(seed, &data);
    u64::from_be_bytes(digest[0..8].try_into().unwrap())
}

/// Normalizes a derived u64 into `[0, 1)`.
fn to_unit_interval(v: u64) -> f64 {
    (v as f64) / (u64::MAX as f64 + 1.0)
}

impl ObfuscationProfile {
    pub fn new(seed: [u8; 32], config: ObfuscationConfig) -> Self {
        let obf_key_bytes = crate::crypto::hkdf(&seed, b"veil-obf-key", b"veil-seq-obf", 32)
            .expect("32 bytes is within HKDF expand bounds");
        let mut obf_key = [0u8; 32];
        obf_key.copy_from_slice(&obf_key_bytes);
        ObfuscationProfile { seed, obf_key, config }
    }

    pub(crate) fn derive(&self, seq: u64, tag: &[u8]) -> u64 {
        derive_u64(&self.seed, seq, tag)
    }

    /// Padding size class roll, then uniform selection within the class,
    /// optionally jittered within class bounds.
    pub fn padding_len(&self, seq: u64) -> usize {
        let classes = [
            &self.config.padding_small,
            &self.config.padding_medium,
            &self.config.padding_large,
        ];
        let total_weight: u32 = classes.iter().map(|c| c.weight).sum();
        let roll = (self.derive(seq, b"padclass") % total_weight as u64) as u32;

        let mut acc = 0;
        let class = classes
            .iter()
            .find(|c| {
                acc += c.weight;
                roll < acc
            })
            .unwrap_or(&classes[0]);

        let span = (class.max - class.min).max(1) as u64;
        let base = class.min + (self.derive(seq, b"padding") % span) as usize;

        if self.config.padding_jitter == 0 {
            return base.clamp(class.min, class.max);
        }
        let jitter_roll = self.derive(seq, b"advpad");
        let jitter = (jitter_roll % (2 * self.config.padding_jitter as u64 + 1)) as i64
            - self.config.padding_jitter as i64;
        (base as i64 + jitter).clamp(class.min as i64, class.max as i64) as usize
    }

    /// Uniform selection in `[min_prefix, max_prefix]`.
    pub fn prefix_len(&self, seq: u64) -> usize {
        let span = (self.config.max_prefix - self.config.min_prefix + 1) as u64;
        self.config.min_prefix + (self.derive(seq, b"prefix") % span) as usize
    }

    /// Deterministic pseudorandom prefix bytes for a given sequence.
    pub fn random_prefix(&self, seq: u64, len: usize) -> Vec<u8> {
        let mut out = Vec::with_capacity(len);
        let mut counter: u64 = 0;
        while out.len() < len {
            let v = self.derive(seq, &[b"prefix_bytes".as_slice(), &counter.to_be_bytes()].concat());
            out.extend_from_slice(&v.to_be_bytes());
            counter += 1;
        }
        out.truncate(len);
        out
    }

    /// Timing jitter in milliseconds, per the three distributions in §4.3.
    pub fn timing_jitter_ms(&self, seq: u64) -> u64 {
        let u = to_unit_interval(self.derive(seq, b"jitter"));
        let max = self.config.max_timing_jitter_ms as f64;
        let value = match self.config.jitter_distribution {
            JitterDistribution::Uniform => u * max,
            JitterDistribution::Poisson => -(1.0 - u).ln() * max / 2.0,
            JitterDistribution::Exponential => -(1.0 - u).ln() * max / 3.0,
        };
        (value.max(0.0).min(max)) as u64
    }

    /// Next heartbeat interval in milliseconds, per `heartbeat_timing`.
    pub fn heartbeat_interval_ms(&self, seq: u64) -> u64 {
        match self.config.heartbeat_timing {
            HeartbeatTimingModel::Uniform { min_ms, max_ms } => {
                let span = (max_ms - min_ms).max(1);
                min_ms + self.derive(seq, b"heartbeat") % span
            }
            HeartbeatTimingModel::Exponential { mean_ms, max_gap_ms, p_long_gap } => {
                let u = to_unit_interval(self.derive(seq, b"hb_exp"));
                let p = to_unit_interval(self.derive(seq, b"hb_gap"));
                if p < p_long_gap {
                    let span = max_gap_ms.saturating_sub(mean_ms).max(1);
                    mean_ms + self.derive(seq, b"hb_gap") % span
                } else {
                    let v = -(1.0 - u).ln() * mean_ms as f64;
                    (v.max(1000.0).min(3.0 * mean_ms as f64)) as u64
                }
            }
            HeartbeatTimingModel::Burst { burst_interval_ms, burst_min, burst_max, silence_min_ms, silence_max_ms } => {
                let burst_n = burst_min
                    + (self.derive(seq, b"hb_burst_sz") % (burst_max - burst_min + 1) as u64) as u32;
                // Every burst_n-th heartbeat is followed by a silence gap;
                // the rest use the fixed burst interval.
                if seq % burst_n as u64 == 0 {
                    let span = (silence_max_ms - silence_min_ms).max(1);
                    silence_min_ms + self.derive(seq, b"hb_silence") % span
                } else {
                    burst_interval_ms
                }
            }
        }
    }

    /// Perturbs up to ~10% of `buf`'s bytes at HMAC-derived indices by XORing
    /// with HMAC-derived bytes, to smooth byte-frequency histograms on
    /// compressible padding.
    pub fn apply_entropy_normalization(&self, buf: &mut [u8], seq: u64) {
        if !self.config.entropy_normalization || buf.is_empty() {
            return;
        }
        let n_perturb = (buf.len() / 10).max(1);
        for i in 0..n_perturb {
            let idx_roll = self.derive(seq, &[b"entropy".as_slice(), &(i as u64).to_be_bytes()].concat());
            let idx = (idx_roll % buf.len() as u64) as usize;
            let byte_roll = self.derive(seq, &[b"entropy_b".as_slice(), &(i as u64).to_be_bytes()].concat());
            buf[idx] ^= (byte_roll & 0xFF) as u8;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefix_len_within_bounds() {
        let profile = ObfuscationProfile::new([1u8; 32], ObfuscationConfig::default());
        for seq in 0..200u64 {
            let len = profile.prefix_len(seq);
            assert!((4..=12).contains(&len));
        }
    }

    #[test]
    fn deterministic_given_same_seed() {
        let a = ObfuscationProfile::new([5u8; 32], ObfuscationConfig::default());
        let b = ObfuscationProfile::new([5u8; 32], ObfuscationConfig::default());
        assert_eq!(a.prefix_len(10), b.prefix_len(10));
        assert_eq!(a.padding_len(10), b.padding_len(10));
        assert_eq!(a.random_prefix(10, 8), b.random_prefix(10, 8));
    }

    #[test]
    fn jitter_capped_at_max() {
        let mut cfg = ObfuscationConfig::default();
        cfg.jitter_distribution = JitterDistribution::Exponential;
        cfg.max_timing_jitter_ms = 20;
        let profile = ObfuscationProfile::new([2u8; 32], cfg);
        for seq in 0..500u64 {
            assert!(profile.timing_jitter_ms(seq) <= 20);
        }
    }
}
