//! §8 "Obfuscated sequence determinism": two `ObfuscationProfile`s built from
//! the same seed must agree bit-for-bit on every per-sequence decision, and
//! a profile must not repeat the same padding length/prefix so often that it
//! looks like a fixed-size protocol.

use std::collections::HashMap;

use veil::obfuscation::{ObfuscationConfig, ObfuscationProfile};

fn profile(seed: u8) -> ObfuscationProfile {
    ObfuscationProfile::new([seed; 32], ObfuscationConfig::default())
}

#[test]
fn same_seed_yields_identical_derivations_across_instances() {
    let a = profile(0x5A);
    let b = profile(0x5A);

    for seq in [0u64, 1, 2, 1000, u32::MAX as u64] {
        assert_eq!(a.padding_len(seq), b.padding_len(seq));
        assert_eq!(a.prefix_len(seq), b.prefix_len(seq));
        assert_eq!(a.random_prefix(seq, 12), b.random_prefix(seq, 12));
        assert_eq!(a.timing_jitter_ms(seq), b.timing_jitter_ms(seq));
        assert_eq!(a.heartbeat_interval_ms(seq), b.heartbeat_interval_ms(seq));
    }
}

#[test]
fn different_seeds_diverge() {
    let a = profile(0x01);
    let b = profile(0x02);

    let mismatches = (0u64..64)
        .filter(|&seq| a.padding_len(seq) != b.padding_len(seq) || a.prefix_len(seq) != b.prefix_len(seq))
        .count();
    assert!(mismatches > 0, "two distinct seeds should not derive identical values for every sequence");
}

/// A crude chi-square-style spread check: across many sequences, padding
/// length should fall across every configured size class, not collapse onto
/// one value — a real PRP-backed distribution should have meaningfully more
/// than a couple of distinct outcomes.
#[test]
fn padding_length_distribution_is_not_degenerate() {
    let p = profile(0xC0);
    let mut histogram: HashMap<usize, u32> = HashMap::new();
    for seq in 0u64..5000 {
        *histogram.entry(p.padding_len(seq)).or_insert(0) += 1;
    }

    assert!(histogram.len() > 20, "padding_len should take on many distinct values, saw {}", histogram.len());
    let max_bucket = *histogram.values().max().unwrap();
    assert!(
        (max_bucket as f64) < 5000.0 * 0.2,
        "no single padding length should dominate more than ~20% of samples"
    );
}

#[test]
fn prefix_length_stays_within_configured_bounds() {
    let config = ObfuscationConfig::default();
    let p = ObfuscationProfile::new([0xAB; 32], config.clone());
    for seq in 0u64..2000 {
        let len = p.prefix_len(seq);
        assert!(len >= config.min_prefix && len <= config.max_prefix);
    }
}
