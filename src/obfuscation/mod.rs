//! Obfuscation profile (C3): deterministic per-session padding, prefix,
//! timing jitter, and heartbeat shaping.

pub mod payloads;
pub mod profile;

pub use profile::{
    HeartbeatTimingModel, JitterDistribution, ObfuscationConfig, ObfuscationProfile,
    PaddingClass, PayloadMimicKind,
};
