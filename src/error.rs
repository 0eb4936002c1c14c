//! Error taxonomy (§7).
//!
//! Library code returns typed errors from this module; `anyhow` is reserved
//! for the CLI/orchestrator boundary in `main.rs`. `ProtocolDrop` never
//! propagates as an `Err` out of the session/event-loop layer — callers fold
//! it into `Ok(None)` plus a counter increment, per the recovery-vs-surfacing
//! rule in §7.

use thiserror::Error;

/// Crypto primitive failures (C1). All of these indicate either malformed
/// input or a cryptographic policy violation — never a transient condition.
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("ECDH produced a degenerate (identity) shared secret")]
    DegenerateSharedSecret,
    #[error("HKDF expand length {0} exceeds 255*32 bytes")]
    ExpandLengthTooLarge(usize),
    #[error("AEAD authentication failed")]
    AeadOpenFailed,
    #[error("buffer too small to hold output")]
    BufferTooSmall,
}

/// Frame codec failures (C2). A decode failure never partially consumes the
/// input buffer.
#[derive(Debug, Error)]
pub enum FrameError {
    #[error("unknown frame kind byte {0}")]
    UnknownKind(u8),
    #[error("buffer too short for frame header")]
    Truncated,
    #[error("declared payload length does not match remaining buffer")]
    LengthMismatch,
    #[error("payload exceeds maximum frame size of 65535 bytes")]
    PayloadTooLarge,
}

/// §7 error kinds. `ProtocolDrop` and `Transient` are handled locally with
/// counters and should rarely be constructed as an `Err` that crosses a
/// public API boundary; `HandshakeReject`, `SessionFatal`, `ConfigFatal`, and
/// `Bug` are the ones the orchestrator's error callback actually sees.
#[derive(Debug, Error)]
pub enum VeilError {
    #[error("transient: {0}")]
    Transient(String),

    #[error("protocol drop: {0}")]
    ProtocolDrop(String),

    #[error("handshake rejected: {0}")]
    HandshakeReject(String),

    #[error("session fatal: {0}")]
    SessionFatal(String),

    #[error("configuration error: {0}")]
    ConfigFatal(String),

    #[error("internal invariant violated: {0}")]
    Bug(String),

    #[error(transparent)]
    Crypto(#[from] CryptoError),

    #[error(transparent)]
    Frame(#[from] FrameError),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl VeilError {
    /// §7's `ConfigFatal` policy: the message must name the remediation.
    pub fn config_fatal(problem: impl Into<String>, remediation: impl AsRef<str>) -> Self {
        VeilError::ConfigFatal(format!("{}; {}", problem.into(), remediation.as_ref()))
    }
}

/// Result alias for fallible operations that may raise any of the §7 kinds.
pub type VeilResult<T> = Result<T, VeilError>;
