//! Handshake state machine (§4.4 "State machine").

/// `Idle → InitSent → Established` (initiator) /
/// `Idle → InitReceived → Established` (responder).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandshakeState {
    Idle,
    InitSent,
    InitReceived,
    Established,
}

impl HandshakeState {
    /// Any decrypt failure before `Established` returns the peer to `Idle`.
    pub fn on_pre_established_failure(&self) -> HandshakeState {
        debug_assert_ne!(*self, HandshakeState::Established);
        HandshakeState::Idle
    }
}
