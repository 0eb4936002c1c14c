//! Tunnel orchestrator (C10): the top-level state machine tying together
//! the handshake, session, event loop/pipeline, and virtual interface.
//!
//! Grounded on `retry.rs`'s `RetryConfig`/backoff-loop shape for the
//! reconnect policy and `connectivity/monitor.rs`'s `ConnectionMode`
//! enum + change-listener pattern for the state machine itself.

use std::net::SocketAddr;
use std::time::Duration;

use tracing::{info, warn};

use crate::crypto::Psk;
use crate::iface::{InterfaceConfig, TunnelInterface};

/// `Disconnected -> Connecting -> Handshaking -> Connected ->
/// (Reconnecting -> Connecting ...) -> Disconnected`. All transitions are
/// total: every state has a defined response to every external event this
/// type dispatches.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TunnelState {
    Disconnected,
    Connecting,
    Handshaking,
    Connected,
    Reconnecting,
}

impl std::fmt::Display for TunnelState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            TunnelState::Disconnected => "disconnected",
            TunnelState::Connecting => "connecting",
            TunnelState::Handshaking => "handshaking",
            TunnelState::Connected => "connected",
            TunnelState::Reconnecting => "reconnecting",
        };
        write!(f, "{s}")
    }
}

pub trait StateListener: Send {
    fn on_state_changed(&mut self, from: TunnelState, to: TunnelState);
}

/// Bounded exponential backoff for reconnect attempts (§4.9).
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    pub max_attempts: u32, // 0 = infinite
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        ReconnectPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(60),
            max_attempts: 0,
        }
    }
}

impl ReconnectPolicy {
    /// Delay before the `attempt`-th reconnect (1-indexed), doubling each
    /// time and capped at `max_delay`.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let scaled = self.initial_delay.saturating_mul(1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX));
        scaled.min(self.max_delay)
    }

    pub fn attempts_exhausted(&self, attempt: u32) -> bool {
        self.max_attempts != 0 && attempt >= self.max_attempts
    }
}

pub struct PeerTarget {
    pub host: String,
    pub port: u16,
}

/// Drives the tunnel through its lifecycle. Holds the virtual interface
/// (created only on entry to `Connected`, destroyed only on `Disconnected`,
/// per §4.9's explicit anti-chicken-and-egg contract) and the reconnect
/// counters.
pub struct TunnelOrchestrator {
    state: TunnelState,
    psk: Psk,
    obfuscation_seed: [u8; 32],
    target: PeerTarget,
    reconnect_policy: ReconnectPolicy,
    reconnect_attempt: u32,
    interface: Box<dyn TunnelInterface>,
    interface_config: InterfaceConfig,
}

impl TunnelOrchestrator {
    pub fn new(
        psk: Psk,
        obfuscation_seed: [u8; 32],
        target: PeerTarget,
        reconnect_policy: ReconnectPolicy,
        interface: Box<dyn TunnelInterface>,
        interface_config: InterfaceConfig,
    ) -> Self {
        TunnelOrchestrator {
            state: TunnelState::Disconnected,
            psk,
            obfuscation_seed,
            target,
            reconnect_policy,
            reconnect_attempt: 0,
            interface,
            interface_config,
        }
    }

    pub fn state(&self) -> TunnelState {
        self.state
    }

    pub fn psk(&self) -> &Psk {
        &self.psk
    }

    pub fn obfuscation_seed(&self) -> &[u8; 32] {
        &self.obfuscation_seed
    }

    fn transition(&mut self, to: TunnelState, listener: &mut dyn StateListener) {
        let from = self.state;
        self.state = to;
        info!(%from, %to, "tunnel state transition");
        listener.on_state_changed(from, to);
    }

    pub fn begin_connect(&mut self, listener: &mut dyn StateListener) {
        debug_assert!(matches!(self.state, TunnelState::Disconnected | TunnelState::Reconnecting));
        self.transition(TunnelState::Connecting, listener);
    }

    pub fn begin_handshake(&mut self, listener: &mut dyn StateListener) {
        debug_assert_eq!(self.state, TunnelState::Connecting);
        self.transition(TunnelState::Handshaking, listener);
    }

    /// Entry to `Connected` is the only place the virtual interface is
    /// created — never earlier, so the OS routing table cannot capture the
    /// handshake datagrams themselves (§4.9).
    pub fn handshake_succeeded(&mut self, listener: &mut dyn StateListener) -> crate::error::VeilResult<()> {
        debug_assert_eq!(self.state, TunnelState::Handshaking);
        self.interface.open(&self.interface_config)?;
        self.reconnect_attempt = 0;
        self.transition(TunnelState::Connected, listener);
        Ok(())
    }

    /// A regression from `Connected` (or a failed `Handshaking`) back to
    /// `Reconnecting`. The interface, if up, is left alone: only a final
    /// `Disconnected` tears it down.
    pub fn connection_lost(&mut self, listener: &mut dyn StateListener) {
        self.transition(TunnelState::Reconnecting, listener);
    }

    /// Computes the backoff delay for the next reconnect attempt and
    /// advances the attempt counter. `Err` means attempts are exhausted and
    /// the caller should move to `Disconnected`.
    pub fn next_reconnect_delay(&mut self) -> Result<Duration, ()> {
        self.reconnect_attempt += 1;
        if self.reconnect_policy.attempts_exhausted(self.reconnect_attempt) {
            return Err(());
        }
        Ok(self.reconnect_policy.delay_for_attempt(self.reconnect_attempt))
    }

    pub fn disconnect(&mut self, listener: &mut dyn StateListener) {
        if self.interface.is_open() {
            if let Err(e) = self.interface.close() {
                warn!(error = %e, "failed to close virtual interface cleanly");
            }
        }
        self.transition(TunnelState::Disconnected, listener);
    }

    /// Re-resolves the peer address. Called once per reconnect attempt per
    /// §4.9 ("if the peer's address has changed ... a fresh DNS lookup is
    /// performed per attempt").
    pub async fn resolve_target(&self) -> crate::error::VeilResult<SocketAddr> {
        let addrs = tokio::net::lookup_host((self.target.host.as_str(), self.target.port))
            .await
            .map_err(|e| crate::error::VeilError::Transient(e.to_string()))?;
        addrs
            .into_iter()
            .next()
            .ok_or_else(|| crate::error::VeilError::Transient(format!("no addresses for {}", self.target.host)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iface::NullInterface;

    struct NoopListener;
    impl StateListener for NoopListener {
        fn on_state_changed(&mut self, _from: TunnelState, _to: TunnelState) {}
    }

    fn make_orchestrator() -> TunnelOrchestrator {
        TunnelOrchestrator::new(
            Psk([0u8; 32]),
            [1u8; 32],
            PeerTarget { host: "127.0.0.1".into(), port: 51820 },
            ReconnectPolicy::default(),
            Box::new(NullInterface::default()),
            InterfaceConfig {
                name: "veil0".into(),
                mtu: 1400,
                address: "10.8.0.2".parse().unwrap(),
                netmask_prefix: 24,
            },
        )
    }

    #[test]
    fn interface_opens_only_on_connected() {
        let mut orch = make_orchestrator();
        let mut listener = NoopListener;
        orch.begin_connect(&mut listener);
        orch.begin_handshake(&mut listener);
        orch.handshake_succeeded(&mut listener).unwrap();
        assert_eq!(orch.state(), TunnelState::Connected);
    }

    #[test]
    fn reconnect_delay_doubles_and_caps() {
        let policy = ReconnectPolicy {
            initial_delay: Duration::from_secs(1),
            max_delay: Duration::from_secs(4),
            max_attempts: 0,
        };
        assert_eq!(policy.delay_for_attempt(1), Duration::from_secs(1));
        assert_eq!(policy.delay_for_attempt(2), Duration::from_secs(2));
        assert_eq!(policy.delay_for_attempt(3), Duration::from_secs(4));
        assert_eq!(policy.delay_for_attempt(10), Duration::from_secs(4));
    }

    #[test]
    fn connection_lost_keeps_interface_until_disconnect() {
        let mut orch = make_orchestrator();
        let mut listener = NoopListener;
        orch.begin_connect(&mut listener);
        orch.begin_handshake(&mut listener);
        orch.handshake_succeeded(&mut listener).unwrap();
        orch.connection_lost(&mut listener);
        assert_eq!(orch.state(), TunnelState::Reconnecting);
        assert!(orch.interface.is_open());
        orch.disconnect(&mut listener);
        assert!(!orch.interface.is_open());
    }
}
