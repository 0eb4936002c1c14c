//! A2/C10: config layering (CLI overrides a TOML default) and the
//! orchestrator's loopback target resolution and interface lifecycle.

use veil::config::{default_data_dir, CliOverrides, TunnelConfig};
use veil::error::VeilError;
use veil::iface::{InterfaceConfig, NullInterface};
use veil::orchestrator::{PeerTarget, ReconnectPolicy, StateListener, TunnelOrchestrator, TunnelState};

struct RecordingListener {
    transitions: Vec<(TunnelState, TunnelState)>,
}

impl StateListener for RecordingListener {
    fn on_state_changed(&mut self, from: TunnelState, to: TunnelState) {
        self.transitions.push((from, to));
    }
}

#[test]
fn cli_server_override_wins_over_toml() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(
        dir.path().join("veild.toml"),
        "server = \"toml-peer.example:1\"\nkey = \"/tmp/key\"\nseed = \"/tmp/seed\"\n",
    )
    .unwrap();

    let cli = CliOverrides {
        server: Some("cli-peer.example:51820".to_string()),
        ..Default::default()
    };
    let config = TunnelConfig::new(&cli, dir.path()).unwrap();
    assert_eq!(config.server, "cli-peer.example:51820");
    assert_eq!(config.key_path, std::path::PathBuf::from("/tmp/key"));
}

#[test]
fn default_data_dir_is_non_empty() {
    assert!(!default_data_dir().as_os_str().is_empty());
}

#[test]
fn missing_key_path_is_config_fatal_with_remediation() {
    let dir = tempfile::tempdir().unwrap();
    let cli = CliOverrides {
        server: Some("peer.example:51820".to_string()),
        ..Default::default()
    };
    let err = TunnelConfig::new(&cli, dir.path()).unwrap_err();
    match err {
        VeilError::ConfigFatal(msg) => assert!(msg.contains("--key"), "remediation should mention --key: {msg}"),
        other => panic!("expected ConfigFatal, got {other:?}"),
    }
}

#[tokio::test]
async fn orchestrator_resolves_loopback_target() {
    let mut orch = TunnelOrchestrator::new(
        veil::crypto::Psk([0u8; 32]),
        [1u8; 32],
        PeerTarget { host: "127.0.0.1".to_string(), port: 51820 },
        ReconnectPolicy::default(),
        Box::new(NullInterface::default()),
        InterfaceConfig {
            name: "veil0".into(),
            mtu: 1400,
            address: "10.8.0.2".parse().unwrap(),
            netmask_prefix: 24,
        },
    );

    let addr = orch.resolve_target().await.unwrap();
    assert_eq!(addr.ip().to_string(), "127.0.0.1");
    assert_eq!(addr.port(), 51820);

    let mut listener = RecordingListener { transitions: Vec::new() };
    orch.begin_connect(&mut listener);
    orch.begin_handshake(&mut listener);
    orch.handshake_succeeded(&mut listener).unwrap();
    assert_eq!(orch.state(), TunnelState::Connected);
    assert_eq!(
        listener.transitions,
        vec![
            (TunnelState::Disconnected, TunnelState::Connecting),
            (TunnelState::Connecting, TunnelState::Handshaking),
            (TunnelState::Handshaking, TunnelState::Connected),
        ]
    );
}
