use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use tracing::{info, warn};

use veil::config::{default_data_dir, CliOverrides, TunnelConfig};
use veil::error::VeilError;
use veil::eventloop::{EventHandler, EventLoop};
use veil::handshake::{build_init, process_response};
use veil::iface::{InterfaceConfig, NullInterface, TunnelInterface};
use veil::obfuscation::{ObfuscationConfig, ObfuscationProfile};
use veil::orchestrator::{PeerTarget, ReconnectPolicy, StateListener, TunnelOrchestrator, TunnelState};
use veil::pipeline::Pipeline;
use veil::session::Session;

#[derive(Parser)]
#[command(name = "veild", about = "Veil — obfuscated, authenticated UDP VPN tunnel daemon", version)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to the TOML config file (default: {data_dir}/veild.toml).
    #[arg(long, env = "VEIL_CONFIG")]
    config: Option<std::path::PathBuf>,

    /// Path to the 32-byte pre-shared key file.
    #[arg(long, env = "VEIL_KEY")]
    key: Option<std::path::PathBuf>,

    /// Path to the 32-byte obfuscation seed file.
    #[arg(long, env = "VEIL_SEED")]
    seed: Option<std::path::PathBuf>,

    /// Peer address to connect to, as `host:port`.
    #[arg(long, env = "VEIL_SERVER")]
    server: Option<String>,

    /// Local UDP port to bind (0 = OS-assigned).
    #[arg(long, env = "VEIL_LOCAL_PORT")]
    local_port: Option<u16>,

    /// Enable debug-level logging. Equivalent to RUST_LOG=debug.
    #[arg(long, short = 'v', global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Command {
    /// Connect to the configured peer and run the tunnel (default).
    Serve,
    /// Platform service management.
    Service {
        #[command(subcommand)]
        action: ServiceAction,
    },
}

#[derive(Subcommand)]
enum ServiceAction {
    /// Install and start veild as a platform service.
    Install,
    /// Stop and remove the platform service.
    Uninstall,
    /// Show the service status.
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { "debug" } else { "info" };
    setup_logging(log_level);

    let cli = CliOverrides {
        config_path: args.config.clone(),
        key_path: args.key.clone(),
        seed_path: args.seed.clone(),
        server: args.server.clone(),
        local_port: args.local_port,
        verbose: args.verbose,
    };

    match args.command {
        Some(Command::Service { action }) => match action {
            ServiceAction::Install => service_install()?,
            ServiceAction::Uninstall => service_uninstall()?,
            ServiceAction::Status => service_status()?,
        },
        None | Some(Command::Serve) => {
            if let Err(e) = run_serve(cli).await {
                if let Some(veil_err) = e.downcast_ref::<VeilError>() {
                    if matches!(veil_err, VeilError::ConfigFatal(_)) {
                        eprintln!("error: {veil_err}");
                        std::process::exit(1);
                    }
                }
                return Err(e);
            }
        }
    }

    Ok(())
}

/// Initializes the tracing subscriber. Unlike the teacher's daemon, `veild`
/// has no log-to-file mode of its own (§6 leaves file rotation to the
/// service supervisor) — stdout plus `RUST_LOG`/`--verbose` is enough for a
/// foreground tunnel process.
fn setup_logging(log_level: &str) {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level)),
        )
        .compact()
        .init();
}

fn service_install() -> Result<()> {
    Err(VeilError::config_fatal(
        "platform service installation is not implemented on this platform",
        "run `veild serve` directly, or manage it with your OS's own service supervisor (systemd, launchd, ...)",
    )
    .into())
}

fn service_uninstall() -> Result<()> {
    Err(VeilError::config_fatal(
        "platform service removal is not implemented on this platform",
        "remove the unit/plist you configured manually",
    )
    .into())
}

fn service_status() -> Result<()> {
    println!("veild: platform service management is not implemented; run `veild serve` directly.");
    Ok(())
}

/// Handshakes with the configured peer, then drives the tunnel until the
/// process receives a shutdown signal or the reconnect policy is exhausted.
async fn run_serve(cli: CliOverrides) -> Result<()> {
    let data_dir = default_data_dir();
    let config = TunnelConfig::new(&cli, &data_dir)?;
    let psk = config.load_psk()?;
    let obfuscation_seed = config.load_obfuscation_seed()?;

    let (host, port) = split_host_port(&config.server)
        .with_context(|| format!("invalid --server value {:?}, expected host:port", config.server))?;

    let interface_config = InterfaceConfig {
        name: config.interface_name.clone(),
        mtu: config.mtu,
        address: config
            .interface_address
            .parse()
            .with_context(|| format!("invalid interface_address {:?}", config.interface_address))?,
        netmask_prefix: config.interface_netmask_prefix,
    };

    let reconnect_policy = ReconnectPolicy {
        initial_delay: std::time::Duration::from_secs(config.reconnect_delay_secs),
        max_delay: std::time::Duration::from_secs(config.reconnect_delay_secs.max(1) * 60),
        max_attempts: config.max_reconnect_attempts,
    };

    // No real TUN device in this tree yet (see DESIGN.md); NullInterface
    // keeps the orchestrator's lifecycle contract exercised end to end.
    let interface: Box<dyn TunnelInterface> = Box::new(NullInterface::default());

    let mut orchestrator = TunnelOrchestrator::new(
        psk.clone(),
        obfuscation_seed,
        PeerTarget { host, port },
        reconnect_policy,
        interface,
        interface_config,
    );

    let mut listener = LoggingListener;

    loop {
        orchestrator.begin_connect(&mut listener);
        let remote = match orchestrator.resolve_target().await {
            Ok(addr) => addr,
            Err(e) => {
                warn!(error = %e, "peer resolution failed");
                if !reconnect_and_wait(&mut orchestrator).await {
                    return Ok(());
                }
                continue;
            }
        };

        let socket = match tokio::net::UdpSocket::bind(("0.0.0.0", config.local_port)).await {
            Ok(s) => s,
            Err(e) => {
                warn!(error = %e, "failed to bind local UDP socket");
                if !reconnect_and_wait(&mut orchestrator).await {
                    return Ok(());
                }
                continue;
            }
        };

        orchestrator.begin_handshake(&mut listener);
        match perform_handshake(&socket, remote, orchestrator.psk()).await {
            Ok((session_id, session_keys, is_initiator)) => {
                info!(session_id, "handshake established");
                orchestrator.handshake_succeeded(&mut listener)?;

                let profile = ObfuscationProfile::new(*orchestrator.obfuscation_seed(), ObfuscationConfig::default());
                let session = Session::new(session_id, is_initiator, session_keys, profile);

                let shutdown = run_session(socket, remote, session, config.pipeline_mode).await;
                orchestrator.connection_lost(&mut listener);
                if shutdown {
                    orchestrator.disconnect(&mut listener);
                    return Ok(());
                }
            }
            Err(e) => {
                warn!(error = %e, "handshake failed");
                orchestrator.connection_lost(&mut listener);
            }
        }

        if !reconnect_and_wait(&mut orchestrator).await {
            orchestrator.disconnect(&mut listener);
            return Ok(());
        }
    }
}

/// Computes and sleeps out the next reconnect delay. Returns `false` once
/// the reconnect policy is exhausted, meaning the caller should give up.
async fn reconnect_and_wait(orchestrator: &mut TunnelOrchestrator) -> bool {
    match orchestrator.next_reconnect_delay() {
        Ok(delay) => {
            info!(?delay, "retrying after backoff");
            tokio::time::sleep(delay).await;
            true
        }
        Err(()) => {
            warn!("reconnect attempts exhausted, giving up");
            false
        }
    }
}

/// Sends INIT and waits for RESPONSE with a few retries, per §4.4's
/// initiator role. Returns the session id, derived keys, and `is_initiator`
/// (always `true` here — `veild` always initiates).
async fn perform_handshake(
    socket: &tokio::net::UdpSocket,
    remote: std::net::SocketAddr,
    psk: &veil::crypto::Psk,
) -> Result<(u64, veil::session::SessionKeys, bool)> {
    const RETRIES: u32 = 5;
    const TIMEOUT: std::time::Duration = std::time::Duration::from_secs(2);

    let (init_wire, pending) = build_init(psk);
    let mut buf = vec![0u8; 2048];

    for attempt in 0..RETRIES {
        socket
            .send_to(&init_wire, remote)
            .await
            .context("sending INIT datagram")?;

        match tokio::time::timeout(TIMEOUT, socket.recv_from(&mut buf)).await {
            Ok(Ok((len, from))) if from == remote => {
                match process_response(psk, &pending, &buf[..len]) {
                    Ok((accepted, keys)) => return Ok((accepted.session_id, keys, true)),
                    Err(e) => {
                        warn!(error = %e, attempt, "RESPONSE rejected, retrying");
                    }
                }
            }
            Ok(Ok(_)) => continue,
            Ok(Err(e)) => return Err(e).context("receiving RESPONSE datagram"),
            Err(_) => {
                warn!(attempt, "handshake timed out waiting for RESPONSE, retrying");
            }
        }
    }

    Err(VeilError::HandshakeReject("no valid RESPONSE after retries".into()).into())
}

/// Drives one established session via the event-loop or pipeline mode until
/// either a shutdown signal arrives (returns `true`) or the session itself
/// goes fatal (returns `false`, triggering a reconnect).
async fn run_session(
    socket: tokio::net::UdpSocket,
    remote: std::net::SocketAddr,
    session: Session,
    pipeline_mode: bool,
) -> bool {
    if pipeline_mode {
        run_session_pipeline(socket, remote, session).await
    } else {
        run_session_eventloop(socket, remote, session).await
    }
}

async fn run_session_eventloop(
    socket: tokio::net::UdpSocket,
    remote: std::net::SocketAddr,
    session: Session,
) -> bool {
    let event_loop = EventLoop::new(socket, remote);
    let stop_handle = event_loop.stop_handle();
    let mut handler = SessionHandler { session, stop_handle: stop_handle.clone() };

    tokio::select! {
        _ = event_loop.run(&mut handler) => false,
        _ = tokio::signal::ctrl_c() => {
            stop_handle.stop();
            true
        }
    }
}

async fn run_session_pipeline(
    socket: tokio::net::UdpSocket,
    remote: std::net::SocketAddr,
    session: Session,
) -> bool {
    let std_socket = match socket.into_std() {
        Ok(s) => s,
        Err(e) => {
            warn!(error = %e, "failed to convert tokio socket for pipeline mode");
            return false;
        }
    };
    let session = std::sync::Arc::new(std::sync::Mutex::new(session));
    let pipeline = Pipeline::spawn(std_socket, remote, session, veil::pipeline::DEFAULT_QUEUE_CAPACITY);

    tokio::signal::ctrl_c().await.ok();
    pipeline.stop();
    true
}

/// Dispatches decoded frames for the event-loop (single-thread) mode.
struct SessionHandler {
    session: Session,
    stop_handle: veil::eventloop::StopHandle,
}

impl EventHandler for SessionHandler {
    fn on_packet(&mut self, data: &[u8], _remote: std::net::SocketAddr) {
        match self.session.decrypt_inbound(data) {
            veil::session::InboundOutcome::Accepted(frame) => {
                tracing::trace!(?frame, "accepted inbound frame");
            }
            veil::session::InboundOutcome::Dropped => {}
            veil::session::InboundOutcome::Fatal => {
                warn!("session reported a fatal inbound error, tearing down");
                self.stop_handle.stop();
            }
        }
    }

    fn on_ack_timer(&mut self) {}

    fn on_retransmit_timer(&mut self) {
        let swept = self.session.retransmit_sweep(std::time::Instant::now());
        for (_seq, _datagram) in swept.to_resend {
            // Re-sending belongs to the send path in `EventLoop::send_packet`,
            // which this handler does not hold a reference to; retransmission
            // wiring is tracked as a follow-up alongside the real TUN device.
        }
    }

    fn on_idle_timer(&mut self) {
        self.session.expire_retired_keys();
    }

    fn on_error(&mut self, err: VeilError) {
        warn!(error = %err, "event loop error");
    }
}

struct LoggingListener;

impl StateListener for LoggingListener {
    fn on_state_changed(&mut self, from: TunnelState, to: TunnelState) {
        info!(%from, %to, "tunnel state changed");
    }
}

fn split_host_port(server: &str) -> Option<(String, u16)> {
    let (host, port) = server.rsplit_once(':')?;
    let port: u16 = port.parse().ok()?;
    Some((host.to_string(), port))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn splits_host_and_port() {
        assert_eq!(split_host_port("example.com:51820"), Some(("example.com".to_string(), 51820)));
        assert_eq!(split_host_port("10.0.0.1:1"), Some(("10.0.0.1".to_string(), 1)));
    }

    #[test]
    fn rejects_missing_port() {
        assert_eq!(split_host_port("example.com"), None);
    }
}
