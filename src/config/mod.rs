//! Configuration (A2): CLI/env/TOML layering, PSK and obfuscation-seed file
//! loading and validation.
//!
//! Grounded on `DaemonConfig::new`'s layering order and `default_data_dir`.
//! The `notify`-based hot-reload path (`ConfigWatcher`) has no counterpart
//! in `SPEC_FULL.md` and is dropped rather than carried along unused — see
//! `DESIGN.md`'s "Dropped teacher dependencies" section.

use std::path::{Path, PathBuf};

use serde::Deserialize;
use tracing::{error, warn};

use crate::crypto::Psk;
use crate::error::VeilError;

const DEFAULT_LOCAL_PORT: u16 = 0; // 0 = OS-assigned
const DEFAULT_MTU: u16 = 1400;
const DEFAULT_RECONNECT_DELAY_SECS: u64 = 1;
const DEFAULT_MAX_RECONNECT_ATTEMPTS: u32 = 0; // 0 = infinite
const DEFAULT_IDLE_TIMEOUT_SECS: u64 = 300;
const DEFAULT_INTERFACE_NAME: &str = "veil0";

/// `{data_dir}/veild.toml`. Priority: CLI / env  >  TOML  >  built-in default.
#[derive(Deserialize, Default)]
struct TomlConfig {
    server: Option<String>,
    local_port: Option<u16>,
    key: Option<PathBuf>,
    seed: Option<PathBuf>,
    log: Option<String>,
    mtu: Option<u16>,
    reconnect_delay_secs: Option<u64>,
    max_reconnect_attempts: Option<u32>,
    idle_timeout_secs: Option<u64>,
    pipeline_mode: Option<bool>,
    interface_name: Option<String>,
    interface_address: Option<String>,
    interface_netmask_prefix: Option<u8>,
}

fn load_toml(data_dir: &Path) -> Option<TomlConfig> {
    let path = data_dir.join("veild.toml");
    let contents = std::fs::read_to_string(&path).ok()?;
    match toml::from_str::<TomlConfig>(&contents) {
        Ok(cfg) => Some(cfg),
        Err(e) => {
            error!(path = %path.display(), err = %e, "failed to parse veild.toml — using defaults");
            None
        }
    }
}

/// CLI-provided overrides; every field mirrors a `clap` arg in `main.rs`.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub config_path: Option<PathBuf>,
    pub key_path: Option<PathBuf>,
    pub seed_path: Option<PathBuf>,
    pub server: Option<String>,
    pub local_port: Option<u16>,
    pub verbose: bool,
}

#[derive(Debug, Clone)]
pub struct TunnelConfig {
    pub server: String,
    pub local_port: u16,
    pub key_path: PathBuf,
    pub seed_path: PathBuf,
    pub log: String,
    pub mtu: u16,
    pub reconnect_delay_secs: u64,
    pub max_reconnect_attempts: u32,
    pub idle_timeout_secs: u64,
    pub pipeline_mode: bool,
    pub interface_name: String,
    pub interface_address: String,
    pub interface_netmask_prefix: u8,
}

impl TunnelConfig {
    /// Builds config from CLI overrides + optional TOML file found at
    /// `{data_dir}/veild.toml` (or `cli.config_path` if given directly).
    pub fn new(cli: &CliOverrides, data_dir: &Path) -> Result<Self, VeilError> {
        let toml_dir = cli
            .config_path
            .as_ref()
            .and_then(|p| p.parent())
            .unwrap_or(data_dir);
        let toml = load_toml(toml_dir).unwrap_or_default();

        let server = cli
            .server
            .clone()
            .or(toml.server)
            .ok_or_else(|| {
                VeilError::config_fatal(
                    "no peer server address configured",
                    "pass --server <addr:port> or set `server` in veild.toml",
                )
            })?;

        let local_port = cli.local_port.or(toml.local_port).unwrap_or(DEFAULT_LOCAL_PORT);
        let log = if cli.verbose {
            "debug".to_string()
        } else {
            toml.log.unwrap_or_else(|| "info".to_string())
        };

        let key_path = cli
            .key_path
            .clone()
            .or(toml.key)
            .ok_or_else(|| {
                VeilError::config_fatal(
                    "no PSK file configured",
                    "pass --key <path> or set `key` in veild.toml; generate one with: head -c 32 /dev/urandom > <path>",
                )
            })?;

        let seed_path = cli
            .seed_path
            .clone()
            .or(toml.seed)
            .ok_or_else(|| {
                VeilError::config_fatal(
                    "no obfuscation seed file configured",
                    "pass --seed <path> or set `seed` in veild.toml; generate one with: head -c 32 /dev/urandom > <path>",
                )
            })?;

        Ok(TunnelConfig {
            server,
            local_port,
            key_path,
            seed_path,
            log,
            mtu: toml.mtu.unwrap_or(DEFAULT_MTU),
            reconnect_delay_secs: toml.reconnect_delay_secs.unwrap_or(DEFAULT_RECONNECT_DELAY_SECS),
            max_reconnect_attempts: toml.max_reconnect_attempts.unwrap_or(DEFAULT_MAX_RECONNECT_ATTEMPTS),
            idle_timeout_secs: toml.idle_timeout_secs.unwrap_or(DEFAULT_IDLE_TIMEOUT_SECS),
            pipeline_mode: toml.pipeline_mode.unwrap_or(false),
            interface_name: toml.interface_name.unwrap_or_else(|| DEFAULT_INTERFACE_NAME.to_string()),
            interface_address: toml.interface_address.unwrap_or_else(|| "10.8.0.2".to_string()),
            interface_netmask_prefix: toml.interface_netmask_prefix.unwrap_or(24),
        })
    }

    pub fn load_psk(&self) -> Result<Psk, VeilError> {
        load_32_byte_secret(&self.key_path).map(Psk)
    }

    pub fn load_obfuscation_seed(&self) -> Result<[u8; 32], VeilError> {
        load_32_byte_secret(&self.seed_path)
    }
}

/// §6 "Persisted state layout": exactly 32 raw bytes, no textual framing.
/// A file longer than 32 bytes is truncated with a warning (the remainder is
/// most often a trailing newline from `echo`/editors); a file shorter than 32
/// bytes is `ConfigFatal`, since silently zero-padding a secret is a much more
/// dangerous failure mode than refusing to start.
fn load_32_byte_secret(path: &Path) -> Result<[u8; 32], VeilError> {
    let bytes = std::fs::read(path).map_err(|e| {
        VeilError::config_fatal(
            format!("could not read key file {}: {e}", path.display()),
            format!("create it with: head -c 32 /dev/urandom > {}", path.display()),
        )
    })?;

    if bytes.len() < 32 {
        return Err(VeilError::config_fatal(
            format!("key file {} is {} bytes, need exactly 32", path.display(), bytes.len()),
            format!("run: head -c 32 /dev/urandom > {}", path.display()),
        ));
    }
    if bytes.len() > 32 {
        warn!(
            path = %path.display(),
            len = bytes.len(),
            "key file is longer than 32 bytes — truncating"
        );
    }

    let mut out = [0u8; 32];
    out.copy_from_slice(&bytes[..32]);
    Ok(out)
}

pub fn default_data_dir() -> PathBuf {
    #[cfg(target_os = "macos")]
    {
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home)
                .join("Library")
                .join("Application Support")
                .join("veil");
        }
    }
    #[cfg(target_os = "linux")]
    {
        if let Ok(xdg) = std::env::var("XDG_DATA_HOME") {
            return PathBuf::from(xdg).join("veil");
        }
        if let Ok(home) = std::env::var("HOME") {
            return PathBuf::from(home).join(".local").join("share").join("veil");
        }
    }
    #[cfg(target_os = "windows")]
    {
        if let Ok(appdata) = std::env::var("APPDATA") {
            return PathBuf::from(appdata).join("veil");
        }
    }
    PathBuf::from(".veil")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_undersized_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, [0u8; 16]).unwrap();
        let err = load_32_byte_secret(&path).unwrap_err();
        assert!(matches!(err, VeilError::ConfigFatal(_)));
    }

    #[test]
    fn truncates_oversized_key_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("key");
        std::fs::write(&path, [7u8; 40]).unwrap();
        let secret = load_32_byte_secret(&path).unwrap();
        assert_eq!(secret, [7u8; 32]);
    }

    #[test]
    fn missing_server_is_config_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let cli = CliOverrides::default();
        let err = TunnelConfig::new(&cli, dir.path()).unwrap_err();
        assert!(matches!(err, VeilError::ConfigFatal(_)));
    }
}
