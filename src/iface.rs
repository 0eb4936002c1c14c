//! Virtual network interface contract (§6 "Virtual interface contract").
//!
//! The core treats the tunnel interface as "one IP packet per read/write";
//! whether it's backed by a real TUN device is an implementation detail
//! behind this trait, the same way `Storage`/`TaskStorage` are traits with
//! a real and a test-double implementation elsewhere in this tree.

use crate::error::VeilResult;

/// Configuration needed to bring a virtual interface up.
#[derive(Debug, Clone)]
pub struct InterfaceConfig {
    pub name: String,
    pub mtu: u16,
    pub address: std::net::IpAddr,
    pub netmask_prefix: u8,
}

pub trait TunnelInterface: Send {
    /// Reads one IP packet into `buf`, non-blocking. Returns `Ok(0)` when no
    /// packet is available, `Ok(n)` for an `n`-byte packet.
    fn read_into(&mut self, buf: &mut [u8]) -> VeilResult<usize>;

    /// Writes one IP packet. Returns `Ok(true)` on success, `Ok(false)` if
    /// the interface could not accept it right now (transient).
    fn write(&mut self, buf: &[u8]) -> VeilResult<bool>;

    fn set_mtu(&mut self, mtu: u16) -> VeilResult<()>;

    fn open(&mut self, config: &InterfaceConfig) -> VeilResult<()>;

    fn close(&mut self) -> VeilResult<()>;

    fn is_open(&self) -> bool;
}

/// A `TunnelInterface` that discards writes and never has data to read.
/// Used by tests and by the orchestrator before the real interface is
/// wired in (§4.9: the interface must not exist before `Connected`).
#[derive(Default)]
pub struct NullInterface {
    open: bool,
    mtu: u16,
    pub written: Vec<Vec<u8>>,
}

impl TunnelInterface for NullInterface {
    fn read_into(&mut self, _buf: &mut [u8]) -> VeilResult<usize> {
        Ok(0)
    }

    fn write(&mut self, buf: &[u8]) -> VeilResult<bool> {
        self.written.push(buf.to_vec());
        Ok(true)
    }

    fn set_mtu(&mut self, mtu: u16) -> VeilResult<()> {
        self.mtu = mtu;
        Ok(())
    }

    fn open(&mut self, config: &InterfaceConfig) -> VeilResult<()> {
        self.mtu = config.mtu;
        self.open = true;
        Ok(())
    }

    fn close(&mut self) -> VeilResult<()> {
        self.open = false;
        Ok(())
    }

    fn is_open(&self) -> bool {
        self.open
    }
}
