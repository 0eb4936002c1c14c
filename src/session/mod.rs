//! Session state (C5): per-direction keys, sequence counters, retransmit
//! buffer, replay window, ACK bitmap, rekey, PMTU.

pub mod ack;
pub mod core;
pub mod keys;
pub mod pmtu;
pub mod replay;
pub mod retransmit;

pub use ack::AckBitmap;
pub use core::{InboundOutcome, Session};
pub use keys::SessionKeys;
pub use pmtu::{MtuChangeListener, PmtuDiscovery};
pub use replay::{ReplayCheck, ReplayWindow};
pub use retransmit::{RetransmitBuffer, RetransmitSweep};
