//! Wire protocol: frame codec (C2) and datagram assembly (§6).

pub mod datagram;
pub mod frame;

pub use datagram::{build_datagram, parse_datagram, ParsedDatagram};
pub use frame::{control_kind, decode, decode_view, WireFrame, WireFrameView};
