//! `veil`: an obfuscated, authenticated UDP VPN tunnel data-plane engine.
//!
//! Module map, in the dependency order the handshake and session logic
//! actually builds on: [`crypto`] (C1) -> [`proto`] (C2) -> [`obfuscation`]
//! (C3) -> [`handshake`] (C4) -> [`session`] (C5/C7) -> [`eventloop`] (C8) /
//! [`pipeline`] (C9) -> [`orchestrator`] (C10), with [`config`], [`ipc`],
//! and [`iface`] as the ambient/external-interface layers and [`error`] the
//! shared error taxonomy everything returns into.

pub mod config;
pub mod crypto;
pub mod error;
pub mod eventloop;
pub mod handshake;
pub mod iface;
pub mod ipc;
pub mod obfuscation;
pub mod orchestrator;
pub mod pipeline;
pub mod proto;
pub mod session;
