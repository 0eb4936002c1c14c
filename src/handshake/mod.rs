//! Handshake (C4): PSK-authenticated one-round-trip ECDH, replay-nonce
//! cache, session-ticket 0-RTT resumption, and the handshake state machine.

pub mod init;
pub mod nonce_cache;
pub mod state;
pub mod ticket;

pub use init::{
    build_init, build_response, derive_session_keys, process_init, process_response,
    AcceptedInit, AcceptedResponse, HandshakeConfig, PendingInit, DEFAULT_NONCE_CACHE_CAPACITY,
    DEFAULT_SKEW_TOLERANCE,
};
pub use nonce_cache::ReplayNonceCache;
pub use state::HandshakeState;
pub use ticket::{
    issue as issue_ticket, validate as validate_ticket, SessionTicketPlaintext, TicketCache,
    TicketKey, DEFAULT_TICKET_LIFETIME, TICKET_PLAINTEXT_LEN,
};
