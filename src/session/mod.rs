//! Session layer (C4): per-connection framed I/O, handshake, auth,
//! clock-sync, keepalive, read timeouts, and message-ID allocation.

pub mod connection;
pub mod handshake;
pub mod state;
pub mod transport;

pub use connection::{Role, Session};
pub use handshake::{perform_dialer_handshake, perform_listener_handshake, AllowAll, AuthValidator, Identity};
pub use state::SessionState;
