//! Wire protocol and session/job lifecycle core for a distributed
//! load-generation and resource-monitoring fabric: framed binary
//! messages, connection handshake with optional mutual authentication and
//! clock-skew correction, per-connection job lifecycle, in-flight
//! real-time statistics reporting, controlled interruption, and graceful
//! shutdown.

pub mod clock;
pub mod codec;
pub mod config;
pub mod coordinator;
pub mod error;
pub mod logging;
pub mod message;
pub mod session;
pub mod stats;
pub mod worker;

/// Wire protocol version this build speaks: a listener rejects a dialer
/// whose declared version exceeds its own.
pub const PROTOCOL_VERSION: i64 = 3;
