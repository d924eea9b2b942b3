//! Crate-wide error type used at task boundaries: the outermost `match`
//! in a connection task or runtime loop decides protocol-vs-fatal
//! handling from one enum instead of threading every leaf error type
//! through call sites.

use std::io;

use crate::codec::{element, reader, writer};
use crate::message;

#[derive(Debug)]
pub enum CoreError {
    /// Malformed frame or unrecognised content: counted per connection,
    /// two consecutive trigger DRAINING.
    Protocol(String),
    /// Valid frame, impossible content: answered with a non-success
    /// response code, connection survives.
    Semantic(String),
    /// Probe/workload failure surfaced through job log messages.
    Operational(String),
    /// Cannot allocate a socket, cannot read a handshake, or an
    /// unrecoverable codec error: the process aborts.
    Fatal(String),
    Io(io::Error),
}

impl std::fmt::Display for CoreError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CoreError::Protocol(msg) => write!(f, "protocol error: {msg}"),
            CoreError::Semantic(msg) => write!(f, "semantic error: {msg}"),
            CoreError::Operational(msg) => write!(f, "operational error: {msg}"),
            CoreError::Fatal(msg) => write!(f, "fatal error: {msg}"),
            CoreError::Io(err) => write!(f, "I/O error: {err}"),
        }
    }
}

impl std::error::Error for CoreError {}

impl From<io::Error> for CoreError {
    fn from(err: io::Error) -> Self {
        CoreError::Io(err)
    }
}

impl From<reader::Error> for CoreError {
    fn from(err: reader::Error) -> Self {
        match err {
            reader::Error::Io(io_err) => CoreError::Io(io_err),
            other => CoreError::Protocol(other.to_string()),
        }
    }
}

impl From<writer::Error> for CoreError {
    fn from(err: writer::Error) -> Self {
        match err {
            writer::Error::Io(io_err) => CoreError::Io(io_err),
        }
    }
}

impl From<element::Error> for CoreError {
    fn from(err: element::Error) -> Self {
        CoreError::Protocol(err.to_string())
    }
}

impl From<message::Error> for CoreError {
    fn from(err: message::Error) -> Self {
        match err {
            message::Error::UnknownTag(tag) => CoreError::Protocol(format!("unknown message type {:#04x}", tag.byte())),
            other => CoreError::Semantic(other.to_string()),
        }
    }
}

/// `true` for the category that must abort the process rather than drop
/// the connection or fail one job.
pub fn is_fatal(err: &CoreError) -> bool {
    matches!(err, CoreError::Fatal(_))
}
