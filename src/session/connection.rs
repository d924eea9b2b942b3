//! `Session`: the live, framed connection plus everything a dispatch loop
//! needs to read, write, and track health on it.

use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tokio_util::codec::Framed;

use crate::codec::{self, Element};
use crate::error::CoreError;
use crate::message::{Body, Envelope, MessageId};

use super::state::{SessionState, Transition};

/// Which side of the connection we are, determining message-ID starting
/// parity: even = worker, odd = coordinator.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Role {
    Worker,
    Coordinator,
}

impl Role {
    fn starting_id(self) -> u64 {
        match self {
            Role::Worker => 0,
            Role::Coordinator => 1,
        }
    }
}

/// How long a connection may sit idle before the dispatch loop emits a
/// Keepalive.
pub const KEEPALIVE_INTERVAL: Duration = Duration::from_secs(30);

/// A single live connection: framed I/O, the session state machine, the
/// message-ID counter, write serialization, clock skew, and the
/// consecutive-decode-failure count that drives DRAINING.
#[derive(Debug)]
pub struct Session<T> {
    framed: Mutex<Framed<T, codec::Codec>>,
    transition: Mutex<Transition>,
    next_message_id: AtomicU64,
    /// `peerEpoch − localEpoch`, fixed at handshake for the life of the
    /// connection. Set once, by the
    /// handshake, before the session is handed to its dispatch loop.
    skew_millis: AtomicI64,
    consecutive_decode_failures: AtomicU64,
}

impl<T> Session<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new(stream: T, role: Role, skew_millis: i64) -> Self {
        Session {
            framed: Mutex::new(codec::framed(stream)),
            transition: Mutex::new(Transition::new()),
            next_message_id: AtomicU64::new(role.starting_id()),
            skew_millis: AtomicI64::new(skew_millis),
            consecutive_decode_failures: AtomicU64::new(0),
        }
    }

    pub fn skew_millis(&self) -> i64 {
        self.skew_millis.load(Ordering::SeqCst)
    }

    /// Set once, by the handshake, before the session is handed off to its
    /// dispatch loop.
    pub fn set_skew_millis(&self, skew_millis: i64) {
        self.skew_millis.store(skew_millis, Ordering::SeqCst);
    }

    /// `localTime = peerTime − skew`. Saturating so a sentinel like
    /// `i64::MAX` (an unbounded stop time) survives the conversion intact
    /// instead of wrapping.
    pub fn to_local(&self, wire_millis: i64) -> i64 {
        wire_millis.saturating_sub(self.skew_millis())
    }

    /// `wireTime = localTime + skew`.
    pub fn to_wire(&self, local_millis: i64) -> i64 {
        local_millis.saturating_add(self.skew_millis())
    }

    pub fn next_message_id(&self) -> MessageId {
        MessageId(self.next_message_id.fetch_add(2, Ordering::SeqCst))
    }

    pub async fn state(&self) -> SessionState {
        self.transition.lock().await.current()
    }

    pub async fn enter(&self, to: SessionState) -> Result<(), CoreError> {
        self.transition
            .lock()
            .await
            .apply(to)
            .map_err(|err| CoreError::Fatal(err.to_string()))
    }

    /// Sends an envelope under the write mutex, so only one writer ever
    /// flushes a frame at a time.
    pub async fn send(&self, message_id: MessageId, body: Body) -> Result<(), CoreError> {
        use futures::SinkExt;
        let envelope = Envelope::new(message_id, body);
        let mut framed = self.framed.lock().await;
        framed.send(envelope.encode()).await?;
        Ok(())
    }

    /// Blocks on the next frame with a bounded read timeout.
    /// `Ok(None)` means the timeout elapsed with no frame — not an error,
    /// just a cue for the dispatch loop to consider a keepalive.
    pub async fn read_next(&self, read_timeout: Duration) -> Result<Option<Envelope>, CoreError> {
        use futures::StreamExt;
        let mut framed = self.framed.lock().await;
        match timeout(read_timeout, framed.next()).await {
            Err(_elapsed) => Ok(None),
            Ok(None) => Err(CoreError::Protocol("connection closed mid-frame".into())),
            Ok(Some(Ok(element))) => {
                self.consecutive_decode_failures.store(0, Ordering::SeqCst);
                Ok(Some(Envelope::decode(&element)?))
            },
            Ok(Some(Err(err))) => {
                self.consecutive_decode_failures.fetch_add(1, Ordering::SeqCst);
                Err(err.into())
            },
        }
    }

    /// `true` once two consecutive decode failures have been observed,
    /// the DRAINING trigger.
    pub fn should_drain(&self) -> bool {
        self.consecutive_decode_failures.load(Ordering::SeqCst) >= 2
    }

    /// Called from the dispatch loop on every read timeout:
    /// sends a Keepalive if the connection has been idle at least
    /// `KEEPALIVE_INTERVAL`, and returns the new `idle_since` instant.
    pub async fn maybe_send_keepalive(
        &self,
        message_id: MessageId,
        idle_since: tokio::time::Instant,
        now: tokio::time::Instant,
    ) -> Result<tokio::time::Instant, CoreError> {
        if now.duration_since(idle_since) < KEEPALIVE_INTERVAL {
            return Ok(idle_since);
        }
        self.send(message_id, Body::Keepalive).await?;
        Ok(now)
    }

    async fn send_raw(&self, element: Element) -> Result<(), CoreError> {
        use futures::SinkExt;
        let mut framed = self.framed.lock().await;
        framed.send(element).await?;
        Ok(())
    }

    /// Best-effort Server-Shutdown broadcast ahead of closing. Failures
    /// are swallowed: the connection is going down either way.
    pub async fn send_shutdown_best_effort(&self, message_id: MessageId) {
        let envelope = Envelope::new(message_id, Body::ServerShutdown);
        let _ = self.send_raw(envelope.encode()).await;
    }
}
