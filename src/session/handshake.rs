//! Dialer/listener handshake: hello exchange, optional
//! auth check, and clock-skew computation.

use std::time::Duration;

use bytes::Bytes;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::CoreError;
use crate::message::codes::{AuthType, ResponseCode};
use crate::message::hello::{AuthInfo, ClientHello, HelloResponse};
use crate::message::Body;

use super::connection::{Role, Session};

/// Warn, but do not fail the handshake, once the magnitude of clock skew
/// exceeds this.
pub const SKEW_WARNING_THRESHOLD_MILLIS: i64 = 2000;

pub const DEFAULT_HANDSHAKE_TIMEOUT: Duration = Duration::from_secs(10);

/// Local identity presented during the hello exchange, assembled from
/// `config::WorkerConfig` / `config::CoordinatorConfig`.
#[derive(Clone, Debug)]
pub struct Identity {
    pub version: i64,
    pub id: String,
    pub auth_type: AuthType,
    pub auth_id: String,
    pub auth_credentials: Bytes,
    pub request_server_auth: bool,
    pub restricted_mode: bool,
    pub supports_time_sync: bool,
}

impl Identity {
    fn auth_info(&self) -> Option<AuthInfo> {
        if self.auth_type == AuthType::None {
            return None;
        }
        Some(AuthInfo {
            auth_type: self.auth_type,
            id: self.auth_id.clone(),
            credentials: self.auth_credentials.clone(),
        })
    }
}

/// Authenticates a presented `AuthInfo` (or its absence) against whatever
/// the listener's config requires. The coordinator and a worker's
/// real-time stat listener both implement this against their own
/// configured credentials.
pub trait AuthValidator: Send + Sync {
    fn validate(&self, presented: Option<&AuthInfo>) -> ResponseCode;
}

/// Accepts any peer; used when `auth_type = none` in the listener's
/// config.
pub struct AllowAll;

impl AuthValidator for AllowAll {
    fn validate(&self, _presented: Option<&AuthInfo>) -> ResponseCode {
        ResponseCode::Success
    }
}

fn skew_from_peer_epoch(peer_epoch_millis: i64, local_epoch_millis: i64) -> i64 {
    let skew = peer_epoch_millis - local_epoch_millis;
    if skew.abs() > SKEW_WARNING_THRESHOLD_MILLIS {
        tracing::warn!(skew_millis = skew, "clock skew exceeds warning threshold");
    }
    skew
}

/// Dials a listener: sends Client-Hello, awaits Hello-Response, computes
/// skew on success.
pub async fn perform_dialer_handshake<T>(stream: T, identity: &Identity) -> Result<Session<T>, CoreError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let session = Session::new(stream, Role::Worker, 0);
    session.enter(super::state::SessionState::HelloSent).await?;

    let hello = ClientHello {
        client_version: identity.version,
        client_id: identity.id.clone(),
        auth: identity.auth_info(),
        request_server_auth: identity.request_server_auth,
        restricted_mode: identity.restricted_mode,
        supports_time_sync: identity.supports_time_sync,
    };
    session.send(session.next_message_id(), Body::ClientHello(hello)).await?;

    let local_epoch_before = crate::clock::now_millis();
    let envelope = session
        .read_next(DEFAULT_HANDSHAKE_TIMEOUT)
        .await?
        .ok_or_else(|| CoreError::Fatal("handshake timed out waiting for Hello-Response".into()))?;

    let resp = match envelope.body {
        Body::HelloResponse(resp) => resp,
        other => {
            return Err(CoreError::Protocol(format!("expected Hello-Response, got {other:?}")));
        },
    };

    if resp.response_code != ResponseCode::Success {
        session.enter(super::state::SessionState::Rejected).await?;
        let message = format!("handshake rejected: {:?} ({})", resp.response_code, resp.message);
        return if resp.response_code.terminates_session() {
            Err(CoreError::Fatal(message))
        } else {
            Err(CoreError::Semantic(message))
        };
    }

    let skew_millis = match resp.server_epoch_millis {
        Some(peer_epoch) if identity.supports_time_sync => skew_from_peer_epoch(peer_epoch, local_epoch_before),
        _ => 0,
    };

    session.set_skew_millis(skew_millis);
    session.enter(super::state::SessionState::HelloAcked).await?;
    session.enter(super::state::SessionState::Ready).await?;

    Ok(session)
}

/// Accepts a dialer: awaits Client-Hello, validates auth, replies with
/// Hello-Response. Returns the parsed Client-Hello
/// alongside the session so a listener (e.g. the coordinator) can learn
/// the dialer's declared identity for its own bookkeeping.
pub async fn perform_listener_handshake<T>(
    stream: T,
    identity: &Identity,
    validator: &dyn AuthValidator,
) -> Result<(Session<T>, ClientHello), CoreError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let session = Session::new(stream, Role::Coordinator, 0);

    let envelope = session
        .read_next(DEFAULT_HANDSHAKE_TIMEOUT)
        .await?
        .ok_or_else(|| CoreError::Fatal("handshake timed out waiting for Client-Hello".into()))?;
    let hello = match envelope.body {
        Body::ClientHello(hello) => hello,
        other => return Err(CoreError::Protocol(format!("expected Client-Hello, got {other:?}"))),
    };
    session.enter(super::state::SessionState::HelloSent).await?;

    let response_code = if hello.client_version > identity.version {
        ResponseCode::UnsupportedClientVersion
    } else {
        validator.validate(hello.auth.as_ref())
    };
    let server_epoch_millis = if hello.supports_time_sync { Some(crate::clock::now_millis()) } else { None };

    let response = HelloResponse {
        response_code,
        message: if response_code == ResponseCode::Success {
            "ok".to_string()
        } else {
            format!("rejected: {response_code:?}")
        },
        server_epoch_millis,
    };
    session.send(session.next_message_id(), Body::HelloResponse(response)).await?;

    if response_code != ResponseCode::Success {
        session.enter(super::state::SessionState::Rejected).await?;
        return Err(CoreError::Semantic(format!("peer rejected: {response_code:?}")));
    }

    session.enter(super::state::SessionState::HelloAcked).await?;
    session.enter(super::state::SessionState::Ready).await?;
    Ok((session, hello))
}
