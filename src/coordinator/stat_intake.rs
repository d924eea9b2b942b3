//! Stat-port intake: accepts a worker's real-time stat connection and
//! forwards each Report-Stat onto a shared sample channel for live
//! aggregation or display.

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio::time::Duration;
use tracing::{instrument, warn};

use crate::error::CoreError;
use crate::message::Body;
use crate::session::handshake::{perform_listener_handshake, AuthValidator, Identity};
use crate::stats::realtime::{IntervalSample, JobId as RealtimeJobId};

/// Default read timeout for a stat connection, used when no
/// `CoordinatorConfig::read_timeout_sec` override is threaded through.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives one stat connection until the worker closes it or two
/// consecutive decode failures put it into DRAINING. Register-Stat is
/// acknowledged only by virtue of not erroring — this channel carries no
/// reply for it.
#[instrument(skip(stream, identity, validator, samples))]
pub async fn accept_stat_connection<T>(
    stream: T,
    identity: &Identity,
    validator: &dyn AuthValidator,
    samples: mpsc::Sender<IntervalSample>,
    read_timeout: Duration,
) -> Result<(), CoreError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    let (session, hello) = perform_listener_handshake(stream, identity, validator).await?;
    let client_id = hello.client_id;

    loop {
        let envelope = match session.read_next(read_timeout).await {
            Ok(Some(envelope)) => envelope,
            Ok(None) => continue,
            Err(err) => {
                if session.should_drain() {
                    warn!(%err, worker = %client_id, "stat connection draining");
                    return Err(err);
                }
                continue;
            },
        };

        match envelope.body {
            Body::RegisterStat(_) => {},
            Body::ReportStat(report) => {
                let sample = IntervalSample { job_id: RealtimeJobId(report.job_id.0), snapshot: report.snapshot };
                if samples.send(sample).await.is_err() {
                    warn!(worker = %client_id, "stat sample receiver dropped, closing connection");
                    return Ok(());
                }
            },
            Body::Keepalive => {},
            Body::ServerShutdown => return Ok(()),
            other => warn!(?other, worker = %client_id, "unexpected message on stat connection"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::duplex;

    use crate::message::codes::AuthType;
    use crate::message::job::JobId;
    use crate::message::stat::ReportStat;
    use crate::session::handshake::{perform_dialer_handshake, AllowAll};
    use crate::stats::tracker::TrackerKind;
    use crate::stats::TrackerSnapshot;

    fn identity(id: &str) -> Identity {
        Identity {
            version: 3,
            id: id.into(),
            auth_type: AuthType::None,
            auth_id: String::new(),
            auth_credentials: Bytes::new(),
            request_server_auth: false,
            restricted_mode: false,
            supports_time_sync: false,
        }
    }

    #[tokio::test]
    async fn report_stat_is_forwarded_as_an_interval_sample() {
        let (dial_side, listen_side) = duplex(8192);
        let (tx, mut rx) = mpsc::channel(4);

        let dialer_identity = identity("worker-1");
        let dialer = tokio::spawn(async move {
            let session = perform_dialer_handshake(dial_side, &dialer_identity).await.unwrap();
            let snapshot = TrackerSnapshot {
                kind: TrackerKind::Integer,
                display_name: "ops".into(),
                client_id: "worker-1".into(),
                thread_id: 0,
                interval_sec: 1,
                values: vec![3.0],
                counts: vec![1],
                categories: vec![],
            };
            let report = ReportStat { job_id: JobId("J1".into()), snapshot };
            session.send(session.next_message_id(), Body::ReportStat(report)).await.unwrap();
        });

        let listener_identity = identity("coordinator");
        tokio::spawn(async move {
            let _ = accept_stat_connection(listen_side, &listener_identity, &AllowAll, tx, DEFAULT_READ_TIMEOUT).await;
        });

        let sample = rx.recv().await.unwrap();
        assert_eq!(sample.job_id.0, "J1");
        assert_eq!(sample.snapshot.values, vec![3.0]);
        dialer.await.unwrap();
    }
}
