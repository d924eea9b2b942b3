//! Worker control-connection dispatch loop: reads Job-Request /
//! Job-Control-Request frames and relays each Job-Completed the runtime
//! produces as soon as it arrives.

use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tracing::warn;

use crate::error::CoreError;
use crate::message::job::JobCompleted;
use crate::message::Body;
use crate::session::Session;

use super::runtime::WorkerRuntime;

/// Default read timeout for a worker's control connection, used when a
/// caller has no configured override (matches `config::default_read_timeout_sec`).
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

/// Drives one worker's control connection until the coordinator sends
/// Server-Shutdown or two consecutive decode failures put it into
/// DRAINING: answers Job-Request/Job-Control-Request
/// inline, and forwards each Job-Completed the runtime enqueues.
pub async fn run_control_connection<T>(
    session: Session<T>,
    runtime: Arc<WorkerRuntime>,
    mut completions: mpsc::Receiver<JobCompleted>,
    read_timeout: Duration,
) -> Result<(), CoreError>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    loop {
        tokio::select! {
            completed = completions.recv() => {
                let Some(mut completed) = completed else { continue };
                completed.actual_start_millis = session.to_wire(completed.actual_start_millis);
                completed.actual_stop_millis = session.to_wire(completed.actual_stop_millis);
                session.send(session.next_message_id(), Body::JobCompleted(completed)).await?;
            },
            frame = session.read_next(read_timeout) => {
                let envelope = match frame {
                    Ok(Some(envelope)) => envelope,
                    Ok(None) => continue,
                    Err(err) => {
                        if session.should_drain() {
                            warn!(%err, "connection draining after consecutive decode failures, stopping in-flight jobs");
                            runtime.stop_all_due_to_shutdown().await;
                            return Err(err);
                        }
                        warn!(%err, "decode failure, connection continues");
                        continue;
                    },
                };

                match envelope.body {
                    Body::JobRequest(mut req) => {
                        req.start_millis = session.to_local(req.start_millis);
                        req.stop_millis = session.to_local(req.stop_millis);
                        let resp = runtime.handle_job_request(req, crate::clock::now_millis()).await;
                        session.send(envelope.message_id, Body::JobResponse(resp)).await?;
                    },
                    Body::JobControlRequest(req) => {
                        let resp = runtime.handle_job_control(req).await;
                        session.send(envelope.message_id, Body::JobControlResponse(resp)).await?;
                    },
                    Body::StatusRequest(req) => {
                        let resp = runtime.handle_status_request(req).await;
                        session.send(envelope.message_id, Body::StatusResponse(resp)).await?;
                    },
                    Body::Keepalive => {},
                    Body::ServerShutdown => {
                        runtime.stop_all_due_to_shutdown().await;
                        return Ok(());
                    },
                    other => warn!(?other, "unexpected message on worker control connection"),
                }
            },
        }
    }
}
