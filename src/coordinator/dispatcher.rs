//! Coordinator dispatcher (C6): per-connection request/response
//! demultiplexing plus job orchestration across the assigned workers.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::{oneshot, Mutex};
use tokio::time::timeout;
use tracing::{instrument, warn};

use crate::error::CoreError;
use crate::message::codes::{JobControlOp, JobState, ResponseCode};
use crate::message::job::{JobCompleted, JobControlRequest, JobControlResponse, JobId, JobRequest, JobResponse};
use crate::message::status::{StatusRequest, StatusResponse};
use crate::message::{Body, MessageId};
use crate::session::connection::Session;
use crate::session::handshake::{perform_listener_handshake, AuthValidator, Identity};
use crate::stats::TrackerSnapshot;

use super::aggregation::{aggregate_completions, completion_deadline, COMPLETION_GRACE, DEFAULT_START_BARRIER};
use super::assignment::{assign_clients, JobRequirements, WorkerDescriptor};

/// How long a connection's receive loop waits for a frame before looping
/// to re-check for shutdown; mirrors `session::connection::KEEPALIVE_INTERVAL`
/// on the dialer side.
/// Default read timeout for a worker's control connection on the
/// coordinator side, used when no `CoordinatorConfig::read_timeout_sec`
/// override is threaded through.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Default)]
struct PendingReplies {
    job_responses: HashMap<JobId, oneshot::Sender<JobResponse>>,
    control_responses: HashMap<JobId, oneshot::Sender<JobControlResponse>>,
    completions: HashMap<JobId, oneshot::Sender<JobCompleted>>,
    status_responses: HashMap<MessageId, oneshot::Sender<StatusResponse>>,
}

/// One connected worker: its framed session, assignment descriptor, and
/// the outstanding request/response bookkeeping its receive loop
/// maintains. Distinct from the worker-local `JobRecord` — this is
/// the coordinator's view, which spans every connection a job touches.
/// Generic over the transport so tests can drive it over
/// `tokio::io::duplex` without a real socket.
pub struct WorkerConnection<T> {
    pub descriptor: WorkerDescriptor,
    session: Session<T>,
    pending: Mutex<PendingReplies>,
    read_timeout: Duration,
}

impl<T> WorkerConnection<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    /// Completes the listener side of the handshake and wraps the result.
    /// `resolve_os` is consulted with the dialer's `clientID` once the
    /// hello reveals it: the wire Client-Hello carries version and
    /// restricted-mode but no OS field, so the coordinator's own
    /// deployment config (`CoordinatorConfig::worker_os`) is the source
    /// of truth for it, the same way a worker's probe config names its
    /// own job classes. `read_timeout` bounds how long `run` waits for a
    /// frame before re-checking for shutdown (`CoordinatorConfig::read_timeout_sec`).
    pub async fn accept(
        stream: T,
        identity: &Identity,
        validator: &dyn AuthValidator,
        resolve_os: impl Fn(&str) -> String,
        read_timeout: Duration,
    ) -> Result<Self, CoreError> {
        let (session, hello) = perform_listener_handshake(stream, identity, validator).await?;
        let os = resolve_os(&hello.client_id);
        let descriptor = WorkerDescriptor {
            client_id: hello.client_id,
            version: hello.client_version,
            os,
            authorized: hello.auth.is_some(),
            restricted_mode: hello.restricted_mode,
        };
        Ok(WorkerConnection { descriptor, session, pending: Mutex::new(PendingReplies::default()), read_timeout })
    }

    /// Drives the connection's receive loop: routes Job-Response and
    /// Job-Control-Response to whichever `send_job_request`/
    /// `send_job_control` call is awaiting it, and Job-Completed to
    /// whichever `await_completion` call registered for that jobID.
    /// Returns once the peer sends Server-Shutdown, or once two
    /// consecutive decode failures put the connection into DRAINING.
    #[instrument(skip(self), fields(worker = %self.descriptor.client_id))]
    pub async fn run(&self) -> Result<(), CoreError> {
        loop {
            let envelope = match self.session.read_next(self.read_timeout).await {
                Ok(Some(envelope)) => envelope,
                Ok(None) => continue,
                Err(err) => {
                    if self.session.should_drain() {
                        warn!(%err, "connection draining after consecutive decode failures");
                        return Err(err);
                    }
                    warn!(%err, "decode failure, connection continues");
                    continue;
                },
            };

            match envelope.body {
                Body::JobResponse(resp) => {
                    if let Some(tx) = self.pending.lock().await.job_responses.remove(&resp.job_id) {
                        let _ = tx.send(resp);
                    }
                },
                Body::JobControlResponse(resp) => {
                    if let Some(tx) = self.pending.lock().await.control_responses.remove(&resp.job_id) {
                        let _ = tx.send(resp);
                    }
                },
                Body::JobCompleted(mut completed) => {
                    completed.actual_start_millis = self.session.to_local(completed.actual_start_millis);
                    completed.actual_stop_millis = self.session.to_local(completed.actual_stop_millis);
                    if let Some(tx) = self.pending.lock().await.completions.remove(&completed.job_id) {
                        let _ = tx.send(completed);
                    } else {
                        warn!(job_id = %completed.job_id, "unsolicited Job-Completed, no waiter registered");
                    }
                },
                Body::StatusResponse(resp) => {
                    if let Some(tx) = self.pending.lock().await.status_responses.remove(&envelope.message_id) {
                        let _ = tx.send(resp);
                    }
                },
                Body::Keepalive => {},
                Body::ServerShutdown => return Ok(()),
                other => warn!(?other, "unexpected message on a control connection"),
            }
        }
    }

    /// Registers interest in a job's eventual Job-Completed. Must be
    /// called before `send_job_control`'s START so a fast-completing
    /// worker can never race ahead of the listener.
    pub async fn await_completion(&self, job_id: JobId) -> oneshot::Receiver<JobCompleted> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.completions.insert(job_id, tx);
        rx
    }

    pub async fn send_job_request(&self, req: JobRequest) -> Result<JobResponse, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.job_responses.insert(req.job_id.clone(), tx);
        self.session.send(self.session.next_message_id(), Body::JobRequest(req)).await?;
        rx.await.map_err(|_| CoreError::Fatal("connection closed awaiting Job-Response".into()))
    }

    pub async fn send_job_control(&self, req: JobControlRequest) -> Result<JobControlResponse, CoreError> {
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.control_responses.insert(req.job_id.clone(), tx);
        self.session.send(self.session.next_message_id(), Body::JobControlRequest(req)).await?;
        rx.await.map_err(|_| CoreError::Fatal("connection closed awaiting Job-Control-Response".into()))
    }

    /// Polls this worker's health, and optionally one job's lifecycle
    /// state, outside of the job-orchestration flow. Keyed by messageID rather than jobID
    /// since a bare health check carries no job at all.
    pub async fn send_status_request(&self, req: StatusRequest) -> Result<StatusResponse, CoreError> {
        let (tx, rx) = oneshot::channel();
        let message_id = self.session.next_message_id();
        self.pending.lock().await.status_responses.insert(message_id, tx);
        self.session.send(message_id, Body::StatusRequest(req)).await?;
        rx.await.map_err(|_| CoreError::Fatal("connection closed awaiting Status-Response".into()))
    }
}

/// A job submission, in the coordinator's own terms rather than the wire
/// Job-Request's (which is per-worker and carries a `clientNumber`).
#[derive(Clone, Debug)]
pub struct JobSpec {
    pub job_id: JobId,
    pub job_class: String,
    pub requirements: JobRequirements,
    pub clients_needed: u32,
    pub threads_per_client: u32,
    pub thread_startup_delay_ms: u32,
    pub collection_interval_sec: u32,
    pub start_millis: i64,
    pub stop_millis: i64,
    pub duration_sec: u32,
    pub parameters: Vec<(String, String)>,
}

#[derive(Debug)]
pub enum JobOutcome {
    Completed { merged: Vec<TrackerSnapshot>, state: JobState, completions: Vec<JobCompleted> },
    Aborted { reason: String },
}

/// Registry of currently connected workers plus the job-orchestration API
/// built on top of it.
pub struct Dispatcher<T> {
    connections: Mutex<HashMap<String, Arc<WorkerConnection<T>>>>,
    completion_grace: Duration,
}

impl<T> Default for Dispatcher<T> {
    fn default() -> Self {
        Dispatcher { connections: Mutex::new(HashMap::new()), completion_grace: COMPLETION_GRACE }
    }
}

impl<T> Dispatcher<T>
where
    T: AsyncRead + AsyncWrite + Unpin + Send,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Overrides the completion-wait grace added on top of a job's own
    /// span (defaults to `COMPLETION_GRACE`); deployments tune this via
    /// `CoordinatorConfig::stop_grace_sec`.
    pub fn with_completion_grace(mut self, grace: Duration) -> Self {
        self.completion_grace = grace;
        self
    }

    pub async fn register(&self, connection: Arc<WorkerConnection<T>>) {
        self.connections.lock().await.insert(connection.descriptor.client_id.clone(), connection);
    }

    pub async fn unregister(&self, client_id: &str) {
        self.connections.lock().await.remove(client_id);
    }

    async fn descriptors(&self) -> Vec<WorkerDescriptor> {
        self.connections.lock().await.values().map(|c| c.descriptor.clone()).collect()
    }

    /// Assigns, starts, runs, and aggregates one job across the eligible
    /// connected workers: Job-Request to each, the SUCCESS start barrier,
    /// Job-Control START, waiting out each worker's completion deadline,
    /// then aggregating.
    #[instrument(skip(self, spec), fields(job_id = %spec.job_id))]
    pub async fn run_job(&self, spec: JobSpec) -> JobOutcome {
        let candidates = self.descriptors().await;
        let Some(selected) = assign_clients(&spec.requirements, spec.clients_needed, &candidates) else {
            return JobOutcome::Aborted { reason: "insufficient eligible workers".into() };
        };
        let selected_ids: Vec<String> = selected.iter().map(|w| w.client_id.clone()).collect();

        let mut assigned: Vec<(u32, Arc<WorkerConnection<T>>)> = Vec::new();
        {
            let connections = self.connections.lock().await;
            for (client_number, id) in selected_ids.iter().enumerate() {
                let Some(conn) = connections.get(id).cloned() else {
                    return JobOutcome::Aborted { reason: format!("worker `{id}` disconnected before assignment") };
                };
                assigned.push((client_number as u32, conn));
            }
        }

        let mut completion_rx = Vec::with_capacity(assigned.len());
        for (_, conn) in &assigned {
            completion_rx.push(conn.await_completion(spec.job_id.clone()).await);
        }

        let responses = match timeout(DEFAULT_START_BARRIER, self.send_job_requests(&assigned, &spec)).await {
            Ok(Ok(responses)) => responses,
            Ok(Err(err)) => return JobOutcome::Aborted { reason: err.to_string() },
            Err(_elapsed) => {
                self.stop_all(&assigned, &spec.job_id).await;
                return JobOutcome::Aborted { reason: "start barrier timed out".into() };
            },
        };

        if responses.iter().any(|r| r.response_code != ResponseCode::Success) {
            self.stop_all(&assigned, &spec.job_id).await;
            return JobOutcome::Aborted { reason: "a worker rejected the job".into() };
        }

        for (_, conn) in &assigned {
            let start_req = JobControlRequest { job_id: spec.job_id.clone(), op: JobControlOp::Start };
            if let Err(err) = conn.send_job_control(start_req).await {
                warn!(%err, "failed to send Job-Control START");
            }
        }

        let deadline = completion_deadline(spec.start_millis, spec.stop_millis, self.completion_grace);
        let mut completions = Vec::new();
        for rx in completion_rx {
            if let Ok(Ok(completed)) = timeout(deadline, rx).await {
                completions.push(completed);
            }
        }

        let (merged, state) = aggregate_completions(&completions, assigned.len());
        JobOutcome::Completed { merged, state, completions }
    }

    async fn send_job_requests(
        &self,
        assigned: &[(u32, Arc<WorkerConnection<T>>)],
        spec: &JobSpec,
    ) -> Result<Vec<JobResponse>, CoreError> {
        let mut responses = Vec::with_capacity(assigned.len());
        for (client_number, conn) in assigned {
            let req = JobRequest {
                job_id: spec.job_id.clone(),
                job_class: spec.job_class.clone(),
                start_millis: conn.session.to_wire(spec.start_millis),
                stop_millis: conn.session.to_wire(spec.stop_millis),
                client_number: *client_number,
                duration_sec: spec.duration_sec,
                threads_per_client: spec.threads_per_client,
                thread_startup_delay_ms: spec.thread_startup_delay_ms,
                collection_interval_sec: spec.collection_interval_sec,
                parameters: spec.parameters.clone(),
            };
            responses.push(conn.send_job_request(req).await?);
        }
        Ok(responses)
    }

    async fn stop_all(&self, assigned: &[(u32, Arc<WorkerConnection<T>>)], job_id: &JobId) {
        for (_, conn) in assigned {
            let req = JobControlRequest { job_id: job_id.clone(), op: JobControlOp::StopAndWait };
            if let Err(err) = conn.send_job_control(req).await {
                warn!(%err, "failed to send STOP_AND_WAIT during abort");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bytes::Bytes;
    use tokio::io::duplex;

    use crate::message::codes::AuthType;

    fn worker_identity(id: &str) -> Identity {
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

    async fn connected_pair() -> (WorkerConnection<tokio::io::DuplexStream>, tokio::task::JoinHandle<Result<crate::session::connection::Session<tokio::io::DuplexStream>, CoreError>>) {
        use crate::session::handshake::{perform_dialer_handshake, AllowAll};

        let (dial_side, listen_side) = duplex(8192);
        let dialer_identity = worker_identity("worker-1");
        let listener_identity = worker_identity("coordinator");

        let dialer = tokio::spawn(async move { perform_dialer_handshake(dial_side, &dialer_identity).await });
        let conn =
            WorkerConnection::accept(listen_side, &listener_identity, &AllowAll, |_| "linux".to_string(), DEFAULT_READ_TIMEOUT)
                .await
                .unwrap();
        (conn, dialer)
    }

    #[tokio::test]
    async fn accept_records_descriptor_from_client_hello() {
        let (conn, dialer) = connected_pair().await;
        assert_eq!(conn.descriptor.client_id, "worker-1");
        assert_eq!(conn.descriptor.version, 3);
        assert_eq!(conn.descriptor.os, "linux");
        dialer.abort();
    }

    #[tokio::test]
    async fn job_response_is_routed_to_its_waiter() {
        let (conn, dialer_handshake) = connected_pair().await;
        let dial_session = dialer_handshake.await.unwrap().unwrap();

        let conn = Arc::new(conn);
        let run_conn = conn.clone();
        let run_handle = tokio::spawn(async move { run_conn.run().await });

        let responder = tokio::spawn(async move {
            let envelope = dial_session.read_next(Duration::from_secs(1)).await.unwrap().unwrap();
            let Body::JobRequest(req) = envelope.body else { panic!("expected Job-Request") };
            let resp = JobResponse { job_id: req.job_id, response_code: ResponseCode::Success, message: "ok".into() };
            dial_session.send(envelope.message_id, Body::JobResponse(resp)).await.unwrap();
        });

        let req = JobRequest {
            job_id: JobId("J1".into()),
            job_class: "null-op".into(),
            start_millis: 0,
            stop_millis: 1000,
            client_number: 0,
            duration_sec: 1,
            threads_per_client: 1,
            thread_startup_delay_ms: 0,
            collection_interval_sec: 1,
            parameters: vec![],
        };
        let resp = conn.send_job_request(req).await.unwrap();
        assert_eq!(resp.response_code, ResponseCode::Success);

        responder.await.unwrap();
        run_handle.abort();
    }

    #[tokio::test]
    async fn status_response_is_routed_to_its_waiter() {
        let (conn, dialer_handshake) = connected_pair().await;
        let dial_session = dialer_handshake.await.unwrap().unwrap();

        let conn = Arc::new(conn);
        let run_conn = conn.clone();
        let run_handle = tokio::spawn(async move { run_conn.run().await });

        let responder = tokio::spawn(async move {
            let envelope = dial_session.read_next(Duration::from_secs(1)).await.unwrap().unwrap();
            let Body::StatusRequest(req) = envelope.body else { panic!("expected Status-Request") };
            assert!(req.job_id.is_none());
            let resp = StatusResponse {
                response_code: ResponseCode::Success,
                client_state: "READY".into(),
                client_message: "0 active job(s)".into(),
                job_status: None,
            };
            dial_session.send(envelope.message_id, Body::StatusResponse(resp)).await.unwrap();
        });

        let resp = conn.send_status_request(StatusRequest { job_id: None }).await.unwrap();
        assert_eq!(resp.response_code, ResponseCode::Success);
        assert_eq!(resp.client_state, "READY");

        responder.await.unwrap();
        run_handle.abort();
    }
}
