//! `WorkerRuntime`: the `jobID → JobRecord` map and the transition table
//! driving Job-Request / Job-Control handling, plus the optional real-time
//! stat channel.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;
use tracing::warn;

use crate::config::TlsTrustMode;
use crate::error::CoreError;
use crate::message::codes::{JobControlOp, JobState, ResponseCode};
use crate::message::job::{JobCompleted, JobControlRequest, JobControlResponse, JobId, JobRequest, JobResponse};
use crate::message::stat::{RegisterStat, ReportStat};
use crate::message::status::{StatusRequest, StatusResponse};
use crate::message::Body;
use crate::session::handshake::{perform_dialer_handshake, Identity};
use crate::session::transport::{self, Stream};
use crate::session::Session;
use crate::stats::realtime::JobId as RealtimeJobId;
use crate::stats::{IntervalSample, NullStatReporter, RealTimeStatReporter, TrackerSnapshot};

use super::job_record::{JobRecord, RecordState};
use super::probe::Registry;

/// Cooperative-stop grace window before a stop escalates to forceful
/// interruption of the worker tasks.
pub const STOP_GRACE: Duration = Duration::from_secs(5);

/// One worker task's per-tick cadence while it waits for either more work
/// or the cooperative-stop signal.
const TICK_PERIOD: Duration = Duration::from_millis(50);

/// The `jobID → JobRecord` map, the only shared mutable structure on each
/// worker, guarded by a `tokio::sync::Mutex`. Held behind an `Arc` so
/// background completion tasks can call back into it after a connection
/// handler has moved on to the next frame.
pub struct WorkerRuntime {
    client_id: String,
    registry: Registry,
    jobs: Mutex<HashMap<JobId, JobRecord>>,
    completions: mpsc::Sender<JobCompleted>,
    reporter: Arc<dyn RealTimeStatReporter>,
    stop_grace: Duration,
}

fn merge_snapshots(snapshots: Vec<TrackerSnapshot>) -> Vec<TrackerSnapshot> {
    let mut merged: Vec<TrackerSnapshot> = Vec::new();
    for snap in snapshots {
        let existing = merged.iter_mut().position(|m| m.display_name == snap.display_name);
        match existing {
            Some(idx) if merged[idx].aggregate(&snap).is_ok() => {},
            _ => merged.push(snap),
        }
    }
    merged
}

impl WorkerRuntime {
    pub fn new(client_id: impl Into<String>, registry: Registry, completions: mpsc::Sender<JobCompleted>) -> Self {
        Self::with_reporter(client_id, registry, completions, Arc::new(NullStatReporter))
    }

    /// Same as `new`, but pushes each running job's per-interval tracker
    /// snapshots through `reporter` as they complete, typically a
    /// `ChannelStatReporter` feeding a `StatChannel`.
    pub fn with_reporter(
        client_id: impl Into<String>,
        registry: Registry,
        completions: mpsc::Sender<JobCompleted>,
        reporter: Arc<dyn RealTimeStatReporter>,
    ) -> Self {
        WorkerRuntime {
            client_id: client_id.into(),
            registry,
            jobs: Mutex::new(HashMap::new()),
            completions,
            reporter,
            stop_grace: STOP_GRACE,
        }
    }

    /// Overrides the cooperative-stop grace window (defaults to
    /// `STOP_GRACE`); deployments tune this via `WorkerConfig::stop_grace_sec`.
    pub fn with_stop_grace(mut self, stop_grace: Duration) -> Self {
        self.stop_grace = stop_grace;
        self
    }

    /// Job-Request handling: validate, look up the job class, reject a
    /// reused jobID as busy, and record the job pending its explicit start.
    pub async fn handle_job_request(&self, req: JobRequest, local_now_millis: i64) -> JobResponse {
        if let Err(err) = req.validate() {
            return JobResponse {
                job_id: req.job_id,
                response_code: ResponseCode::InvalidParameters,
                message: err.to_string(),
            };
        }
        if self.registry.build(&req.job_class).is_none() {
            return JobResponse {
                job_id: req.job_id,
                response_code: ResponseCode::UnsupportedJobClass,
                message: format!("no such job class `{}`", req.job_class),
            };
        }

        let mut jobs = self.jobs.lock().await;
        if jobs.contains_key(&req.job_id) {
            return JobResponse {
                job_id: req.job_id,
                response_code: ResponseCode::ClientBusy,
                message: "jobID already in use".into(),
            };
        }

        let scheduled_start = local_now_millis.max(req.start_millis);
        let record = JobRecord::new(
            req.job_id.clone(),
            req.job_class.clone(),
            req.client_number,
            req.threads_per_client,
            req.thread_startup_delay_ms,
            req.collection_interval_sec,
            scheduled_start,
            req.stop_millis,
            req.duration_sec,
            req.parameters.clone(),
        );
        jobs.insert(req.job_id.clone(), record);
        JobResponse { job_id: req.job_id, response_code: ResponseCode::Success, message: "accepted".into() }
    }

    pub async fn handle_job_control(self: &Arc<Self>, req: JobControlRequest) -> JobControlResponse {
        match req.op {
            JobControlOp::Start => self.start_job(req.job_id).await,
            JobControlOp::Stop => self.stop_job(req.job_id, JobState::StoppedByUser, false).await,
            JobControlOp::StopAndWait => self.stop_job(req.job_id, JobState::StoppedByUser, true).await,
            JobControlOp::StopDueToShutdown => self.stop_job(req.job_id, JobState::StoppedDueToShutdown, true).await,
        }
    }

    /// Status-Request handling: reports this worker as ready plus, when a
    /// jobID is named, that job's current lifecycle state.
    pub async fn handle_status_request(&self, req: StatusRequest) -> StatusResponse {
        let job_status = match &req.job_id {
            Some(job_id) => match self.jobs.lock().await.get(job_id) {
                Some(record) => Some(format!("{:?}", record.state)),
                None => Some("NO_SUCH_JOB".into()),
            },
            None => None,
        };
        StatusResponse {
            response_code: ResponseCode::Success,
            client_state: "READY".into(),
            client_message: format!("{} active job(s)", self.jobs.lock().await.len()),
            job_status,
        }
    }

    /// Server-Shutdown received: local `STOP_DUE_TO_SHUTDOWN` for every job
    /// still tracked on this connection.
    pub async fn stop_all_due_to_shutdown(self: &Arc<Self>) {
        let job_ids: Vec<JobId> = self.jobs.lock().await.keys().cloned().collect();
        for job_id in job_ids {
            self.stop_job(job_id, JobState::StoppedDueToShutdown, true).await;
        }
    }

    async fn start_job(self: &Arc<Self>, job_id: JobId) -> JobControlResponse {
        let stop_epoch = {
            let mut jobs = self.jobs.lock().await;
            let Some(record) = jobs.get_mut(&job_id) else {
                return JobControlResponse { job_id, response_code: ResponseCode::NoSuchJob, message: "no such job".into() };
            };
            if record.state != RecordState::Pending {
                return JobControlResponse {
                    job_id,
                    response_code: ResponseCode::LocalError,
                    message: format!("job is not pending, current state is {:?}", record.state),
                };
            }

            record.state = RecordState::Running;
            let start_epoch = crate::clock::now_millis();
            record.actual_start_millis = Some(start_epoch);
            record.log("INFO", start_epoch, "job started");

            let client_id = self.client_id.clone();
            let interval_sec = record.collection_interval_sec;
            let startup_delay = Duration::from_millis(record.thread_startup_delay_ms as u64);
            let stop_signal = record.stop_signal.clone();

            let report_period = Duration::from_secs(interval_sec.max(1) as u64);
            for i in 0..record.threads_per_client {
                let Some(mut executor) = self.registry.build(&record.job_class) else {
                    break; // already validated at Job-Request time
                };
                let client_id = client_id.clone();
                let stop_signal = stop_signal.clone();
                let delay = startup_delay * i;
                let reporter = Arc::clone(&self.reporter);
                let realtime_job_id = RealtimeJobId(job_id.0.clone());
                record.task_handles.spawn(async move {
                    tokio::time::sleep(delay).await;
                    executor.start(&client_id, Instant::now(), interval_sec);
                    let mut next_report = Instant::now() + report_period;
                    while !stop_signal.is_cancelled() {
                        executor.tick(Instant::now());
                        let now = Instant::now();
                        if now >= next_report {
                            for snapshot in executor.snapshot() {
                                reporter.report(IntervalSample { job_id: realtime_job_id.clone(), snapshot });
                            }
                            next_report = now + report_period;
                        }
                        tokio::time::sleep(TICK_PERIOD).await;
                    }
                    executor.snapshot()
                });
            }

            record.effective_stop_millis()
        };

        let watcher = Arc::clone(self);
        let watcher_job_id = job_id.clone();
        tokio::spawn(async move {
            let delay_ms = (stop_epoch - crate::clock::now_millis()).max(0) as u64;
            tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            watcher.complete_if_still_running(watcher_job_id).await;
        });

        JobControlResponse { job_id, response_code: ResponseCode::Success, message: "started".into() }
    }

    /// The duration-based stop watcher's trigger: completes the job only if
    /// nothing else (an explicit stop) already claimed it.
    async fn complete_if_still_running(self: &Arc<Self>, job_id: JobId) {
        {
            let jobs = self.jobs.lock().await;
            match jobs.get(&job_id) {
                Some(record) if record.state == RecordState::Running => {},
                _ => return,
            }
        }
        self.complete_job(job_id, JobState::CompletedSuccessfully, None).await;
    }

    async fn stop_job(self: &Arc<Self>, job_id: JobId, job_state: JobState, wait: bool) -> JobControlResponse {
        {
            let mut jobs = self.jobs.lock().await;
            let Some(record) = jobs.get_mut(&job_id) else {
                return JobControlResponse { job_id, response_code: ResponseCode::NoSuchJob, message: "no such job".into() };
            };
            record.state = RecordState::Stopping;
            record.stop_signal.cancel();
        }

        if !wait {
            let runtime = Arc::clone(self);
            let job_id_bg = job_id.clone();
            let stop_grace = self.stop_grace;
            tokio::spawn(async move { runtime.complete_job(job_id_bg, job_state, Some(stop_grace)).await });
            return JobControlResponse { job_id, response_code: ResponseCode::Success, message: "stop signalled".into() };
        }

        self.complete_job(job_id.clone(), job_state, Some(self.stop_grace)).await;
        JobControlResponse { job_id, response_code: ResponseCode::Success, message: "stopped".into() }
    }

    /// Removes the record, joins its worker tasks (forcefully aborting them
    /// if `grace` elapses first), merges their tracker snapshots by display
    /// name, and enqueues the resulting Job-Completed.
    async fn complete_job(self: &Arc<Self>, job_id: JobId, job_state: JobState, grace: Option<Duration>) {
        let mut jobs = self.jobs.lock().await;
        let Some(mut record) = jobs.remove(&job_id) else { return };
        drop(jobs);
        record.stop_signal.cancel();

        let mut snapshots = Vec::new();
        let mut timed_out = false;
        match grace {
            Some(grace_duration) => {
                let deadline = Instant::now() + grace_duration;
                loop {
                    match tokio::time::timeout_at(deadline, record.task_handles.join_next()).await {
                        Ok(Some(Ok(snaps))) => snapshots.extend(snaps),
                        Ok(Some(Err(err))) => warn!(%err, "worker task panicked"),
                        Ok(None) => break,
                        Err(_elapsed) => {
                            timed_out = true;
                            break;
                        },
                    }
                }
            },
            None => {
                while let Some(joined) = record.task_handles.join_next().await {
                    match joined {
                        Ok(snaps) => snapshots.extend(snaps),
                        Err(err) => warn!(%err, "worker task panicked"),
                    }
                }
            },
        }

        if timed_out {
            warn!(job_id = %record.job_id, "stop grace window elapsed, aborting worker tasks");
            record.task_handles.abort_all();
            while record.task_handles.join_next().await.is_some() {}
        }

        let merged = merge_snapshots(snapshots);
        let start = record.actual_start_millis.unwrap_or(record.scheduled_start_millis);
        let stop = crate::clock::now_millis();
        let completed = JobCompleted::new(record.job_id.clone(), job_state, start, stop, merged, record.log_messages);
        if self.completions.send(completed).await.is_err() {
            warn!("completion channel closed, dropping Job-Completed");
        }
    }
}

/// The optional outbound connection to the coordinator's stat port: its
/// own handshake, its own writer mutex (via `Session`), and a dedup set
/// so each `(job, client, thread, displayName)` tuple registers at most
/// once per channel lifetime.
pub struct StatChannel {
    session: Session<Stream>,
    registered: Mutex<HashSet<(JobId, String, u32, String)>>,
    dropped: AtomicU64,
}

impl StatChannel {
    pub async fn connect(
        host: &str,
        port: u16,
        use_tls: bool,
        trust_mode: TlsTrustMode,
        identity: &Identity,
    ) -> Result<Self, CoreError> {
        let stream = transport::connect(host, port, use_tls, trust_mode).await?;
        let session = perform_dialer_handshake(stream, identity).await?;
        Ok(StatChannel { session, registered: Mutex::new(HashSet::new()), dropped: AtomicU64::new(0) })
    }

    /// Drains real-time samples until the sender side is dropped. Intended
    /// to be spawned as its own task, independent of the control
    /// connection's dispatch loop.
    pub async fn run(self: Arc<Self>, mut rx: mpsc::Receiver<IntervalSample>) {
        while let Some(sample) = rx.recv().await {
            self.publish(sample).await;
        }
    }

    async fn publish(&self, sample: IntervalSample) {
        let job_id = JobId(sample.job_id.0.clone());
        let key = (
            job_id.clone(),
            sample.snapshot.client_id.clone(),
            sample.snapshot.thread_id,
            sample.snapshot.display_name.clone(),
        );
        let is_new = self.registered.lock().await.insert(key);

        if is_new {
            let register = RegisterStat {
                job_id: job_id.clone(),
                client_id: sample.snapshot.client_id.clone(),
                thread_id: sample.snapshot.thread_id,
                display_name: sample.snapshot.display_name.clone(),
                tracker_kind: sample.snapshot.kind.to_i64(),
            };
            if let Err(err) = self.session.send(self.session.next_message_id(), Body::RegisterStat(register)).await {
                warn!(%err, "dropping real-time sample, Register-Stat failed");
                self.dropped.fetch_add(1, Ordering::Relaxed);
                return;
            }
        }

        let report = ReportStat { job_id, snapshot: sample.snapshot };
        if let Err(err) = self.session.send(self.session.next_message_id(), Body::ReportStat(report)).await {
            warn!(%err, "dropping real-time sample, Report-Stat failed");
            self.dropped.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn dropped_count(&self) -> u64 {
        self.dropped.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::stats::TrackerKind;

    fn sample_request(job_id: &str, class: &str) -> JobRequest {
        JobRequest {
            job_id: JobId(job_id.into()),
            job_class: class.into(),
            start_millis: 0,
            stop_millis: i64::MAX,
            client_number: 0,
            duration_sec: 100,
            threads_per_client: 1,
            thread_startup_delay_ms: 0,
            collection_interval_sec: 1,
            parameters: vec![],
        }
    }

    #[tokio::test]
    async fn unregistered_job_class_is_rejected() {
        let (tx, _rx) = mpsc::channel(8);
        let runtime = WorkerRuntime::new("worker-1", Registry::load_client_default(), tx);
        let resp = runtime.handle_job_request(sample_request("J1", "no-such-class"), 0).await;
        assert_eq!(resp.response_code, ResponseCode::UnsupportedJobClass);
    }

    #[tokio::test]
    async fn duplicate_job_id_is_busy() {
        let (tx, _rx) = mpsc::channel(8);
        let runtime = WorkerRuntime::new("worker-1", Registry::load_client_default(), tx);
        let first = runtime.handle_job_request(sample_request("J1", "null-op"), 0).await;
        assert_eq!(first.response_code, ResponseCode::Success);
        let second = runtime.handle_job_request(sample_request("J1", "null-op"), 0).await;
        assert_eq!(second.response_code, ResponseCode::ClientBusy);
    }

    #[tokio::test]
    async fn invalid_parameters_are_rejected_before_touching_the_job_map() {
        let (tx, _rx) = mpsc::channel(8);
        let runtime = WorkerRuntime::new("worker-1", Registry::load_client_default(), tx);
        let mut req = sample_request("J1", "null-op");
        req.threads_per_client = 0;
        let resp = runtime.handle_job_request(req, 0).await;
        assert_eq!(resp.response_code, ResponseCode::InvalidParameters);
    }

    #[tokio::test]
    async fn start_then_stop_and_wait_produces_a_job_completed() {
        let (tx, mut rx) = mpsc::channel(8);
        let runtime = Arc::new(WorkerRuntime::new("worker-1", Registry::load_client_default(), tx));
        runtime.handle_job_request(sample_request("J1", "null-op"), 0).await;

        let start_resp = runtime.handle_job_control(JobControlRequest { job_id: JobId("J1".into()), op: JobControlOp::Start }).await;
        assert_eq!(start_resp.response_code, ResponseCode::Success);

        tokio::time::sleep(Duration::from_millis(120)).await;

        let stop_resp = runtime
            .handle_job_control(JobControlRequest { job_id: JobId("J1".into()), op: JobControlOp::StopAndWait })
            .await;
        assert_eq!(stop_resp.response_code, ResponseCode::Success);

        let completed = rx.recv().await.expect("a Job-Completed should have been enqueued");
        assert_eq!(completed.job_id, JobId("J1".into()));
        assert_eq!(completed.job_state, JobState::StoppedByUser);
        assert!(completed.stat_trackers.iter().any(|t| t.display_name == "iterations"));
    }

    #[tokio::test]
    async fn job_control_on_unknown_job_id_is_no_such_job() {
        let (tx, _rx) = mpsc::channel(8);
        let runtime = Arc::new(WorkerRuntime::new("worker-1", Registry::load_client_default(), tx));
        let resp = runtime
            .handle_job_control(JobControlRequest { job_id: JobId("missing".into()), op: JobControlOp::Stop })
            .await;
        assert_eq!(resp.response_code, ResponseCode::NoSuchJob);
    }

    #[test]
    fn merge_snapshots_aggregates_same_display_name() {
        let a = TrackerSnapshot {
            kind: TrackerKind::Integer,
            display_name: "ops".into(),
            client_id: "c1".into(),
            thread_id: 0,
            interval_sec: 1,
            values: vec![1.0, 2.0],
            counts: vec![1, 1],
            categories: vec![],
        };
        let b = TrackerSnapshot { client_id: "c2".into(), values: vec![3.0, 4.0], counts: vec![1, 1], ..a.clone() };
        let merged = merge_snapshots(vec![a, b]);
        assert_eq!(merged.len(), 1);
        assert_eq!(merged[0].values, vec![4.0, 6.0]);
    }

    #[test]
    fn merge_snapshots_keeps_distinct_display_names_separate() {
        let a = TrackerSnapshot {
            kind: TrackerKind::Integer,
            display_name: "ops".into(),
            client_id: "c1".into(),
            thread_id: 0,
            interval_sec: 1,
            values: vec![1.0],
            counts: vec![1],
            categories: vec![],
        };
        let b = TrackerSnapshot { display_name: "errors".into(), ..a.clone() };
        let merged = merge_snapshots(vec![a, b]);
        assert_eq!(merged.len(), 2);
    }
}
