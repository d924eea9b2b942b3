//! End-to-end seed scenarios driven over a real in-process connection:
//! a worker's control-connection dispatch loop on one side, raw
//! `Session` frames on the other, with real multi-second timing rather
//! than mocked clocks.

use std::sync::Arc;
use std::time::Duration;

use bytes::{Bytes, BytesMut};
use tokio::io::duplex;
use tokio::sync::mpsc;

use loadfabric::message::codes::{AuthType, JobControlOp, JobState, ResponseCode};
use loadfabric::message::job::{JobControlRequest, JobId, JobRequest};
use loadfabric::message::{Body, Envelope, MessageId};
use loadfabric::session::connection::Role;
use loadfabric::session::handshake::{perform_dialer_handshake, perform_listener_handshake, AllowAll, Identity};
use loadfabric::session::Session;
use loadfabric::worker::{run_control_connection, Registry, WorkerRuntime, DEFAULT_READ_TIMEOUT};

fn identity(id: &str) -> Identity {
    Identity {
        version: loadfabric::PROTOCOL_VERSION,
        id: id.into(),
        auth_type: AuthType::None,
        auth_id: String::new(),
        auth_credentials: Bytes::new(),
        request_server_auth: false,
        restricted_mode: false,
        supports_time_sync: false,
    }
}

/// Wires up one worker control connection over an in-process duplex pipe,
/// the coordinator side of the handshake already completed, ready for a
/// test to drive Job-Request/Job-Control frames over.
async fn spawn_worker() -> (
    Session<tokio::io::DuplexStream>,
    tokio::task::JoinHandle<Result<(), loadfabric::error::CoreError>>,
) {
    let (dial_side, listen_side) = duplex(8192);
    let worker_identity = identity("worker-1");
    let coordinator_identity = identity("coordinator");

    let dialer = tokio::spawn(async move { perform_dialer_handshake(dial_side, &worker_identity).await });
    let (listen_session, _hello) =
        perform_listener_handshake(listen_side, &coordinator_identity, &AllowAll).await.unwrap();
    let dial_session = dialer.await.unwrap().unwrap();

    let (tx, rx) = mpsc::channel(8);
    let runtime = Arc::new(WorkerRuntime::new("worker-1", Registry::load_client_default(), tx));
    let dispatch = tokio::spawn(run_control_connection(listen_session, runtime, rx, DEFAULT_READ_TIMEOUT));

    (dial_session, dispatch)
}

fn job_request(job_id: &str, duration_sec: u32) -> JobRequest {
    JobRequest {
        job_id: JobId(job_id.into()),
        job_class: "null-op".into(),
        start_millis: 0,
        stop_millis: i64::MAX,
        client_number: 0,
        duration_sec,
        threads_per_client: 2,
        thread_startup_delay_ms: 0,
        collection_interval_sec: 1,
        parameters: vec![],
    }
}

/// Scenario 1 (happy path, one worker): Job-Request accepted, Job-Control
/// START acknowledged, the job runs to completion on its own (no explicit
/// stop), and the resulting Job-Completed reports success with tracker
/// snapshots from both threads merged together.
#[tokio::test]
async fn happy_path_one_worker_runs_to_completion() {
    let (dial_session, dispatch) = spawn_worker().await;

    let req = job_request("J1", 1);
    dial_session.send(dial_session.next_message_id(), Body::JobRequest(req)).await.unwrap();
    let envelope = dial_session.read_next(Duration::from_secs(1)).await.unwrap().unwrap();
    let Body::JobResponse(resp) = envelope.body else { panic!("expected Job-Response") };
    assert_eq!(resp.response_code, ResponseCode::Success);

    let start_req = JobControlRequest { job_id: JobId("J1".into()), op: JobControlOp::Start };
    dial_session.send(dial_session.next_message_id(), Body::JobControlRequest(start_req)).await.unwrap();
    let envelope = dial_session.read_next(Duration::from_secs(1)).await.unwrap().unwrap();
    let Body::JobControlResponse(start_resp) = envelope.body else { panic!("expected Job-Control-Response") };
    assert_eq!(start_resp.response_code, ResponseCode::Success);

    // duration_sec is 1: the watcher should complete the job on its own,
    // with no further Job-Control-Request from this side.
    let envelope = dial_session.read_next(Duration::from_secs(3)).await.unwrap().unwrap();
    let Body::JobCompleted(completed) = envelope.body else { panic!("expected Job-Completed") };
    assert_eq!(completed.job_id, JobId("J1".into()));
    assert_eq!(completed.job_state, JobState::CompletedSuccessfully);
    assert!(completed.actual_stop_millis > completed.actual_start_millis);
    assert!(completed.stat_trackers.iter().any(|t| t.display_name == "iterations"));

    dispatch.abort();
}

/// Scenario 2 (early stop): a Job-Control STOP_AND_WAIT sent partway
/// through a much longer job returns only once the worker's tasks have
/// actually exited, and the completed job reports `StoppedByUser` rather
/// than running to its full scheduled duration.
#[tokio::test]
async fn stop_and_wait_reports_stopped_by_user_before_duration_elapses() {
    let (dial_session, dispatch) = spawn_worker().await;

    let req = job_request("J2", 3600);
    dial_session.send(dial_session.next_message_id(), Body::JobRequest(req)).await.unwrap();
    let envelope = dial_session.read_next(Duration::from_secs(1)).await.unwrap().unwrap();
    let Body::JobResponse(resp) = envelope.body else { panic!("expected Job-Response") };
    assert_eq!(resp.response_code, ResponseCode::Success);

    let start_req = JobControlRequest { job_id: JobId("J2".into()), op: JobControlOp::Start };
    dial_session.send(dial_session.next_message_id(), Body::JobControlRequest(start_req)).await.unwrap();
    let envelope = dial_session.read_next(Duration::from_secs(1)).await.unwrap().unwrap();
    let Body::JobControlResponse(start_resp) = envelope.body else { panic!("expected Job-Control-Response") };
    assert_eq!(start_resp.response_code, ResponseCode::Success);

    tokio::time::sleep(Duration::from_millis(200)).await;

    let stop_req = JobControlRequest { job_id: JobId("J2".into()), op: JobControlOp::StopAndWait };
    dial_session.send(dial_session.next_message_id(), Body::JobControlRequest(stop_req)).await.unwrap();
    let envelope = dial_session.read_next(Duration::from_secs(2)).await.unwrap().unwrap();
    let Body::JobControlResponse(stop_resp) = envelope.body else { panic!("expected Job-Control-Response") };
    assert_eq!(stop_resp.response_code, ResponseCode::Success);

    let envelope = dial_session.read_next(Duration::from_secs(1)).await.unwrap().unwrap();
    let Body::JobCompleted(completed) = envelope.body else { panic!("expected Job-Completed") };
    assert_eq!(completed.job_id, JobId("J2".into()));
    assert_eq!(completed.job_state, JobState::StoppedByUser);
    let actual_duration_ms = completed.actual_stop_millis - completed.actual_start_millis;
    assert!(
        actual_duration_ms < 3_000,
        "job should have stopped long before its 3600s duration, took {actual_duration_ms}ms"
    );

    dispatch.abort();
}

/// Scenario 4 (decode failure recovery), end to end: two consecutive
/// malformed frames drain the connection, and the in-flight job on it
/// receives a local stop rather than being left to run unattended. Drives
/// both sides at the raw TLV level (no handshake, matching how the
/// session layer's own drain tests operate) so the garbage bytes can be
/// interleaved with otherwise well-formed frames on the same stream.
#[tokio::test]
async fn decode_failure_drain_stops_the_in_flight_job() {
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio_util::codec::Decoder as _;

    let (mut dial_raw, listen_side) = duplex(8192);
    let listen_session = Session::new(listen_side, Role::Coordinator, 0);

    let (tx, rx) = mpsc::channel(8);
    let runtime = Arc::new(WorkerRuntime::new("worker-1", Registry::load_client_default(), tx));
    let dispatch = tokio::spawn(run_control_connection(listen_session, runtime, rx, DEFAULT_READ_TIMEOUT));

    let mut decoder = loadfabric::codec::reader::Decoder::default();
    let mut read_buf = BytesMut::new();

    async fn send_frame(stream: &mut tokio::io::DuplexStream, message_id: u64, body: Body) {
        let element = Envelope::new(MessageId(message_id), body).encode();
        let mut buf = BytesMut::new();
        element.encode(&mut buf);
        stream.write_all(&buf).await.unwrap();
    }

    async fn recv_frame(
        stream: &mut tokio::io::DuplexStream,
        decoder: &mut loadfabric::codec::reader::Decoder,
        buf: &mut BytesMut,
    ) -> Envelope {
        loop {
            if let Some(element) = decoder.decode(buf).unwrap() {
                return Envelope::decode(&element).unwrap();
            }
            let mut chunk = [0u8; 4096];
            let n = stream.read(&mut chunk).await.unwrap();
            buf.extend_from_slice(&chunk[..n]);
        }
    }

    send_frame(&mut dial_raw, 1, Body::JobRequest(job_request("J3", 3600))).await;
    let envelope = recv_frame(&mut dial_raw, &mut decoder, &mut read_buf).await;
    let Body::JobResponse(resp) = envelope.body else { panic!("expected Job-Response") };
    assert_eq!(resp.response_code, ResponseCode::Success);

    let start_req = JobControlRequest { job_id: JobId("J3".into()), op: JobControlOp::Start };
    send_frame(&mut dial_raw, 3, Body::JobControlRequest(start_req)).await;
    let envelope = recv_frame(&mut dial_raw, &mut decoder, &mut read_buf).await;
    let Body::JobControlResponse(start_resp) = envelope.body else { panic!("expected Job-Control-Response") };
    assert_eq!(start_resp.response_code, ResponseCode::Success);

    // Two bogus frames in a row: an unknown universal tag with a
    // zero-length short-form length, repeated (mirrors the session
    // layer's own drain test).
    dial_raw.write_all(&[0xFF, 0x00]).await.unwrap();
    dial_raw.write_all(&[0xFF, 0x00]).await.unwrap();

    let result = dispatch.await.unwrap();
    assert!(result.is_err(), "dispatch loop should end with an error once the connection drains");
}
