mod args;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::select;
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{error, info, warn};

use crate::args::Args;
use loadfabric::config::{self, WorkerConfig};
use loadfabric::session::handshake::{perform_dialer_handshake, Identity};
use loadfabric::session::transport;
use loadfabric::stats::{ChannelStatReporter, IntervalSample};
use loadfabric::worker::{jittered_delay, run_control_connection, Registry, StatChannel, WorkerRuntime};

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    loadfabric::logging::init(args.debug);

    let cfg: WorkerConfig = match config::load_yaml(&args.config) {
        Ok(cfg) => cfg,
        Err(error) => {
            error!(%error, "failed to load configuration");
            return ExitCode::from(2);
        },
    };

    let identity = Identity {
        version: loadfabric::PROTOCOL_VERSION,
        id: cfg.client_id.clone(),
        auth_type: cfg.auth_type,
        auth_id: cfg.auth_id.clone(),
        auth_credentials: bytes::Bytes::from(cfg.auth_credentials.clone().into_bytes()),
        request_server_auth: cfg.auth_type != loadfabric::message::codes::AuthType::None,
        restricted_mode: cfg.restricted_mode,
        supports_time_sync: cfg.supports_time_sync,
    };

    let session = match connect_with_retry(&cfg, &identity).await {
        Ok(session) => session,
        Err(error) => {
            error!(%error, "giving up connecting to coordinator");
            return ExitCode::from(111);
        },
    };
    info!(client_id = %cfg.client_id, "connected to coordinator");

    let (completions_tx, completions_rx) = mpsc::channel(16);
    let runtime = Arc::new(build_runtime(&cfg, completions_tx).await);
    let read_timeout = std::time::Duration::from_secs(cfg.read_timeout_sec);

    let dispatch = tokio::spawn(run_control_connection(session, runtime, completions_rx, read_timeout));

    select! {
        result = dispatch => match result {
            Ok(Ok(())) => ExitCode::SUCCESS,
            Ok(Err(error)) => {
                error!(%error, "control connection ended with an error");
                ExitCode::FAILURE
            },
            Err(error) => {
                error!(%error, "control connection task panicked");
                ExitCode::FAILURE
            },
        },
        ctrl_c = signal::ctrl_c() => {
            if let Err(error) = ctrl_c {
                warn!(%error, "something strange with ctrl-c handling!");
            }
            ExitCode::SUCCESS
        },
    }
}

/// Connection attempts before giving up entirely.
const MAX_CONNECT_ATTEMPTS: u32 = 5;

/// Dials the coordinator's control port, retrying with jittered backoff on
/// transport or handshake failure (e.g. the coordinator hasn't started
/// listening yet).
async fn connect_with_retry(
    cfg: &WorkerConfig,
    identity: &Identity,
) -> Result<loadfabric::session::Session<loadfabric::session::transport::Stream>, loadfabric::error::CoreError> {
    for attempt in 0..MAX_CONNECT_ATTEMPTS {
        let outcome = async {
            let stream = transport::connect(
                &cfg.coordinator_host,
                cfg.coordinator_control_port,
                cfg.use_tls,
                cfg.tls_trust_mode,
            )
            .await?;
            perform_dialer_handshake(stream, identity).await
        }
        .await;

        match outcome {
            Ok(session) => return Ok(session),
            Err(error) if loadfabric::error::is_fatal(&error) => {
                warn!(%error, attempt, "coordinator rejected the handshake terminally, not retrying");
                return Err(error);
            },
            Err(error) if attempt + 1 < MAX_CONNECT_ATTEMPTS => {
                let delay = jittered_delay(attempt);
                warn!(%error, attempt, delay_ms = delay.as_millis() as u64, "failed to connect to coordinator, retrying");
                tokio::time::sleep(delay).await;
            },
            Err(error) => return Err(error),
        }
    }
    unreachable!("loop always returns before exhausting MAX_CONNECT_ATTEMPTS")
}

/// Builds the runtime with a live stat channel when real-time reporting is
/// enabled, or a no-op reporter otherwise.
async fn build_runtime(cfg: &WorkerConfig, completions_tx: mpsc::Sender<loadfabric::message::job::JobCompleted>) -> WorkerRuntime {
    let registry = Registry::load_client_default();
    let stop_grace = std::time::Duration::from_secs(cfg.stop_grace_sec);

    if !cfg.enable_real_time_stats {
        return WorkerRuntime::new(cfg.client_id.clone(), registry, completions_tx).with_stop_grace(stop_grace);
    }

    let stat_identity = Identity {
        version: loadfabric::PROTOCOL_VERSION,
        id: cfg.client_id.clone(),
        auth_type: cfg.auth_type,
        auth_id: cfg.auth_id.clone(),
        auth_credentials: bytes::Bytes::from(cfg.auth_credentials.clone().into_bytes()),
        request_server_auth: cfg.auth_type != loadfabric::message::codes::AuthType::None,
        restricted_mode: cfg.restricted_mode,
        supports_time_sync: cfg.supports_time_sync,
    };

    match StatChannel::connect(
        &cfg.coordinator_host,
        cfg.coordinator_stat_port,
        cfg.use_tls,
        cfg.tls_trust_mode,
        &stat_identity,
    )
    .await
    {
        Ok(channel) => {
            let channel = Arc::new(channel);
            let (samples_tx, samples_rx) = mpsc::channel::<IntervalSample>(256);
            tokio::spawn(channel.clone().run(samples_rx));
            let reporter = Arc::new(ChannelStatReporter::new(samples_tx));
            WorkerRuntime::with_reporter(cfg.client_id.clone(), registry, completions_tx, reporter).with_stop_grace(stop_grace)
        },
        Err(error) => {
            warn!(%error, "failed to establish real-time stat channel, continuing without it");
            WorkerRuntime::new(cfg.client_id.clone(), registry, completions_tx).with_stop_grace(stop_grace)
        },
    }
}
