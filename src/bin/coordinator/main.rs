mod args;

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::{select, signal};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, instrument, warn, Level};

use crate::args::Args;
use loadfabric::config::{self, CoordinatorConfig};
use loadfabric::coordinator::{accept_stat_connection, Dispatcher, WorkerConnection};
use loadfabric::session::handshake::{AllowAll, Identity};
use loadfabric::stats::IntervalSample;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();
    loadfabric::logging::init(args.debug);

    let cfg: CoordinatorConfig = match config::load_yaml(&args.config) {
        Ok(cfg) => cfg,
        Err(error) => {
            error!(%error, "failed to load configuration");
            return ExitCode::from(2);
        },
    };

    let cancel = CancellationToken::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if let Err(error) = signal::ctrl_c().await {
                warn!(%error, "something strange with ctrl-c handling!");
            }
            cancel.cancel();
        });
    }

    let control_listener = match TcpListener::bind(cfg.control_bind).await {
        Ok(l) => l,
        Err(error) => {
            error!(%error, "failed to bind control port");
            return ExitCode::from(111);
        },
    };
    let stat_listener = match TcpListener::bind(cfg.stat_bind).await {
        Ok(l) => l,
        Err(error) => {
            error!(%error, "failed to bind stat port");
            return ExitCode::from(111);
        },
    };

    let dispatcher: Arc<Dispatcher<TcpStream>> =
        Arc::new(Dispatcher::new().with_completion_grace(std::time::Duration::from_secs(cfg.stop_grace_sec)));
    let identity = Identity {
        version: loadfabric::PROTOCOL_VERSION,
        id: "coordinator".into(),
        auth_type: cfg.auth.auth_type,
        auth_id: cfg.auth.auth_id.clone(),
        auth_credentials: bytes::Bytes::from(cfg.auth.auth_credentials.clone().into_bytes()),
        request_server_auth: false,
        restricted_mode: false,
        supports_time_sync: true,
    };

    let (samples_tx, samples_rx) = mpsc::channel::<IntervalSample>(256);
    tokio::spawn(drain_samples(samples_rx));

    let control_task = tokio::spawn(control_accept_loop(
        cancel.clone(),
        control_listener,
        dispatcher.clone(),
        identity.clone(),
        cfg.clone(),
    ));
    let read_timeout = std::time::Duration::from_secs(cfg.read_timeout_sec);
    let stat_task =
        tokio::spawn(stat_accept_loop(cancel.clone(), stat_listener, identity.clone(), samples_tx, read_timeout));

    let _ = tokio::join!(control_task, stat_task);

    ExitCode::SUCCESS
}

/// Consumes forwarded Report-Stat samples; this deployment has no
/// downstream sink yet, so it just logs them at debug level rather than
/// silently dropping the channel.
async fn drain_samples(mut rx: mpsc::Receiver<IntervalSample>) {
    while let Some(sample) = rx.recv().await {
        tracing::debug!(
            job_id = %sample.job_id.0,
            tracker = %sample.snapshot.display_name,
            "received real-time stat sample"
        );
    }
}

async fn control_accept_loop(
    cancel: CancellationToken,
    listener: TcpListener,
    dispatcher: Arc<Dispatcher<TcpStream>>,
    identity: Identity,
    cfg: CoordinatorConfig,
) {
    info!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "listening for workers");
    loop {
        let (conn, _) = select! {
            accept = listener.accept() => match accept {
                Ok(pair) => pair,
                Err(error) => {
                    warn!(%error, "failed to accept control connection");
                    continue;
                },
            },
            _ = cancel.cancelled() => return,
        };

        let dispatcher = dispatcher.clone();
        let identity = identity.clone();
        let cfg = cfg.clone();
        tokio::spawn(async move { handle_worker_connection(conn, dispatcher, identity, cfg).await });
    }
}

#[instrument(err(level = Level::WARN), skip_all)]
async fn handle_worker_connection(
    conn: TcpStream,
    dispatcher: Arc<Dispatcher<TcpStream>>,
    identity: Identity,
    cfg: CoordinatorConfig,
) -> Result<(), loadfabric::error::CoreError> {
    let connection = Arc::new(
        WorkerConnection::accept(
            conn,
            &identity,
            &AllowAll,
            |client_id| cfg.worker_os.get(client_id).cloned().unwrap_or_else(|| "unknown".into()),
            std::time::Duration::from_secs(cfg.read_timeout_sec),
        )
        .await?,
    );
    let client_id = connection.descriptor.client_id.clone();
    info!(%client_id, os = %connection.descriptor.os, "worker connected");

    dispatcher.register(connection.clone()).await;
    let result = connection.run().await;
    dispatcher.unregister(&client_id).await;
    info!(%client_id, "worker disconnected");
    result
}

async fn stat_accept_loop(
    cancel: CancellationToken,
    listener: TcpListener,
    identity: Identity,
    samples_tx: mpsc::Sender<IntervalSample>,
    read_timeout: std::time::Duration,
) {
    info!(addr = %listener.local_addr().map(|a| a.to_string()).unwrap_or_default(), "listening for stat channels");
    loop {
        let (conn, _) = select! {
            accept = listener.accept() => match accept {
                Ok(pair) => pair,
                Err(error) => {
                    warn!(%error, "failed to accept stat connection");
                    continue;
                },
            },
            _ = cancel.cancelled() => return,
        };

        let identity = identity.clone();
        let samples_tx = samples_tx.clone();
        tokio::spawn(async move {
            if let Err(error) = accept_stat_connection(conn, &identity, &AllowAll, samples_tx, read_timeout).await {
                warn!(%error, "stat connection ended");
            }
        });
    }
}

