//! A single member of a sync-limit cluster.
//!
//! Serves `/verify?id=<client>` for the load balancer and `/sync` for the
//! other members, and reconciles counts with `--members` in the background.

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use sync_limit::AdmissionGate;
use sync_limit::CounterStore;
use sync_limit::Scheduler;
use sync_limit::SyncConfig;
use sync_limit::SyncCoordinator;
use sync_limit::SystemClock;
use sync_limit::WindowClock;
use tokio::net::TcpListener;
use tokio::signal;
use tokio::sync::watch;
use tower::BoxError;
use tower_sync::HttpTransport;
use tower_sync::NodeState;
use tracing::info;
use tracing_subscriber::EnvFilter;

/// Distributed rate limiter node
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Address to listen on
    #[arg(long, env = "SYNC_LIMIT_ADDR", default_value = "localhost:8000")]
    addr: String,

    /// Comma separated addresses of the other cluster members
    #[arg(long, env = "SYNC_LIMIT_MEMBERS", default_value = "")]
    members: String,

    /// The maximum number of allowed requests per client per minute
    #[arg(long, env = "SYNC_LIMIT_MAX_ALLOWED", default_value_t = 500)]
    max_allowed: u64,

    /// Time between reconciliation rounds
    #[arg(
        long,
        env = "SYNC_LIMIT_SYNC_INTERVAL",
        default_value = "1s",
        value_parser = humantime::parse_duration
    )]
    sync_interval: Duration,

    /// Window reset period used until resets align to the minute
    #[arg(
        long,
        env = "SYNC_LIMIT_RESET_INTERVAL",
        default_value = "10s",
        value_parser = humantime::parse_duration
    )]
    reset_interval: Duration,

    /// Deadline for a single call to a peer
    #[arg(
        long,
        env = "SYNC_LIMIT_PEER_TIMEOUT",
        default_value = "2s",
        value_parser = humantime::parse_duration
    )]
    peer_timeout: Duration,

    /// Accept sync requests regardless of their second-of-minute tag
    #[arg(long, env = "SYNC_LIMIT_ACCEPT_STALE")]
    accept_stale: bool,
}

#[tokio::main]
async fn main() -> Result<(), BoxError> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_target(true)
        .init();

    let config = SyncConfig::new(args.max_allowed)
        .with_peers(args.members.split(','))
        .with_sync_interval(args.sync_interval)
        .with_bootstrap_reset_interval(args.reset_interval)
        .with_peer_timeout(args.peer_timeout)
        .with_reject_stale(!args.accept_stale);
    config.validate()?;

    info!(
        addr = %args.addr,
        peers = ?config.peers,
        ceiling = config.ceiling,
        "starting the distributed rate limiter"
    );

    let clock: Arc<dyn WindowClock> = Arc::new(SystemClock);
    let store = Arc::new(CounterStore::new());
    let gate = Arc::new(AdmissionGate::new(store.clone(), config.ceiling));

    let coordinator = SyncCoordinator::new(
        store.clone(),
        HttpTransport::new(config.peer_timeout)?,
        config.peers.clone(),
        config.peer_timeout,
        clock.clone(),
    );
    let scheduler = Scheduler::new(
        store.clone(),
        coordinator,
        clock.clone(),
        config.sync_interval,
        config.bootstrap_reset_interval,
    );

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    tokio::spawn(async move {
        shutdown_signal().await;
        let _ = shutdown_tx.send(true);
    });

    let scheduler_task =
        tokio::spawn(scheduler.run_until(wait_for_shutdown(shutdown_rx.clone())));

    let app = tower_sync::router(NodeState::new(gate, store, clock, config.reject_stale));
    let listener = TcpListener::bind(&args.addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(wait_for_shutdown(shutdown_rx))
        .await?;

    scheduler_task.await?;
    info!("node shutting down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            tracing::error!(error = %err, "failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut term) => {
                term.recv().await;
            }
            Err(err) => {
                tracing::error!(error = %err, "failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

async fn wait_for_shutdown(mut shutdown: watch::Receiver<bool>) {
    if *shutdown.borrow() {
        return;
    }
    let _ = shutdown.changed().await;
}
