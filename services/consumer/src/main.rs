//! Consumer service: supervises N sharded projection workers pulling
//! one replication stream from a producer.
//!
//! Grounded in the teacher's `services/server/src/main.rs` (tracing
//! setup, graceful shutdown) and `services/receiver/src/local_proxy.rs`
//! (a `watch`-signalled shutdown handed down into a supervised loop).

use consumer::worker::{AnyOffsetStore, ConsumerWorker};
use consumer::{config, handler};
use rep_daemon::Supervisor;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "consumer starting");

    let cfg = match config::load_config() {
        Ok(cfg) => {
            info!(
                producer_url = %cfg.producer_url,
                stream_id = %cfg.stream_id,
                workers = cfg.worker_count,
                "config loaded"
            );
            cfg
        }
        Err(err) => {
            eprintln!("FATAL: failed to load config: {err}");
            std::process::exit(1);
        }
    };

    let exactly_once = cfg.mode == config::DeliveryMode::ExactlyOnce;
    if exactly_once && cfg.offset_store_path.is_none() {
        eprintln!("FATAL: mode = \"exactly_once\" requires offset_store_path to be set");
        std::process::exit(1);
    }

    let store = match &cfg.offset_store_path {
        Some(path) => rep_consumer::SqliteOffsetStore::open(Path::new(path))
            .map(|store| AnyOffsetStore::Sqlite(Arc::new(store)))
            .unwrap_or_else(|err| {
                eprintln!("FATAL: failed to open offset store at {path}: {err}");
                std::process::exit(1);
            }),
        None => AnyOffsetStore::InMemory(rep_consumer::InMemoryOffsetStore::new()),
    };

    let worker = Arc::new(ConsumerWorker {
        projection_name: cfg.projection_name.clone(),
        stream_id: cfg.stream_id.clone(),
        producer_url: cfg.producer_url.clone(),
        backoff: cfg.backoff(),
        store: Arc::new(store),
        handler: Arc::new(handler::LoggingHandler),
        transactional_handler: Arc::new(handler::LoggingHandler),
        commit_group_size: cfg.commit_group_size,
        exactly_once,
    });

    let supervisor = Supervisor::start(cfg.worker_count, worker, Arc::new(rep_daemon::StaticMembership));
    info!(workers = supervisor.worker_count(), "projection workers started");

    shutdown_signal().await;
    info!("shutting down, waiting for in-flight commits");
    supervisor.stop_all().await;
    info!("consumer shut down gracefully");
}

async fn shutdown_signal() {
    use tokio::signal;

    let ctrl_c = async {
        signal::ctrl_c().await.expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => { info!("received Ctrl+C"); },
        _ = terminate => { info!("received SIGTERM"); },
    }
}
