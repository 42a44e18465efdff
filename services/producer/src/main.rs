//! Producer service: serves replication streams over WebSocket.
//!
//! Grounded in the teacher's `services/server/src/main.rs` (tracing
//! setup, graceful shutdown via `with_graceful_shutdown`) and
//! `services/forwarder/src/main.rs` (TOML config loading at startup).
//! The journal itself is `rep_source::InMemoryJournal`: persistent
//! storage backends are out of scope (spec.md §1 Non-goals).

use axum::routing::{get, post};
use axum::Router;
use producer::config;
use rep_core::PayloadRegistry;
use rep_producer::ProducerState;
use rep_source::InMemoryJournal;
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

    info!(version = env!("CARGO_PKG_VERSION"), "producer starting");

    let cfg = match config::load_config() {
        Ok(cfg) => {
            info!(bind = %cfg.bind, excluded_tags = cfg.excluded_tags.len(), "config loaded");
            cfg
        }
        Err(err) => {
            eprintln!("FATAL: failed to load config: {err}");
            std::process::exit(1);
        }
    };

    let excluded_tags: Vec<String> = cfg.excluded_tags;
    let producer_filter: rep_filter::ProducerFilter = if excluded_tags.is_empty() {
        rep_filter::allow_all()
    } else {
        Arc::new(move |env: &rep_core::EventEnvelope| !env.tags.iter().any(|tag| excluded_tags.contains(tag)))
    };

    let payload_registry: Option<Arc<dyn PayloadRegistry>> = cfg
        .allowed_payload_types
        .map(|allowed| Arc::new(rep_core::StaticPayloadRegistry::new(allowed)) as Arc<dyn PayloadRegistry>);

    let state = ProducerState { journal: Arc::new(InMemoryJournal::new()), producer_filter, payload_registry };

    let router: Router = Router::new()
        .route("/ws/v1/replication", get(rep_producer::ws_handler::<InMemoryJournal>))
        .route("/api/v1/event-timestamp", post(rep_producer::event_timestamp::<InMemoryJournal>))
        .route("/api/v1/load-event", post(rep_producer::load_event::<InMemoryJournal>))
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(&cfg.bind).await.expect("failed to bind");
    info!(addr = %cfg.bind, "producer listening");
    axum::serve(listener, router)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("producer server error");
    info!("producer shut down gracefully");
}

/// Waits for SIGTERM or Ctrl-C (SIGINT) and returns to trigger graceful shutdown.
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
        _ = ctrl_c => { info!("received Ctrl+C, shutting down"); },
        _ = terminate => { info!("received SIGTERM, shutting down"); },
    }
}
