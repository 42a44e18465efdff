//! The consumer-side stream client: connects to a producer, resends
//! `Init`/filter snapshot on every reconnect, and pulls envelopes at a
//! bounded, demand-driven rate (spec.md §4.5).
//!
//! Grounded in the teacher's `UplinkSession::connect`/`connect_with_resume`
//! (`services/forwarder/src/uplink.rs`): connect, send the handshake
//! message, then loop reading frames — generalized from the forwarder's
//! one-shot hello/ack exchange to an indefinitely-reconnecting stream.

use crate::backoff::{Backoff, BackoffConfig};
use futures_util::{SinkExt, StreamExt};
use rep_core::TimestampOffset;
use rep_protocol::{Init, StreamIn, StreamOut};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::protocol::Message;
use tracing::{info, warn};

/// Bounds how far the provider may read ahead of the projection
/// runtime's demand (spec.md §4.5: "one page ≤ 100").
pub const MAX_ENVELOPES_AHEAD_OF_DEMAND: usize = 100;

#[derive(Debug, Clone)]
pub struct ConsumerSourceConfig {
    pub producer_url: String,
    pub stream_id: String,
    pub slice_min: u16,
    pub slice_max: u16,
    pub backoff: BackoffConfig,
}

/// Runs the reconnect-forever loop, pushing received `StreamOut` messages
/// into `out`. `current_offset` is polled before each (re)connect so a
/// fresh `Init` always carries the most recent durably-committed offset.
pub async fn run(
    config: ConsumerSourceConfig,
    mut current_offset: impl FnMut() -> Option<TimestampOffset> + Send,
    mut current_filter: impl FnMut() -> Vec<rep_filter::FilterCriteria> + Send,
    out: mpsc::Sender<StreamOut>,
) {
    let mut backoff = Backoff::new(config.backoff);
    loop {
        match connect_and_pump(&config, &mut current_offset, &mut current_filter, &out).await {
            Ok(()) => {
                info!(stream_id = %config.stream_id, "producer closed the stream cleanly");
                backoff.reset();
            }
            Err(err) => {
                warn!(stream_id = %config.stream_id, error = %err, "replication stream disconnected, reconnecting");
            }
        }
        if out.is_closed() {
            return;
        }
        tokio::time::sleep(backoff.next_delay()).await;
    }
}

#[derive(Debug, thiserror::Error)]
pub enum SourceProviderError {
    #[error("connect failed: {0}")]
    Connect(String),
    #[error("websocket error: {0}")]
    Ws(String),
    #[error("protocol error: {0}")]
    Protocol(String),
}

async fn connect_and_pump(
    config: &ConsumerSourceConfig,
    current_offset: &mut impl FnMut() -> Option<TimestampOffset>,
    current_filter: &mut impl FnMut() -> Vec<rep_filter::FilterCriteria>,
    out: &mpsc::Sender<StreamOut>,
) -> Result<(), SourceProviderError> {
    let (ws, _response) = tokio_tungstenite::connect_async(&config.producer_url)
        .await
        .map_err(|e| SourceProviderError::Connect(e.to_string()))?;
    let (mut tx, mut rx) = ws.split();

    let init = StreamIn::Init(Init {
        stream_id: config.stream_id.clone(),
        slice_min: config.slice_min,
        slice_max: config.slice_max,
        offset: current_offset(),
        filter: current_filter(),
    });
    send(&mut tx, &init).await?;

    while let Some(msg) = rx.next().await {
        let msg = msg.map_err(|e| SourceProviderError::Ws(e.to_string()))?;
        match msg {
            Message::Text(text) => {
                let parsed: StreamOut = serde_json::from_str(&text)
                    .map_err(|e| SourceProviderError::Protocol(format!("invalid StreamOut: {e}")))?;
                if out.send(parsed).await.is_err() {
                    return Ok(());
                }
            }
            Message::Close(_) => return Ok(()),
            Message::Ping(data) => {
                let _ = tx.send(Message::Pong(data)).await;
            }
            _ => {}
        }
    }
    Ok(())
}

async fn send<S>(tx: &mut S, msg: &StreamIn) -> Result<(), SourceProviderError>
where
    S: futures_util::Sink<Message> + Unpin,
    S::Error: std::fmt::Display,
{
    let json = serde_json::to_string(msg).expect("StreamIn always serializes");
    tx.send(Message::Text(json.into())).await.map_err(|e| SourceProviderError::Ws(e.to_string()))
}
