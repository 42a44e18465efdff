//! WebSocket binding for [`crate::engine::drive`].
//!
//! Grounded in the teacher's `ws_forwarder_handler`/`handle_forwarder_socket`
//! (`services/server/src/ws_forwarder.rs`): one axum WS upgrade per
//! connection, JSON-over-text frames tagged by a `kind` field. Unlike the
//! teacher, protocol decode/encode is isolated to this module so
//! [`crate::engine::drive`] stays transport-agnostic.

use crate::engine::{self, EngineError};
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::State;
use axum::response::IntoResponse;
use futures::{SinkExt, StreamExt};
use rep_core::{JournalQuery, PayloadRegistry};
use rep_filter::ProducerFilter;
use rep_protocol::{StreamIn, StreamOut};
use std::sync::Arc;

pub struct ProducerState<J> {
    pub journal: Arc<J>,
    pub producer_filter: ProducerFilter,
    /// `None` means this producer enforces no `type_url` allow-list.
    pub payload_registry: Option<Arc<dyn PayloadRegistry>>,
}

impl<J> Clone for ProducerState<J> {
    fn clone(&self) -> Self {
        ProducerState {
            journal: self.journal.clone(),
            producer_filter: self.producer_filter.clone(),
            payload_registry: self.payload_registry.clone(),
        }
    }
}

pub async fn handler<J>(ws: WebSocketUpgrade, State(state): State<ProducerState<J>>) -> impl IntoResponse
where
    J: JournalQuery + 'static,
{
    ws.on_upgrade(move |socket| handle_socket(socket, state))
}

async fn handle_socket<J>(socket: WebSocket, state: ProducerState<J>)
where
    J: JournalQuery + 'static,
{
    let (ws_tx, ws_rx) = socket.split();

    let incoming = ws_rx.filter_map(|msg| async move {
        match msg {
            Ok(Message::Text(text)) => match serde_json::from_str::<StreamIn>(&text) {
                Ok(parsed) => Some(parsed),
                Err(err) => {
                    tracing::warn!(error = %err, "dropping malformed StreamIn frame");
                    None
                }
            },
            Ok(_) => None,
            Err(err) => {
                tracing::warn!(error = %err, "websocket read error");
                None
            }
        }
    });

    let outgoing = ws_tx.with(|out: StreamOut| async move {
        let text = serde_json::to_string(&out).map_err(axum::Error::new)?;
        Ok::<_, axum::Error>(Message::Text(text.into()))
    });

    match engine::drive(state.journal, state.producer_filter, state.payload_registry, incoming, outgoing).await {
        Ok(()) => tracing::info!("replication stream closed"),
        Err(EngineError::Protocol(msg)) => tracing::warn!(reason = %msg, "replication stream rejected"),
        Err(err) => tracing::error!(error = %err, "replication stream terminated"),
    }
}
