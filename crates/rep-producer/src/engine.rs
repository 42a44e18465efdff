//! The producer stream engine: one instance drives one replication
//! stream end to end, from `Init` to teardown. See spec.md §4.2.
//!
//! The engine itself only depends on `Stream<Item = StreamIn>` and
//! `Sink<StreamOut>` — the same shape as the teacher's
//! `handle_forwarder_socket` loop, generalized so a non-WebSocket
//! transport could drive it without touching this module (the WebSocket
//! binding lives in [`crate::ws`]).

use crate::emission;
use crate::replay::load_replay_events;
use futures::{Sink, SinkExt, Stream, StreamExt};
use rep_core::{JournalQuery, LoadedEvent, PayloadRegistry, UnknownPayloadType};
use rep_filter::{FilterSet, ProducerFilter, RegexCache};
use rep_protocol::{Filter, Init, Replay, StreamIn, StreamOut};
use std::sync::Arc;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("protocol error: {0}")]
    Protocol(String),
    #[error("journal source failed: {0}")]
    Source(String),
    #[error("failed to send on transport: {0}")]
    Transport(String),
    #[error(transparent)]
    UnregisteredPayload(#[from] UnknownPayloadType),
}

/// Drives one replication stream. Returns once the stream closes
/// cleanly (peer disconnect) or an error forces teardown (spec.md §4.2
/// `Closing`). `payload_registry` of `None` means this producer enforces
/// no `type_url` allow-list (spec.md §9 "Serialization fallback").
pub async fn drive<J, In, Out>(
    journal: Arc<J>,
    producer_filter: ProducerFilter,
    payload_registry: Option<Arc<dyn PayloadRegistry>>,
    mut incoming: In,
    mut outgoing: Out,
) -> Result<(), EngineError>
where
    J: JournalQuery + 'static,
    In: Stream<Item = StreamIn> + Unpin + Send,
    Out: Sink<StreamOut> + Unpin + Send,
    Out::Error: std::fmt::Display,
{
    let Init { stream_id, slice_min, slice_max, offset, filter } = match incoming.next().await {
        Some(StreamIn::Init(init)) => init,
        Some(_) => return Err(EngineError::Protocol("expected Init as the first message".into())),
        None => {
            tracing::warn!("stream closed before Init; nothing to serve");
            return Ok(());
        }
    };
    // The producer resolves `entity_type` from `stream_id` via its own
    // configuration (spec.md §4.2); this core takes `stream_id` itself as
    // the entity type name, leaving real name resolution to the caller's
    // config layer (see `services/producer`).
    let entity_type = stream_id;

    let mut consumer_filter = FilterSet::new();
    consumer_filter.apply_batch(filter);
    let mut regex_cache = RegexCache::new();

    let source = journal.events_by_slices(&entity_type, slice_min, slice_max, offset);
    tokio::pin!(source);

    let (replay_tx, mut replay_rx) = tokio::sync::mpsc::unbounded_channel::<LoadedEvent>();

    loop {
        tokio::select! {
            biased;

            control = incoming.next() => {
                match control {
                    Some(StreamIn::Filter(Filter { criteria })) => {
                        consumer_filter.apply_batch(criteria);
                    }
                    Some(StreamIn::Replay(Replay { pid_offsets })) => {
                        for target in pid_offsets {
                            let journal = journal.clone();
                            let entity_type = entity_type.clone();
                            let replay_tx = replay_tx.clone();
                            tokio::spawn(async move {
                                for loaded in load_replay_events(journal.as_ref(), &entity_type, &target).await {
                                    if replay_tx.send(loaded).is_err() {
                                        break;
                                    }
                                }
                            });
                        }
                    }
                    Some(StreamIn::Init(_)) => {
                        tracing::warn!(stream_id = %entity_type, "ignoring duplicate Init on an open stream");
                    }
                    None => break,
                }
            }

            replayed = replay_rx.recv() => {
                if let Some(LoadedEvent::Event(env)) = replayed {
                    let registry = payload_registry.as_deref();
                    if let Some(out) = emission::emit(&producer_filter, &consumer_filter, &mut regex_cache, registry, &env)? {
                        outgoing.send(out).await.map_err(|e| EngineError::Transport(e.to_string()))?;
                    }
                }
                // `LoadedEvent::Filtered` carries no payload to re-deliver;
                // the consumer already holds a placeholder for it.
            }

            next = source.next() => {
                match next {
                    Some(Ok(env)) => {
                        let registry = payload_registry.as_deref();
                        if let Some(out) = emission::emit(&producer_filter, &consumer_filter, &mut regex_cache, registry, &env)? {
                            outgoing.send(out).await.map_err(|e| EngineError::Transport(e.to_string()))?;
                        }
                    }
                    Some(Err(err)) => {
                        tracing::error!(stream_id = %entity_type, error = %err, "journal source failed, closing stream");
                        return Err(EngineError::Source(err.to_string()));
                    }
                    None => break,
                }
            }
        }
    }
    Ok(())
}
