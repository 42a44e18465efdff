//! The `eventTimestamp`/`loadEvent` auxiliary RPCs (spec.md §4.2, §6).
//!
//! These serve consumer-side catch-up of specific entities without
//! re-scanning slices. Exposed as plain JSON POST endpoints, following
//! the teacher's `http::streams::list_streams`/`patch_stream` shape
//! (`services/server/src/http/streams.rs`): a `State<ProducerState<J>>`
//! extractor, a `Json` request body, and a `(StatusCode, Json<_>)`
//! response rather than a raw bidirectional stream.

use crate::ws::ProducerState;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use rep_core::{JournalQuery, LoadedEvent, SourceError};
use rep_protocol::{
    EventTimestampRequest, EventTimestampResponse, LoadEventRequest, LoadEventResponse,
};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ErrorBody {
    error: String,
}

fn status_for(err: &SourceError) -> StatusCode {
    match err {
        SourceError::UnknownEvent { .. } => StatusCode::NOT_FOUND,
        SourceError::Cancelled => StatusCode::SERVICE_UNAVAILABLE,
        SourceError::Unavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

pub async fn event_timestamp<J>(
    State(state): State<ProducerState<J>>,
    Json(req): Json<EventTimestampRequest>,
) -> impl IntoResponse
where
    J: JournalQuery + 'static,
{
    match state
        .journal
        .event_timestamp(&req.stream_id, &req.persistence_id, req.seq_nr)
        .await
    {
        Ok(timestamp) => (StatusCode::OK, Json(EventTimestampResponse { timestamp })).into_response(),
        Err(err) => (status_for(&err), Json(ErrorBody { error: err.to_string() })).into_response(),
    }
}

pub async fn load_event<J>(
    State(state): State<ProducerState<J>>,
    Json(req): Json<LoadEventRequest>,
) -> impl IntoResponse
where
    J: JournalQuery + 'static,
{
    match state
        .journal
        .load_event(&req.stream_id, &req.persistence_id, req.seq_nr)
        .await
    {
        Ok(LoadedEvent::Event(env)) => {
            let response = LoadEventResponse::Event(rep_protocol::Event {
                persistence_id: env.persistence_id,
                seq_nr: env.seq_nr,
                slice: env.slice,
                offset: env.offset,
                payload: env.payload,
                source: env.source,
                metadata: env.metadata,
                tags: env.tags.into_iter().collect(),
            });
            (StatusCode::OK, Json(response)).into_response()
        }
        Ok(LoadedEvent::Filtered { persistence_id, seq_nr, slice, offset, source }) => {
            let response = LoadEventResponse::FilteredEvent(rep_protocol::FilteredEvent {
                persistence_id,
                seq_nr,
                slice,
                offset,
                source,
            });
            (StatusCode::OK, Json(response)).into_response()
        }
        Err(err) => (status_for(&err), Json(ErrorBody { error: err.to_string() })).into_response(),
    }
}
