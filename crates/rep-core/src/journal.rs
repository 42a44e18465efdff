//! The `JournalQuery` capability: the external interface this engine
//! consumes from the entity runtime's journal, per spec.md §4.1 and
//! DESIGN NOTES ("a language-neutral implementation exposes a
//! `JournalQuery` capability `{ eventsBySlices, eventTimestamp,
//! loadEvent }` as an interface, with one implementation per storage
//! backend").
//!
//! The journal storage and its SQL schema are explicitly out of scope
//! (spec.md §1); this crate only defines the trait boundary and an
//! in-memory reference implementation for tests, analogous to the
//! teacher's `Journal` (SQLite) but backed by a `BTreeMap` per entity.

use crate::envelope::EventEnvelope;
use crate::offset::TimestampOffset;
use futures::stream::BoxStream;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SourceError {
    #[error("journal unavailable: {0}")]
    Unavailable(String),
    #[error("unknown entity: persistence_id={persistence_id}, seq_nr={seq_nr}")]
    UnknownEvent { persistence_id: String, seq_nr: i64 },
    #[error("journal query was cancelled")]
    Cancelled,
}

/// One event as returned by `loadEvent`: either a full event or, if the
/// journal has since backtracked/redacted it, a filtered placeholder.
#[derive(Debug, Clone)]
pub enum LoadedEvent {
    Event(EventEnvelope),
    Filtered {
        persistence_id: String,
        seq_nr: i64,
        slice: u16,
        offset: TimestampOffset,
        source: String,
    },
}

/// The journal query capability consumed by the sliced event source.
///
/// Implementations MUST deliver events in the journal's total order for
/// the requested slice range, and MUST honor the resumption contract in
/// spec.md §4.1: given offset `O = (T, seen)`, the first envelope
/// delivered satisfies `env.timestamp > T` or
/// `(env.timestamp == T && env.persistence_id not in seen)`.
#[async_trait::async_trait]
pub trait JournalQuery: Send + Sync {
    /// Streams events for `entity_type` restricted to `[slice_min,
    /// slice_max]`, resuming from `offset` (`None` means "from the
    /// beginning"). The stream is finite only when the caller drops it;
    /// it transparently catches up to the tail and then follows live
    /// appends.
    fn events_by_slices(
        &self,
        entity_type: &str,
        slice_min: u16,
        slice_max: u16,
        offset: Option<TimestampOffset>,
    ) -> BoxStream<'static, Result<EventEnvelope, SourceError>>;

    /// Returns the journal timestamp of one specific event, for the
    /// producer's `EventTimestamp` auxiliary RPC (spec.md §4.2).
    async fn event_timestamp(
        &self,
        entity_type: &str,
        persistence_id: &str,
        seq_nr: i64,
    ) -> Result<i64, SourceError>;

    /// Loads one specific event without re-scanning slices, for the
    /// producer's `LoadEvent` auxiliary RPC (spec.md §4.2) and for replay.
    async fn load_event(
        &self,
        entity_type: &str,
        persistence_id: &str,
        seq_nr: i64,
    ) -> Result<LoadedEvent, SourceError>;
}
