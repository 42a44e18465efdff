// rep-protocol: replication stream wire types and serialization.
//
// All stream messages use a top-level `kind` field for discriminated
// deserialization, matching the frozen message schema in spec.md §6.

use rep_core::{Payload, TimestampOffset};
use rep_filter::FilterCriteria;
use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Shared sub-types
// ---------------------------------------------------------------------------

/// One entry in a `Replay` request: replay `persistence_id` from
/// `from_seq_nr` inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplayTarget {
    pub persistence_id: String,
    pub from_seq_nr: i64,
}

// ---------------------------------------------------------------------------
// Client -> Server messages (`StreamIn`, spec.md §6)
// ---------------------------------------------------------------------------

/// First message on a new stream. Any other first message is a protocol
/// error (spec.md §4.2, `AwaitInit`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Init {
    pub stream_id: String,
    pub slice_min: u16,
    pub slice_max: u16,
    /// Absent offset means "from beginning" (spec.md §6).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub offset: Option<TimestampOffset>,
    #[serde(default)]
    pub filter: Vec<FilterCriteria>,
}

/// Incrementally mutates the active consumer filter set for this stream.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filter {
    pub criteria: Vec<FilterCriteria>,
}

/// Requests replay of the listed entities from `from_seq_nr` inclusive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Replay {
    pub pid_offsets: Vec<ReplayTarget>,
}

/// All client-to-server message kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
#[serde(rename_all = "snake_case")]
pub enum StreamIn {
    Init(Init),
    Filter(Filter),
    Replay(Replay),
}

// ---------------------------------------------------------------------------
// Server -> Client messages (`StreamOut`, spec.md §6)
// ---------------------------------------------------------------------------

/// A fully delivered event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Event {
    pub persistence_id: String,
    pub seq_nr: i64,
    pub slice: u16,
    pub offset: TimestampOffset,
    pub payload: Payload,
    pub source: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metadata: Option<Payload>,
    #[serde(default)]
    pub tags: Vec<String>,
}

/// A placeholder preserving `(persistence_id, seq_nr)` continuity for an
/// envelope suppressed by the dynamic consumer filter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilteredEvent {
    pub persistence_id: String,
    pub seq_nr: i64,
    pub slice: u16,
    pub offset: TimestampOffset,
    pub source: String,
}

/// All server-to-client message kinds.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
#[serde(rename_all = "snake_case")]
pub enum StreamOut {
    Event(Event),
    FilteredEvent(FilteredEvent),
}

// ---------------------------------------------------------------------------
// Auxiliary RPCs (spec.md §4.2, §6)
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTimestampRequest {
    pub stream_id: String,
    pub persistence_id: String,
    pub seq_nr: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventTimestampResponse {
    pub timestamp: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoadEventRequest {
    pub stream_id: String,
    pub persistence_id: String,
    pub seq_nr: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
#[serde(rename_all = "snake_case")]
pub enum LoadEventResponse {
    Event(Event),
    FilteredEvent(FilteredEvent),
}
