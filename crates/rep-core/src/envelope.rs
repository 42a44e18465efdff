//! The [`EventEnvelope`]: one journaled event plus its addressing and
//! tagging metadata, per spec.md §3.

use crate::offset::TimestampOffset;
use crate::payload::Payload;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub persistence_id: String,
    pub seq_nr: i64,
    pub slice: u16,
    pub offset: TimestampOffset,
    pub payload: Payload,
    pub tags: BTreeSet<String>,
    pub source: String,
    pub metadata: Option<Payload>,
    /// Set by the journal query when this envelope is a backtracking
    /// redelivery issued for repair rather than a forward-moving event.
    /// See spec.md §4.2 emission rule, step 4, and §9 open questions.
    pub is_backtrack: bool,
}

impl EventEnvelope {
    /// The timestamp this envelope was produced at, per its offset.
    pub fn timestamp(&self) -> i64 {
        self.offset.timestamp
    }
}
