//! Identity newtypes.
//!
//! `spec.md` treats `stream_id` and `projection_key` as bare strings. We
//! wrap the wire-facing stream label in [`StreamId`] so the producer's
//! entity-type resolution and the consumer's derived `projection_key`
//! (spec.md §6, "Projection identity on the wire") can't be silently
//! swapped for one another at a call site — the same newtype discipline
//! the teacher applies to `StreamRef`/`StreamKey`.

use serde::{Deserialize, Serialize};
use std::fmt;

#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct StreamId(pub String);

impl fmt::Display for StreamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for StreamId {
    fn from(s: &str) -> Self {
        StreamId(s.to_owned())
    }
}

impl From<String> for StreamId {
    fn from(s: String) -> Self {
        StreamId(s)
    }
}

/// Globally unique identity of one consumer-side projection instance.
///
/// Two live projections sharing a `ProjectionId` corrupt each other's
/// offset row (spec.md §3); the sharded daemon supervisor (§4.6) is the
/// only thing that is allowed to construct one, by deriving `key`
/// deterministically from `(stream_id, slice_min, slice_max)`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ProjectionId {
    pub name: String,
    pub key: String,
}

impl ProjectionId {
    /// Derives `projection_key = stream_id + "-" + slice_min + "-" + slice_max`
    /// per spec.md §6.
    pub fn derive(name: impl Into<String>, stream_id: &StreamId, slice_min: u16, slice_max: u16) -> Self {
        ProjectionId {
            name: name.into(),
            key: format!("{}-{}-{}", stream_id.0, slice_min, slice_max),
        }
    }
}

impl fmt::Display for ProjectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.key)
    }
}
