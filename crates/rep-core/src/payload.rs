//! Opaque application payloads.
//!
//! The replication engine never deserializes payload bytes — it carries
//! `(type_url, bytes)` verbatim, per spec.md §4.2 and DESIGN NOTES. The
//! `type_url` follows the `Any` convention: `"type.googleapis.com/<fqn>"`.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Payload {
    pub type_url: String,
    pub bytes: Vec<u8>,
}

impl Payload {
    pub fn new(type_url: impl Into<String>, bytes: Vec<u8>) -> Self {
        Payload { type_url: type_url.into(), bytes }
    }
}

/// Resolves whether a `type_url` is one the application has registered.
///
/// Open question resolution (spec.md §9 "Serialization fallback"): the
/// reference implementation's catch-all `AnyRef` serializer is explicitly
/// called out as not final. This engine requires explicit registration at
/// the producer boundary and fails fast (see [`PayloadRegistry::require`])
/// rather than silently accepting unknown payload shapes.
pub trait PayloadRegistry: Send + Sync {
    fn is_registered(&self, type_url: &str) -> bool;

    fn require(&self, type_url: &str) -> Result<(), UnknownPayloadType> {
        if self.is_registered(type_url) {
            Ok(())
        } else {
            Err(UnknownPayloadType(type_url.to_owned()))
        }
    }
}

#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
#[error("unregistered payload type_url: {0}")]
pub struct UnknownPayloadType(pub String);

/// A registry backed by a fixed allow-list, for tests and simple deployments.
#[derive(Debug, Clone, Default)]
pub struct StaticPayloadRegistry {
    allowed: std::collections::HashSet<String>,
}

impl StaticPayloadRegistry {
    pub fn new(allowed: impl IntoIterator<Item = impl Into<String>>) -> Self {
        StaticPayloadRegistry { allowed: allowed.into_iter().map(Into::into).collect() }
    }
}

impl PayloadRegistry for StaticPayloadRegistry {
    fn is_registered(&self, type_url: &str) -> bool {
        self.allowed.contains(type_url)
    }
}
