//! The projection runtime, offset store, and consumer-side stream
//! client. See spec.md §4.4 and §4.5.

pub mod backoff;
pub mod offset_store;
pub mod runtime;
pub mod source_provider;

pub use backoff::{Backoff, BackoffConfig};
pub use offset_store::{ExactlyOnceCommitError, InMemoryOffsetStore, OffsetStore, OffsetStoreError, SqliteOffsetStore};
pub use runtime::{
    BatchHandler, EnvelopeHandler, HandlerError, ProjectionRuntime, RuntimeError, RuntimeMode, TransactionalHandler,
};
pub use source_provider::{ConsumerSourceConfig, MAX_ENVELOPES_AHEAD_OF_DEMAND};
