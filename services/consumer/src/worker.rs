//! Adapts [`rep_consumer::ProjectionRuntime`] to [`rep_daemon::Worker`]:
//! one runtime instance per slice range the supervisor assigns us.

use rep_consumer::{
    BackoffConfig, ConsumerSourceConfig, EnvelopeHandler, InMemoryOffsetStore, OffsetStore, OffsetStoreError,
    ProjectionRuntime, RuntimeMode, SqliteOffsetStore, TransactionalHandler,
};
use rep_core::{ProjectionId, SliceRange, StreamId, TimestampOffset};
use std::sync::Arc;
use tokio::sync::watch;

/// Either backing store this binary can be configured with, unified
/// behind one concrete type. The SQLite variant holds its own `Arc` so
/// `ExactlyOnce` mode can hand the very same connection to
/// [`ProjectionRuntime::new_exactly_once`] that this enum uses for the
/// at-least-once path — both need to see the same durable state.
pub enum AnyOffsetStore {
    Sqlite(Arc<SqliteOffsetStore>),
    InMemory(InMemoryOffsetStore),
}

#[async_trait::async_trait]
impl OffsetStore for AnyOffsetStore {
    async fn load(&self, projection: &ProjectionId) -> Result<Option<TimestampOffset>, OffsetStoreError> {
        match self {
            AnyOffsetStore::Sqlite(store) => store.load(projection).await,
            AnyOffsetStore::InMemory(store) => store.load(projection).await,
        }
    }

    async fn save(&self, projection: &ProjectionId, offset: &TimestampOffset) -> Result<(), OffsetStoreError> {
        match self {
            AnyOffsetStore::Sqlite(store) => store.save(projection, offset).await,
            AnyOffsetStore::InMemory(store) => store.save(projection, offset).await,
        }
    }
}

pub struct ConsumerWorker {
    pub projection_name: String,
    pub stream_id: String,
    pub producer_url: String,
    pub backoff: BackoffConfig,
    pub store: Arc<AnyOffsetStore>,
    pub handler: Arc<dyn EnvelopeHandler>,
    /// Used only in `ExactlyOnce` mode, where the handler's effect must
    /// run inside the offset store's own SQLite transaction.
    pub transactional_handler: Arc<dyn TransactionalHandler>,
    pub commit_group_size: usize,
    pub exactly_once: bool,
}

#[async_trait::async_trait]
impl rep_daemon::Worker for ConsumerWorker {
    async fn run(&self, range: SliceRange, shutdown: watch::Receiver<bool>) {
        let stream_id = StreamId::from(self.stream_id.as_str());
        let projection = ProjectionId::derive(self.projection_name.clone(), &stream_id, range.min, range.max);
        let source = ConsumerSourceConfig {
            producer_url: self.producer_url.clone(),
            stream_id: self.stream_id.clone(),
            slice_min: range.min,
            slice_max: range.max,
            backoff: self.backoff,
        };

        let result = if self.exactly_once {
            match self.store.as_ref() {
                AnyOffsetStore::Sqlite(store) => {
                    let runtime = ProjectionRuntime::new_exactly_once(
                        projection.clone(),
                        store.clone(),
                        self.transactional_handler.clone(),
                        source,
                    );
                    runtime.run(shutdown).await
                }
                AnyOffsetStore::InMemory(_) => {
                    tracing::error!(
                        projection = %projection,
                        "exactly_once mode requires a durable offset_store_path; worker exiting without starting"
                    );
                    return;
                }
            }
        } else {
            let mode =
                RuntimeMode::AtLeastOnceAsync { handler: self.handler.clone(), commit_group_size: self.commit_group_size };
            let runtime = ProjectionRuntime::new(projection.clone(), self.store.clone(), mode, source);
            runtime.run(shutdown).await
        };

        if let Err(err) = result {
            tracing::error!(projection = %projection, error = %err, "projection runtime exited with an error");
        }
    }
}
