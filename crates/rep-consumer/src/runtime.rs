//! The projection runtime: drives envelopes through a user handler and
//! advances the durable offset, per one of the three delivery modes in
//! spec.md §4.4.

use crate::offset_store::{ExactlyOnceCommitError, OffsetStore, OffsetStoreError, SqliteOffsetStore};
use crate::source_provider::{self, ConsumerSourceConfig, MAX_ENVELOPES_AHEAD_OF_DEMAND};
use rep_core::{ProjectionId, TimestampOffset};
use rep_filter::FilterCriteria;
use rep_protocol::{Event, StreamOut};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{mpsc, watch};
use tracing::{error, info};

#[derive(Debug, thiserror::Error)]
#[error("projection handler failed: {0}")]
pub struct HandlerError(pub String);

#[async_trait::async_trait]
pub trait EnvelopeHandler: Send + Sync {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError>;
}

#[async_trait::async_trait]
pub trait BatchHandler: Send + Sync {
    async fn handle_batch(&self, events: &[Event]) -> Result<(), HandlerError>;
}

/// A handler whose side effect can run inside the offset store's own
/// SQLite transaction (spec.md §4.4 `ExactlyOnce`). Synchronous and
/// non-blocking by contract: it must not await and should only perform
/// local writes against `tx`, since it runs between `BEGIN` and the
/// offset rows being written, holding the store's connection lock.
pub trait TransactionalHandler: Send + Sync {
    fn handle(&self, tx: &rusqlite::Transaction<'_>, event: &Event) -> Result<(), HandlerError>;
}

/// One of the three delivery-mode contracts from spec.md §4.4.
pub enum RuntimeMode {
    /// Offset commits are grouped in the background; the uncommitted tail
    /// may be re-delivered after a crash.
    AtLeastOnceAsync { handler: Arc<dyn EnvelopeHandler>, commit_group_size: usize },
    /// Handler and offset write commit in the same SQLite transaction, so
    /// a crash between them is impossible — requires the durable
    /// [`SqliteOffsetStore`], via [`ProjectionRuntime::new_exactly_once`].
    ExactlyOnce { store: Arc<SqliteOffsetStore>, handler: Arc<dyn TransactionalHandler> },
    /// Envelopes are batched; the handler sees the whole batch at once.
    AtLeastOnceGrouped { handler: Arc<dyn BatchHandler>, batch_size: usize },
}

#[derive(Debug, thiserror::Error)]
pub enum RuntimeError {
    #[error(transparent)]
    OffsetStore(#[from] OffsetStoreError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
    #[error(transparent)]
    ExactlyOnceCommit(#[from] ExactlyOnceCommitError),
}

/// Drives one projection: `start` loads the offset and resumes;
/// `run` processes envelopes until the shutdown signal fires, at which
/// point it completes the in-flight envelope, commits, and returns
/// (spec.md §4.4 "Lifecycle").
pub struct ProjectionRuntime<S: OffsetStore> {
    projection: ProjectionId,
    store: Arc<S>,
    mode: RuntimeMode,
    source: ConsumerSourceConfig,
}

impl<S: OffsetStore + 'static> ProjectionRuntime<S> {
    pub fn new(projection: ProjectionId, store: Arc<S>, mode: RuntimeMode, source: ConsumerSourceConfig) -> Self {
        ProjectionRuntime { projection, store, mode, source }
    }

    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> Result<(), RuntimeError> {
        let initial_offset = self.store.load(&self.projection).await?;
        let offset = Arc::new(StdMutex::new(initial_offset));
        let filter = Arc::new(StdMutex::new(Vec::<FilterCriteria>::new()));

        let (tx, mut rx) = mpsc::channel::<StreamOut>(MAX_ENVELOPES_AHEAD_OF_DEMAND);
        let provider_offset = offset.clone();
        let provider_filter = filter.clone();
        let provider_config = self.source.clone();
        let provider = tokio::spawn(async move {
            source_provider::run(
                provider_config,
                move || provider_offset.lock().unwrap().clone(),
                move || provider_filter.lock().unwrap().clone(),
                tx,
            )
            .await;
        });

        let mut batch: Vec<Event> = Vec::new();
        let mut since_commit = 0usize;
        let result = loop {
            tokio::select! {
                biased;

                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break self.flush(&offset, &mut batch).await;
                    }
                }

                received = rx.recv() => {
                    let Some(message) = received else { break Ok(()) };
                    if let Err(err) = self.handle_message(message, &offset, &mut batch, &mut since_commit).await {
                        error!(projection = %self.projection, error = %err, "projection handler failed, restarting");
                        break Err(err);
                    }
                }
            }
        };

        provider.abort();
        result
    }

    async fn handle_message(
        &self,
        message: StreamOut,
        offset: &Arc<StdMutex<Option<TimestampOffset>>>,
        batch: &mut Vec<Event>,
        since_commit: &mut usize,
    ) -> Result<(), RuntimeError> {
        match message {
            StreamOut::Event(event) => {
                match &self.mode {
                    RuntimeMode::AtLeastOnceAsync { handler, commit_group_size } => {
                        handler.handle(&event).await?;
                        advance(offset, &event.persistence_id, event.offset.timestamp, event.seq_nr);
                        *since_commit += 1;
                        if *since_commit >= *commit_group_size {
                            self.commit(offset).await?;
                            *since_commit = 0;
                        }
                    }
                    RuntimeMode::ExactlyOnce { store, handler } => {
                        let next = advanced(offset, &event.persistence_id, event.offset.timestamp, event.seq_nr);
                        let handler = handler.clone();
                        store
                            .commit_with_effect(&self.projection, &next, move |tx| handler.handle(tx, &event))
                            .await?;
                        *offset.lock().unwrap() = Some(next);
                    }
                    RuntimeMode::AtLeastOnceGrouped { handler, batch_size } => {
                        advance(offset, &event.persistence_id, event.offset.timestamp, event.seq_nr);
                        batch.push(event);
                        if batch.len() >= *batch_size {
                            handler.handle_batch(batch).await?;
                            self.commit(offset).await?;
                            batch.clear();
                        }
                    }
                }
            }
            StreamOut::FilteredEvent(placeholder) => {
                // No handler invocation: the placeholder exists purely so
                // the offset can advance without a seq_nr hole (spec.md §4.2).
                advance(offset, &placeholder.persistence_id, placeholder.offset.timestamp, placeholder.seq_nr);
            }
        }
        Ok(())
    }

    async fn flush(
        &self,
        offset: &Arc<StdMutex<Option<TimestampOffset>>>,
        batch: &mut Vec<Event>,
    ) -> Result<(), RuntimeError> {
        if let RuntimeMode::AtLeastOnceGrouped { handler, .. } = &self.mode {
            if !batch.is_empty() {
                handler.handle_batch(batch).await?;
                batch.clear();
            }
        }
        self.commit(offset).await?;
        info!(projection = %self.projection, "projection stopped cleanly");
        Ok(())
    }

    async fn commit(&self, offset: &Arc<StdMutex<Option<TimestampOffset>>>) -> Result<(), RuntimeError> {
        let snapshot = offset.lock().unwrap().clone();
        if let Some(snapshot) = snapshot {
            self.store.save(&self.projection, &snapshot).await?;
        }
        Ok(())
    }
}

fn advance(offset: &Arc<StdMutex<Option<TimestampOffset>>>, persistence_id: &str, timestamp: i64, seq_nr: i64) {
    let mut guard = offset.lock().unwrap();
    let entry = guard.get_or_insert_with(|| TimestampOffset::new(timestamp));
    entry.advance(persistence_id, timestamp, seq_nr);
}

/// Like `advance`, but returns the advanced offset instead of storing it —
/// `ExactlyOnce` must not publish the new offset until the transaction
/// that persists it has actually committed.
fn advanced(offset: &Arc<StdMutex<Option<TimestampOffset>>>, persistence_id: &str, timestamp: i64, seq_nr: i64) -> TimestampOffset {
    let mut next = offset.lock().unwrap().clone().unwrap_or_else(|| TimestampOffset::new(timestamp));
    next.advance(persistence_id, timestamp, seq_nr);
    next
}

impl ProjectionRuntime<SqliteOffsetStore> {
    /// Builds a runtime in `ExactlyOnce` mode. Takes the store by `Arc` so
    /// the same connection backs both the initial offset load and every
    /// transactional commit — constructing `RuntimeMode::ExactlyOnce`
    /// directly with a different store would defeat the guarantee.
    pub fn new_exactly_once(
        projection: ProjectionId,
        store: Arc<SqliteOffsetStore>,
        handler: Arc<dyn TransactionalHandler>,
        source: ConsumerSourceConfig,
    ) -> Self {
        let mode = RuntimeMode::ExactlyOnce { store: store.clone(), handler };
        ProjectionRuntime { projection, store, mode, source }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct CountingHandler(AtomicUsize);

    #[async_trait::async_trait]
    impl EnvelopeHandler for CountingHandler {
        async fn handle(&self, _event: &Event) -> Result<(), HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    impl TransactionalHandler for CountingHandler {
        fn handle(&self, _tx: &rusqlite::Transaction<'_>, _event: &Event) -> Result<(), HandlerError> {
            self.0.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }
    }

    struct FailingHandler;

    impl TransactionalHandler for FailingHandler {
        fn handle(&self, _tx: &rusqlite::Transaction<'_>, _event: &Event) -> Result<(), HandlerError> {
            Err(HandlerError("always fails".to_owned()))
        }
    }

    #[test]
    fn advance_seeds_offset_from_first_event() {
        let offset = Arc::new(StdMutex::new(None));
        advance(&offset, "widget|a", 5, 1);
        let snapshot = offset.lock().unwrap().clone().unwrap();
        assert_eq!(snapshot.timestamp, 5);
        assert_eq!(snapshot.seen.get("widget|a"), Some(&1));
    }

    fn source_config() -> ConsumerSourceConfig {
        ConsumerSourceConfig {
            producer_url: "ws://unused".into(),
            stream_id: "widget".into(),
            slice_min: 0,
            slice_max: 1023,
            backoff: Default::default(),
        }
    }

    fn event(seq_nr: i64, timestamp: i64) -> Event {
        Event {
            persistence_id: "widget|a".into(),
            seq_nr,
            slice: 3,
            offset: TimestampOffset::new(timestamp),
            payload: rep_core::Payload::new("type.googleapis.com/demo.Widget", vec![]),
            source: "test".into(),
            metadata: None,
            tags: vec![],
        }
    }

    #[tokio::test]
    async fn exactly_once_commits_handler_and_offset_in_one_transaction() {
        let store = Arc::new(crate::offset_store::SqliteOffsetStore::open_in_memory().unwrap());
        let handler = Arc::new(CountingHandler(AtomicUsize::new(0)));
        let projection = ProjectionId { name: "p".into(), key: "widgets-0-1023".into() };
        let offset = Arc::new(StdMutex::new(None));
        let runtime =
            ProjectionRuntime::new_exactly_once(projection.clone(), store.clone(), handler.clone(), source_config());
        let mut batch = Vec::new();
        let mut since_commit = 0;
        runtime
            .handle_message(StreamOut::Event(event(1, 1)), &offset, &mut batch, &mut since_commit)
            .await
            .unwrap();
        assert_eq!(handler.0.load(Ordering::SeqCst), 1);
        let committed = store.load(&projection).await.unwrap().unwrap();
        assert_eq!(committed.timestamp, 1);
    }

    #[tokio::test]
    async fn exactly_once_handler_failure_leaves_the_offset_uncommitted() {
        let store = Arc::new(crate::offset_store::SqliteOffsetStore::open_in_memory().unwrap());
        let projection = ProjectionId { name: "p".into(), key: "widgets-0-1023".into() };
        let offset = Arc::new(StdMutex::new(None));
        let runtime =
            ProjectionRuntime::new_exactly_once(projection.clone(), store.clone(), Arc::new(FailingHandler), source_config());
        let mut batch = Vec::new();
        let mut since_commit = 0;
        let err = runtime
            .handle_message(StreamOut::Event(event(1, 1)), &offset, &mut batch, &mut since_commit)
            .await
            .unwrap_err();
        assert!(matches!(err, RuntimeError::ExactlyOnceCommit(_)));
        assert!(store.load(&projection).await.unwrap().is_none());
    }
}
