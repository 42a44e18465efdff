//! The default projection handler: logs each delivered event.
//!
//! A real deployment supplies its own [`rep_consumer::EnvelopeHandler`]
//! (writing to a search index, a read-model table, etc.) — this one
//! exists so the service is runnable standalone, the way the teacher's
//! `rt-ui-log` gives every binary a working logger with no further
//! wiring required.

use rep_consumer::HandlerError;
use rep_protocol::Event;

pub struct LoggingHandler;

#[async_trait::async_trait]
impl rep_consumer::EnvelopeHandler for LoggingHandler {
    async fn handle(&self, event: &Event) -> Result<(), HandlerError> {
        tracing::info!(
            persistence_id = %event.persistence_id,
            seq_nr = event.seq_nr,
            slice = event.slice,
            "projected event"
        );
        Ok(())
    }
}

impl rep_consumer::TransactionalHandler for LoggingHandler {
    fn handle(&self, _tx: &rusqlite::Transaction<'_>, event: &Event) -> Result<(), HandlerError> {
        tracing::info!(
            persistence_id = %event.persistence_id,
            seq_nr = event.seq_nr,
            slice = event.slice,
            "projected event (exactly-once transaction)"
        );
        Ok(())
    }
}
