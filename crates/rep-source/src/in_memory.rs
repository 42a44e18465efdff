//! `InMemoryJournal`: a reference `JournalQuery` implementation for tests.
//!
//! Storage itself is out of scope (spec.md §1); this stands in for the
//! teacher's SQLite `Journal` (see
//! `services/forwarder/src/storage/journal.rs`) without a schema, keeping
//! every appended envelope in a `Vec` guarded by a `tokio::sync::RwLock`
//! and waking tailing readers with a `tokio::sync::Notify`.
//!
//! Persistence ids are expected in `"<entity_type>|<id>"` form; the part
//! before the first `|` is the entity type used to filter
//! `events_by_slices`.

use crate::JournalQuery;
use futures::stream::{self, BoxStream};
use rep_core::{EventEnvelope, LoadedEvent, SourceError, TimestampOffset};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{Notify, RwLock};

fn entity_type_of(persistence_id: &str) -> &str {
    persistence_id.split('|').next().unwrap_or(persistence_id)
}

struct Stored {
    appended_at: Instant,
    envelope: EventEnvelope,
}

struct Inner {
    log: RwLock<Vec<Stored>>,
    notify: Notify,
}

/// A shared, appendable in-memory event log.
#[derive(Clone)]
pub struct InMemoryJournal {
    inner: Arc<Inner>,
    behind_current_time: Duration,
}

impl InMemoryJournal {
    pub fn new() -> Self {
        Self::with_behind_current_time(Duration::from_millis(500))
    }

    pub fn with_behind_current_time(behind_current_time: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                log: RwLock::new(Vec::new()),
                notify: Notify::new(),
            }),
            behind_current_time,
        }
    }

    /// Appends one envelope to the log, in caller-supplied order. Callers
    /// must keep `envelope.offset.timestamp` non-decreasing globally to
    /// satisfy the resumption contract in spec.md §4.1.
    pub async fn append(&self, envelope: EventEnvelope) {
        let mut log = self.inner.log.write().await;
        log.push(Stored { appended_at: Instant::now(), envelope });
        drop(log);
        self.inner.notify.notify_waiters();
    }
}

impl Default for InMemoryJournal {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl JournalQuery for InMemoryJournal {
    fn events_by_slices(
        &self,
        entity_type: &str,
        slice_min: u16,
        slice_max: u16,
        offset: Option<TimestampOffset>,
    ) -> BoxStream<'static, Result<EventEnvelope, SourceError>> {
        let inner = self.inner.clone();
        let behind_current_time = self.behind_current_time;
        let entity_type = entity_type.to_owned();

        let state = (inner, behind_current_time, entity_type, slice_min, slice_max, offset, 0usize);
        Box::pin(stream::unfold(state, |mut state| async move {
            let (inner, behind_current_time, entity_type, slice_min, slice_max, offset, mut next_index) = {
                let s = &mut state;
                (s.0.clone(), s.1, s.2.clone(), s.3, s.4, s.5.clone(), s.6)
            };
            loop {
                let ready_at = {
                    let log = inner.log.read().await;
                    if next_index >= log.len() {
                        None
                    } else {
                        let candidate = &log[next_index];
                        Some(candidate.appended_at + behind_current_time)
                    }
                };
                match ready_at {
                    None => {
                        // Caught up; wait for the next append (tailing phase).
                        inner.notify.notified().await;
                        continue;
                    }
                    Some(ready_at) => {
                        let now = Instant::now();
                        if now < ready_at {
                            tokio::time::sleep(ready_at - now).await;
                        }
                        let log = inner.log.read().await;
                        let Stored { envelope, .. } = &log[next_index];
                        let matches_entity = entity_type_of(&envelope.persistence_id) == entity_type;
                        let matches_slice = envelope.slice >= slice_min && envelope.slice <= slice_max;
                        let admitted = offset
                            .as_ref()
                            .map(|o| o.admits(&envelope.persistence_id, envelope.timestamp()))
                            .unwrap_or(true);
                        let emit = envelope.clone();
                        next_index += 1;
                        state.6 = next_index;
                        if matches_entity && matches_slice && admitted {
                            return Some((Ok(emit), state));
                        }
                        // Not for this caller; keep scanning without yielding.
                        continue;
                    }
                }
            }
        }))
    }

    async fn event_timestamp(
        &self,
        entity_type: &str,
        persistence_id: &str,
        seq_nr: i64,
    ) -> Result<i64, SourceError> {
        let log = self.inner.log.read().await;
        log.iter()
            .map(|s| &s.envelope)
            .find(|e| entity_type_of(&e.persistence_id) == entity_type && e.persistence_id == persistence_id && e.seq_nr == seq_nr)
            .map(|e| e.timestamp())
            .ok_or_else(|| SourceError::UnknownEvent {
                persistence_id: persistence_id.to_owned(),
                seq_nr,
            })
    }

    async fn load_event(
        &self,
        entity_type: &str,
        persistence_id: &str,
        seq_nr: i64,
    ) -> Result<LoadedEvent, SourceError> {
        let log = self.inner.log.read().await;
        let found = log
            .iter()
            .map(|s| &s.envelope)
            .find(|e| entity_type_of(&e.persistence_id) == entity_type && e.persistence_id == persistence_id && e.seq_nr == seq_nr)
            .ok_or_else(|| SourceError::UnknownEvent {
                persistence_id: persistence_id.to_owned(),
                seq_nr,
            })?;
        if found.is_backtrack {
            Ok(LoadedEvent::Filtered {
                persistence_id: persistence_id.to_owned(),
                seq_nr,
                slice: found.slice,
                offset: found.offset.clone(),
                source: found.source.clone(),
            })
        } else {
            Ok(LoadedEvent::Event(found.clone()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::StreamExt;
    use rep_core::Payload;

    fn env(pid: &str, seq_nr: i64, ts: i64) -> EventEnvelope {
        EventEnvelope {
            persistence_id: pid.to_owned(),
            seq_nr,
            slice: rep_core::slice_of(pid),
            offset: TimestampOffset::new(ts),
            payload: Payload::new("type.googleapis.com/demo.Widget", vec![]),
            tags: Default::default(),
            source: "test".to_owned(),
            metadata: None,
            is_backtrack: false,
        }
    }

    #[tokio::test]
    async fn catch_up_then_tail_delivers_in_append_order() {
        let journal = InMemoryJournal::with_behind_current_time(Duration::from_millis(1));
        journal.append(env("widget|a", 1, 1)).await;
        journal.append(env("widget|b", 1, 2)).await;

        let mut stream = journal.events_by_slices("widget", 0, 1023, None);
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.persistence_id, "widget|a");
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.persistence_id, "widget|b");

        journal.append(env("widget|c", 1, 3)).await;
        let third = stream.next().await.unwrap().unwrap();
        assert_eq!(third.persistence_id, "widget|c");
    }

    #[tokio::test]
    async fn offset_resumption_skips_already_seen() {
        let journal = InMemoryJournal::with_behind_current_time(Duration::from_millis(1));
        journal.append(env("widget|a", 1, 1)).await;
        journal.append(env("widget|b", 1, 1)).await;

        let mut offset = TimestampOffset::new(1);
        offset.advance("widget|a", 1, 1);

        let mut stream = journal.events_by_slices("widget", 0, 1023, Some(offset));
        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.persistence_id, "widget|b");
    }

    #[tokio::test]
    async fn event_timestamp_and_load_event_find_by_identity() {
        let journal = InMemoryJournal::new();
        journal.append(env("widget|a", 5, 42)).await;
        assert_eq!(journal.event_timestamp("widget", "widget|a", 5).await.unwrap(), 42);
        match journal.load_event("widget", "widget|a", 5).await.unwrap() {
            LoadedEvent::Event(e) => assert_eq!(e.seq_nr, 5),
            LoadedEvent::Filtered { .. } => panic!("expected Event"),
        }
    }

    #[tokio::test]
    async fn load_event_unknown_errors() {
        let journal = InMemoryJournal::new();
        let err = journal.load_event("widget", "widget|missing", 1).await.unwrap_err();
        assert!(matches!(err, SourceError::UnknownEvent { .. }));
    }
}
