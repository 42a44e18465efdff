//! Replay support for the producer stream engine.
//!
//! spec.md §9 notes replay was "not handled yet" in the reference
//! replication service and leaves its implementation to this
//! specification's normative semantics (§4.2, §4.4). `JournalQuery` only
//! exposes point lookups (`load_event`) and slice scans, not a ranged
//! per-entity scan, so replay here walks `seq_nr` forward one call at a
//! time starting from the requested floor until the journal reports
//! `UnknownEvent`, mirroring how the teacher's `ReplayEngine` walks
//! `unacked_events_across_epochs` until it runs out of rows
//! (`services/forwarder/src/replay.rs`).

use rep_core::{JournalQuery, LoadedEvent, SourceError};
use rep_protocol::ReplayTarget;

/// Loads every event for `target.persistence_id` from `target.from_seq_nr`
/// inclusive, in `seq_nr` order, stopping at the first gap.
pub async fn load_replay_events<J: JournalQuery + ?Sized>(
    journal: &J,
    entity_type: &str,
    target: &ReplayTarget,
) -> Vec<LoadedEvent> {
    let mut seq_nr = target.from_seq_nr;
    let mut out = Vec::new();
    loop {
        match journal.load_event(entity_type, &target.persistence_id, seq_nr).await {
            Ok(loaded) => {
                out.push(loaded);
                seq_nr += 1;
            }
            Err(SourceError::UnknownEvent { .. }) => break,
            Err(err) => {
                tracing::warn!(persistence_id = %target.persistence_id, seq_nr, error = %err, "replay lookup failed, stopping");
                break;
            }
        }
    }
    out
}
