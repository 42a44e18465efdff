//! Durable offsets: a timestamp plus the set of entity seq_nrs already
//! delivered at exactly that timestamp.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A durable cursor marking progress through a sliced event source.
///
/// `seen` only ever holds entries for entities whose last-delivered event
/// shares `timestamp` exactly; once the timestamp advances, `seen` is
/// cleared and re-seeded — see [`TimestampOffset::advance`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimestampOffset {
    pub timestamp: i64,
    pub seen: BTreeMap<String, i64>,
}

impl TimestampOffset {
    pub fn new(timestamp: i64) -> Self {
        TimestampOffset { timestamp, seen: BTreeMap::new() }
    }

    /// Resumption contract from spec.md §4.1: the next delivered envelope
    /// must satisfy `ts > timestamp`, or `ts == timestamp && pid not in seen`.
    pub fn admits(&self, persistence_id: &str, timestamp: i64) -> bool {
        match timestamp.cmp(&self.timestamp) {
            std::cmp::Ordering::Greater => true,
            std::cmp::Ordering::Equal => !self.seen.contains_key(persistence_id),
            std::cmp::Ordering::Less => false,
        }
    }

    /// Records that `persistence_id` was delivered at `timestamp` with
    /// `seq_nr`. Clears `seen` when the timestamp advances past the
    /// previous one, since `seen` is only ever valid for entities sharing
    /// the current `timestamp` exactly.
    pub fn advance(&mut self, persistence_id: &str, timestamp: i64, seq_nr: i64) {
        if timestamp > self.timestamp {
            self.timestamp = timestamp;
            self.seen.clear();
        }
        self.seen.insert(persistence_id.to_owned(), seq_nr);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admits_strictly_greater_timestamp() {
        let mut o = TimestampOffset::new(5);
        o.seen.insert("x".into(), 4);
        assert!(o.admits("x", 6));
        assert!(o.admits("y", 6));
    }

    #[test]
    fn rejects_same_timestamp_already_seen_pid() {
        let mut o = TimestampOffset::new(5);
        o.seen.insert("x".into(), 4);
        assert!(!o.admits("x", 5));
        assert!(o.admits("y", 5));
    }

    #[test]
    fn rejects_earlier_timestamp() {
        let o = TimestampOffset::new(5);
        assert!(!o.admits("anything", 4));
    }

    #[test]
    fn advance_clears_seen_on_new_timestamp() {
        let mut o = TimestampOffset::new(5);
        o.seen.insert("x".into(), 4);
        o.advance("y", 6, 9);
        assert_eq!(o.timestamp, 6);
        assert_eq!(o.seen.len(), 1);
        assert_eq!(o.seen.get("y"), Some(&9));
    }

    #[test]
    fn advance_accumulates_within_same_timestamp() {
        let mut o = TimestampOffset::new(5);
        o.advance("x", 5, 4);
        o.advance("y", 5, 9);
        assert_eq!(o.seen.len(), 2);
    }
}
