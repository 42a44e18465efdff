//! Reconnect/resume coverage for the durable offset store against the
//! public crate API, in the style of the teacher's
//! `services/forwarder/tests/replay_resume.rs`: a real on-disk SQLite
//! file via `tempfile`, reopened to stand in for a process restart.

use rep_consumer::{HandlerError, OffsetStore, SqliteOffsetStore};
use rep_core::{ProjectionId, TimestampOffset};

fn projection() -> ProjectionId {
    ProjectionId { name: "widget-projection".to_owned(), key: "widgets-0-1023".to_owned() }
}

#[tokio::test]
async fn a_restarted_worker_resumes_from_the_last_durably_committed_offset() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_path_buf();

    {
        let store = SqliteOffsetStore::open(&path).unwrap();
        assert!(store.load(&projection()).await.unwrap().is_none());

        let mut offset = TimestampOffset::new(10);
        offset.advance("widget|a", 10, 1);
        store.save(&projection(), &offset).await.unwrap();

        let mut offset = TimestampOffset::new(20);
        offset.advance("widget|a", 20, 2);
        store.save(&projection(), &offset).await.unwrap();
        // The store (and its connection) is dropped here, simulating the
        // process exiting uncleanly between commits.
    }

    // Reopening at the same path stands in for the worker restarting.
    let restarted = SqliteOffsetStore::open(&path).unwrap();
    let resumed = restarted.load(&projection()).await.unwrap().unwrap();
    assert_eq!(resumed.timestamp, 20);
    assert_eq!(resumed.seen.get("widget|a"), Some(&2));
}

#[tokio::test]
async fn exactly_once_commit_surviving_a_restart_leaves_no_partial_state() {
    let file = tempfile::NamedTempFile::new().unwrap();
    let path = file.path().to_path_buf();

    {
        let store = SqliteOffsetStore::open(&path).unwrap();

        let mut offset = TimestampOffset::new(5);
        offset.advance("widget|a", 5, 1);
        store.commit_with_effect(&projection(), &offset, |_tx| Ok(())).await.unwrap();

        // A second commit whose handler fails must roll back entirely —
        // the offset must not advance past the first successful commit.
        let mut failing_offset = offset.clone();
        failing_offset.advance("widget|a", 6, 2);
        let err = store
            .commit_with_effect(&projection(), &failing_offset, |_tx| {
                Err(HandlerError("handler blew up".to_owned()))
            })
            .await;
        assert!(err.is_err());
    }

    let restarted = SqliteOffsetStore::open(&path).unwrap();
    let resumed = restarted.load(&projection()).await.unwrap().unwrap();
    // Only the first, successful commit is visible after restart.
    assert_eq!(resumed.timestamp, 5);
    assert_eq!(resumed.seen.get("widget|a"), Some(&1));
}
