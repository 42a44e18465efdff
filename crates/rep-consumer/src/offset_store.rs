//! Durable offset storage, keyed by `ProjectionId` (spec.md §4.4, §6
//! "Persisted offset layout").
//!
//! `SqliteOffsetStore` is grounded in the teacher's `Journal`
//! (`services/forwarder/src/storage/journal.rs`): same WAL +
//! `synchronous=FULL` + `PRAGMA integrity_check`-at-open durability
//! posture, same `tokio::sync::Mutex`-around-a-sync-`Connection` shape
//! used elsewhere in the teacher for SQLite access
//! (`services/forwarder/src/status_http.rs`'s `Arc<Mutex<Journal>>`).

use crate::runtime::HandlerError;
use rep_core::{ProjectionId, TimestampOffset};
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex as StdMutex;
use tokio::sync::Mutex;

#[derive(Debug, thiserror::Error)]
pub enum OffsetStoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("integrity check failed: {0}")]
    IntegrityCheckFailed(String),
}

/// Failure of [`SqliteOffsetStore::commit_with_effect`]: either side of
/// the transaction can fail, and either failure rolls the whole thing
/// back (spec.md §4.4's "one transaction on the offset store").
#[derive(Debug, thiserror::Error)]
pub enum ExactlyOnceCommitError {
    #[error(transparent)]
    Store(#[from] OffsetStoreError),
    #[error(transparent)]
    Handler(#[from] HandlerError),
}

/// Loads and durably saves the offset for one `(projection_name,
/// projection_key)` pair. Implementations MUST update the `timestamp`
/// row and its `seen` entries in one transaction (spec.md §6).
#[async_trait::async_trait]
pub trait OffsetStore: Send + Sync {
    async fn load(&self, projection: &ProjectionId) -> Result<Option<TimestampOffset>, OffsetStoreError>;
    async fn save(&self, projection: &ProjectionId, offset: &TimestampOffset) -> Result<(), OffsetStoreError>;
}

/// An in-memory store for tests and the `ExactlyOnce` in-process case.
#[derive(Default)]
pub struct InMemoryOffsetStore {
    rows: StdMutex<HashMap<(String, String), TimestampOffset>>,
}

impl InMemoryOffsetStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait::async_trait]
impl OffsetStore for InMemoryOffsetStore {
    async fn load(&self, projection: &ProjectionId) -> Result<Option<TimestampOffset>, OffsetStoreError> {
        let rows = self.rows.lock().unwrap();
        Ok(rows.get(&(projection.name.clone(), projection.key.clone())).cloned())
    }

    async fn save(&self, projection: &ProjectionId, offset: &TimestampOffset) -> Result<(), OffsetStoreError> {
        let mut rows = self.rows.lock().unwrap();
        rows.insert((projection.name.clone(), projection.key.clone()), offset.clone());
        Ok(())
    }
}

/// A durable SQLite-backed offset store, one `Connection` shared across
/// projections on this worker.
pub struct SqliteOffsetStore {
    conn: Mutex<rusqlite::Connection>,
}

impl SqliteOffsetStore {
    pub fn open(path: &Path) -> Result<Self, OffsetStoreError> {
        let conn = rusqlite::Connection::open(path)?;
        apply_pragmas(&conn)?;
        run_integrity_check(&conn)?;
        apply_schema(&conn)?;
        Ok(SqliteOffsetStore { conn: Mutex::new(conn) })
    }

    pub fn open_in_memory() -> Result<Self, OffsetStoreError> {
        let conn = rusqlite::Connection::open_in_memory()?;
        apply_schema(&conn)?;
        Ok(SqliteOffsetStore { conn: Mutex::new(conn) })
    }
}

#[async_trait::async_trait]
impl OffsetStore for SqliteOffsetStore {
    async fn load(&self, projection: &ProjectionId) -> Result<Option<TimestampOffset>, OffsetStoreError> {
        let conn = self.conn.lock().await;
        let timestamp: Option<i64> = conn
            .query_row(
                "SELECT timestamp FROM projection_offset WHERE projection_name = ?1 AND projection_key = ?2",
                rusqlite::params![projection.name, projection.key],
                |row| row.get(0),
            )
            .map(Some)
            .or_else(|e| if e == rusqlite::Error::QueryReturnedNoRows { Ok(None) } else { Err(e) })?;

        let Some(timestamp) = timestamp else { return Ok(None) };

        let mut seen = BTreeMap::new();
        let mut stmt = conn.prepare(
            "SELECT persistence_id, seq_nr FROM projection_offset_seen
             WHERE projection_name = ?1 AND projection_key = ?2",
        )?;
        let rows = stmt.query_map(rusqlite::params![projection.name, projection.key], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, i64>(1)?))
        })?;
        for row in rows {
            let (pid, seq_nr) = row?;
            seen.insert(pid, seq_nr);
        }
        Ok(Some(TimestampOffset { timestamp, seen }))
    }

    async fn save(&self, projection: &ProjectionId, offset: &TimestampOffset) -> Result<(), OffsetStoreError> {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;
        write_offset_rows(&tx, projection, offset)?;
        tx.commit()?;
        Ok(())
    }
}

impl SqliteOffsetStore {
    /// Runs `effect` and the offset write in the same SQLite transaction,
    /// committing both together or neither (spec.md §4.4 `ExactlyOnce`:
    /// "Handler and offset write occur in one transaction on the offset
    /// store"). `effect` must not await — it runs synchronously against
    /// `tx` so there is no gap between the handler's side effect and the
    /// durable offset write for a crash to land in.
    ///
    /// This is an inherent method, not part of [`OffsetStore`], because
    /// the coupling only makes sense for a store that can hand out a real
    /// transaction; `InMemoryOffsetStore` has no equivalent.
    pub async fn commit_with_effect<F>(
        &self,
        projection: &ProjectionId,
        offset: &TimestampOffset,
        effect: F,
    ) -> Result<(), ExactlyOnceCommitError>
    where
        F: FnOnce(&rusqlite::Transaction<'_>) -> Result<(), HandlerError> + Send,
    {
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction().map_err(OffsetStoreError::from)?;
        effect(&tx)?;
        write_offset_rows(&tx, projection, offset).map_err(OffsetStoreError::from)?;
        tx.commit().map_err(OffsetStoreError::from)?;
        Ok(())
    }
}

fn write_offset_rows(
    conn: &rusqlite::Connection,
    projection: &ProjectionId,
    offset: &TimestampOffset,
) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO projection_offset (projection_name, projection_key, timestamp)
         VALUES (?1, ?2, ?3)
         ON CONFLICT (projection_name, projection_key) DO UPDATE SET timestamp = excluded.timestamp",
        rusqlite::params![projection.name, projection.key, offset.timestamp],
    )?;
    conn.execute(
        "DELETE FROM projection_offset_seen WHERE projection_name = ?1 AND projection_key = ?2",
        rusqlite::params![projection.name, projection.key],
    )?;
    for (pid, seq_nr) in &offset.seen {
        conn.execute(
            "INSERT INTO projection_offset_seen (projection_name, projection_key, persistence_id, seq_nr)
             VALUES (?1, ?2, ?3, ?4)",
            rusqlite::params![projection.name, projection.key, pid, seq_nr],
        )?;
    }
    Ok(())
}

fn apply_pragmas(conn: &rusqlite::Connection) -> Result<(), OffsetStoreError> {
    conn.execute_batch(
        "PRAGMA journal_mode=WAL;
         PRAGMA synchronous=FULL;
         PRAGMA foreign_keys=ON;",
    )?;
    Ok(())
}

fn run_integrity_check(conn: &rusqlite::Connection) -> Result<(), OffsetStoreError> {
    let result: String = conn.pragma_query_value(None, "integrity_check", |row| row.get(0))?;
    if result != "ok" {
        return Err(OffsetStoreError::IntegrityCheckFailed(result));
    }
    Ok(())
}

fn apply_schema(conn: &rusqlite::Connection) -> Result<(), OffsetStoreError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS projection_offset (
             projection_name TEXT NOT NULL,
             projection_key  TEXT NOT NULL,
             timestamp       INTEGER NOT NULL,
             PRIMARY KEY (projection_name, projection_key)
         );
         CREATE TABLE IF NOT EXISTS projection_offset_seen (
             projection_name TEXT NOT NULL,
             projection_key  TEXT NOT NULL,
             persistence_id  TEXT NOT NULL,
             seq_nr          INTEGER NOT NULL,
             PRIMARY KEY (projection_name, projection_key, persistence_id)
         );",
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn projection() -> ProjectionId {
        ProjectionId { name: "widget-projection".to_owned(), key: "widgets-0-511".to_owned() }
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryOffsetStore::new();
        assert!(store.load(&projection()).await.unwrap().is_none());
        let mut offset = TimestampOffset::new(5);
        offset.advance("widget|a", 5, 3);
        store.save(&projection(), &offset).await.unwrap();
        let loaded = store.load(&projection()).await.unwrap().unwrap();
        assert_eq!(loaded, offset);
    }

    #[tokio::test]
    async fn sqlite_store_round_trips_timestamp_and_seen() {
        let store = SqliteOffsetStore::open_in_memory().unwrap();
        let mut offset = TimestampOffset::new(7);
        offset.advance("widget|a", 7, 2);
        offset.advance("widget|b", 7, 9);
        store.save(&projection(), &offset).await.unwrap();
        let loaded = store.load(&projection()).await.unwrap().unwrap();
        assert_eq!(loaded, offset);
    }

    #[tokio::test]
    async fn sqlite_store_overwrites_on_second_save() {
        let store = SqliteOffsetStore::open_in_memory().unwrap();
        store.save(&projection(), &TimestampOffset::new(1)).await.unwrap();
        store.save(&projection(), &TimestampOffset::new(2)).await.unwrap();
        let loaded = store.load(&projection()).await.unwrap().unwrap();
        assert_eq!(loaded.timestamp, 2);
    }

    #[tokio::test]
    async fn commit_with_effect_applies_both_writes_together() {
        let store = SqliteOffsetStore::open_in_memory().unwrap();
        store
            .conn
            .lock()
            .await
            .execute_batch("CREATE TABLE projected (persistence_id TEXT PRIMARY KEY)")
            .unwrap();
        let offset = TimestampOffset::new(9);
        store
            .commit_with_effect(&projection(), &offset, |tx| {
                tx.execute("INSERT INTO projected (persistence_id) VALUES ('widget|a')", [])
                    .map_err(|e| HandlerError(e.to_string()))?;
                Ok(())
            })
            .await
            .unwrap();
        let loaded = store.load(&projection()).await.unwrap().unwrap();
        assert_eq!(loaded.timestamp, 9);
        let count: i64 = store
            .conn
            .lock()
            .await
            .query_row("SELECT count(*) FROM projected", [], |row| row.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn commit_with_effect_rolls_back_the_offset_on_handler_failure() {
        let store = SqliteOffsetStore::open_in_memory().unwrap();
        let err = store
            .commit_with_effect(&projection(), &TimestampOffset::new(9), |_tx| {
                Err(HandlerError("handler blew up".to_owned()))
            })
            .await
            .unwrap_err();
        assert!(matches!(err, ExactlyOnceCommitError::Handler(_)));
        assert!(store.load(&projection()).await.unwrap().is_none());
    }
}
