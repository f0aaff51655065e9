//! Named, timestamped snapshots of logbook pages.
//!
//! All saved logs live as one JSON array under a single key of a
//! [`KeyValueStore`]. The repository is read once when loaded and every
//! change rewrites the whole collection.

use chrono::{DateTime, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::columns::ColumnSet;
use crate::entry::LogEntry;
use crate::error::Result;
use crate::ledger::PageSummary;

use super::KeyValueStore;

/// The content of a logbook page at a point in time.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LogSnapshot {
    /// The entry collection.
    pub entries: Vec<LogEntry>,
    /// The column schema.
    pub columns: ColumnSet,
    /// The logbook year.
    pub year: String,
}

/// A saved version of a logbook page.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SavedLog {
    /// Stable identifier (`log-<ms>`).
    pub id: String,
    /// Display name, fixed when first saved.
    pub name: String,
    /// Milliseconds since the Unix epoch of the last save.
    pub timestamp: i64,
    /// The entry collection.
    #[serde(default)]
    pub entries: Vec<LogEntry>,
    /// The column schema.
    #[serde(default)]
    pub columns: ColumnSet,
    /// The logbook year.
    #[serde(default)]
    pub year: String,
}

impl SavedLog {
    /// When this log was last saved.
    #[must_use]
    pub fn saved_at(&self) -> Option<DateTime<Utc>> {
        Utc.timestamp_millis_opt(self.timestamp).single()
    }

    /// Headline figures for the gallery card.
    #[must_use]
    pub fn summary(&self) -> PageSummary {
        PageSummary::of(&self.entries)
    }

    /// The saved content.
    #[must_use]
    pub fn snapshot(&self) -> LogSnapshot {
        LogSnapshot {
            entries: self.entries.clone(),
            columns: self.columns.clone(),
            year: self.year.clone(),
        }
    }
}

/// Keyed collection of saved logs, most recently saved first.
pub struct SavedLogRepository {
    store: Box<dyn KeyValueStore>,
    key: String,
    logs: Vec<SavedLog>,
    load_error: Option<String>,
}

impl std::fmt::Debug for SavedLogRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SavedLogRepository")
            .field("key", &self.key)
            .field("logs", &self.logs.len())
            .field("load_error", &self.load_error)
            .finish_non_exhaustive()
    }
}

impl SavedLogRepository {
    /// Read the saved logs stored under `key`.
    ///
    /// A missing key yields an empty repository. A read or parse failure is
    /// logged, the repository starts empty, and the failure is kept in
    /// [`SavedLogRepository::load_error`].
    pub fn load(store: Box<dyn KeyValueStore>, key: impl Into<String>) -> Self {
        let key = key.into();
        let (logs, load_error) = match store.get(&key) {
            Ok(None) => (Vec::new(), None),
            Ok(Some(text)) => match serde_json::from_str::<Vec<SavedLog>>(&text) {
                Ok(logs) => {
                    info!(count = logs.len(), key = %key, "Loaded saved logs");
                    (logs, None)
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "Failed to parse saved logs; starting empty");
                    (Vec::new(), Some(e.to_string()))
                }
            },
            Err(e) => {
                warn!(key = %key, error = %e, "Failed to read saved logs; starting empty");
                (Vec::new(), Some(e.to_string()))
            }
        };
        Self {
            store,
            key,
            logs,
            load_error,
        }
    }

    /// The storage key holding the collection.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// Why the initial load fell back to an empty collection, if it did.
    #[must_use]
    pub fn load_error(&self) -> Option<&str> {
        self.load_error.as_deref()
    }

    /// Saved logs, most recently saved first.
    #[must_use]
    pub fn list(&self) -> &[SavedLog] {
        &self.logs
    }

    /// Look up a saved log by id.
    #[must_use]
    pub fn get(&self, id: &str) -> Option<&SavedLog> {
        self.logs.iter().find(|l| l.id == id)
    }

    /// Number of saved logs.
    #[must_use]
    pub fn len(&self) -> usize {
        self.logs.len()
    }

    /// Whether there are no saved logs.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty()
    }

    /// A fresh id for a log first saved at `now`, distinct from every
    /// existing id.
    #[must_use]
    pub fn next_id(&self, now: DateTime<Utc>) -> String {
        let mut ms = now.timestamp_millis();
        loop {
            let id = format!("log-{ms}");
            if self.get(&id).is_none() {
                return id;
            }
            ms += 1;
        }
    }

    /// Save `snapshot` as log `id` at `now`.
    ///
    /// An existing log keeps its id and name; its content and timestamp are
    /// replaced and it moves to the front. Otherwise a new log named
    /// `Log Page <date>` is inserted at the front. The whole collection is
    /// then written.
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails. The in-memory collection keeps
    /// the change either way.
    pub fn upsert(&mut self, id: &str, snapshot: LogSnapshot, now: DateTime<Utc>) -> Result<SavedLog> {
        let name = match self.logs.iter().position(|l| l.id == id) {
            Some(index) => self.logs.remove(index).name,
            None => format!("Log Page {}", now.format("%-m/%-d/%Y")),
        };
        let log = SavedLog {
            id: id.to_string(),
            name,
            timestamp: now.timestamp_millis(),
            entries: snapshot.entries,
            columns: snapshot.columns,
            year: snapshot.year,
        };
        self.logs.insert(0, log.clone());
        debug!(id = %log.id, entries = log.entries.len(), "Upserted saved log");
        self.persist()?;
        Ok(log)
    }

    /// Remove a saved log. Returns the removed log, or `None` if no log has
    /// that id (nothing is written then).
    ///
    /// # Errors
    ///
    /// Returns an error if the write fails.
    pub fn delete(&mut self, id: &str) -> Result<Option<SavedLog>> {
        let Some(index) = self.logs.iter().position(|l| l.id == id) else {
            return Ok(None);
        };
        let removed = self.logs.remove(index);
        info!(id = %removed.id, "Deleted saved log");
        self.persist()?;
        Ok(Some(removed))
    }

    fn persist(&mut self) -> Result<()> {
        let text = serde_json::to_string(&self.logs)?;
        self.store.set(&self.key, &text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::storage::{MemoryStore, Storage};

    const KEY: &str = "skylog_saved_logs";

    struct RejectingStore;

    impl KeyValueStore for RejectingStore {
        fn get(&self, _key: &str) -> Result<Option<String>> {
            Ok(None)
        }

        fn set(&mut self, key: &str, _value: &str) -> Result<()> {
            Err(Error::storage_write(key, "quota exceeded"))
        }

        fn remove(&mut self, _key: &str) -> Result<bool> {
            Ok(false)
        }
    }

    fn at(ms: i64) -> DateTime<Utc> {
        Utc.timestamp_millis_opt(ms).unwrap()
    }

    fn snapshot(ids: &[&str]) -> LogSnapshot {
        LogSnapshot {
            entries: ids
                .iter()
                .map(|id| LogEntry::blank(*id, None, "2024-01-01"))
                .collect(),
            columns: ColumnSet::default(),
            year: "2024".to_string(),
        }
    }

    fn empty_repo() -> SavedLogRepository {
        SavedLogRepository::load(Box::new(MemoryStore::new()), KEY)
    }

    #[test]
    fn test_load_missing_key_is_empty() {
        let repo = empty_repo();
        assert!(repo.is_empty());
        assert!(repo.load_error().is_none());
    }

    #[test]
    fn test_load_corrupt_value_starts_empty() {
        let mut store = MemoryStore::new();
        store.set(KEY, "{not json").unwrap();
        let repo = SavedLogRepository::load(Box::new(store), KEY);
        assert!(repo.is_empty());
        assert!(repo.load_error().is_some());
    }

    #[test]
    fn test_upsert_new_log() {
        let mut repo = empty_repo();
        let now = at(1_700_000_000_000);
        let id = repo.next_id(now);
        assert_eq!(id, "log-1700000000000");

        let log = repo.upsert(&id, snapshot(&["a"]), now).unwrap();
        assert_eq!(log.name, "Log Page 11/14/2023");
        assert_eq!(log.timestamp, 1_700_000_000_000);
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_upsert_existing_keeps_id_and_name_and_moves_to_front() {
        let mut repo = empty_repo();
        repo.upsert("log-1", snapshot(&["a"]), at(1_000)).unwrap();
        repo.upsert("log-2", snapshot(&["b"]), at(2_000)).unwrap();
        let original_name = repo.get("log-1").unwrap().name.clone();

        let updated = repo.upsert("log-1", snapshot(&["a", "c"]), at(3_000)).unwrap();
        assert_eq!(updated.name, original_name);
        assert_eq!(updated.entries.len(), 2);
        assert_eq!(updated.timestamp, 3_000);

        let ids: Vec<&str> = repo.list().iter().map(|l| l.id.as_str()).collect();
        assert_eq!(ids, vec!["log-1", "log-2"]);
    }

    #[test]
    fn test_next_id_avoids_collisions() {
        let mut repo = empty_repo();
        let now = at(5_000);
        let first = repo.next_id(now);
        repo.upsert(&first, snapshot(&["a"]), now).unwrap();
        assert_eq!(repo.next_id(now), "log-5001");
    }

    #[test]
    fn test_delete() {
        let mut repo = empty_repo();
        repo.upsert("log-1", snapshot(&["a"]), at(1_000)).unwrap();
        repo.upsert("log-2", snapshot(&["b"]), at(2_000)).unwrap();

        let removed = repo.delete("log-1").unwrap().unwrap();
        assert_eq!(removed.id, "log-1");
        assert!(repo.get("log-1").is_none());
        assert!(repo.get("log-2").is_some());
        assert!(repo.delete("log-1").unwrap().is_none());
    }

    #[test]
    fn test_persisted_collection_reloads() {
        let mut repo = SavedLogRepository::load(Box::new(Storage::open_in_memory().unwrap()), KEY);
        repo.upsert("log-1", snapshot(&["a"]), at(1_000)).unwrap();
        let text = serde_json::to_string(repo.list()).unwrap();

        let mut store = MemoryStore::new();
        store.set(KEY, &text).unwrap();
        let reloaded = SavedLogRepository::load(Box::new(store), KEY);
        assert_eq!(reloaded.list(), repo.list());
    }

    #[test]
    fn test_write_failure_keeps_memory_state() {
        let mut repo = SavedLogRepository::load(Box::new(RejectingStore), KEY);
        let err = repo.upsert("log-1", snapshot(&["a"]), at(1_000)).unwrap_err();
        assert!(matches!(err, Error::StorageWrite { .. }));
        assert_eq!(repo.len(), 1);
    }

    #[test]
    fn test_saved_log_serde_shape() {
        let mut repo = empty_repo();
        let log = repo.upsert("log-1", snapshot(&["a"]), at(1_000)).unwrap();
        let value = serde_json::to_value(&log).unwrap();
        assert_eq!(value["id"], "log-1");
        assert_eq!(value["timestamp"], 1_000);
        assert!(value["columns"].is_array());
        assert_eq!(log.saved_at(), Some(at(1_000)));
        assert_eq!(log.summary().entries, 1);
    }
}
