use std::path::Path;
use std::sync::Mutex;

use rusqlite::Connection;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::db::init_db;
use crate::error::MemoryError;
use crate::types::{MemoryCategory, MemoryEntry, SnapshotEntry};

const SNAPSHOT_FILENAME: &str = "MEMORY_SNAPSHOT.json";

/// Thread-safe SQLite-backed memory store. Full hybrid keyword+vector
/// recall beyond the `core` snapshot boundary is an external collaborator;
/// this store only needs to hold entries and round-trip the snapshot.
pub struct MemoryStore {
    conn: Mutex<Connection>,
}

impl MemoryStore {
    pub fn new(conn: Connection) -> Result<Self, MemoryError> {
        init_db(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Insert a new entry, always generating a fresh time-sortable id.
    pub fn store(
        &self,
        key: &str,
        content: &str,
        category: MemoryCategory,
        session_id: Option<&str>,
    ) -> Result<MemoryEntry, MemoryError> {
        let conn = self.conn.lock().unwrap();
        let id = Uuid::now_v7().to_string();
        let timestamp = chrono::Utc::now().to_rfc3339();
        let cat = category.to_string();

        conn.execute(
            "INSERT INTO memory_entries (id, key, content, category, timestamp, session_id, relevance_score)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, NULL)",
            rusqlite::params![id, key, content, cat, timestamp, session_id],
        )?;

        Ok(MemoryEntry {
            id,
            key: key.to_string(),
            content: content.to_string(),
            category,
            timestamp,
            session_id: session_id.map(str::to_string),
            relevance_score: None,
        })
    }

    /// Total number of stored entries across every category.
    pub fn count(&self) -> Result<usize, MemoryError> {
        let conn = self.conn.lock().unwrap();
        let n: i64 = conn.query_row("SELECT COUNT(*) FROM memory_entries", [], |row| row.get(0))?;
        Ok(n as usize)
    }

    fn list_by_category(&self, category: &str) -> Result<Vec<MemoryEntry>, MemoryError> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, key, content, category, timestamp, session_id, relevance_score
             FROM memory_entries WHERE category = ?1 ORDER BY id",
        )?;
        let rows = stmt
            .query_map([category], |row| {
                let cat_str: String = row.get(3)?;
                Ok(MemoryEntry {
                    id: row.get(0)?,
                    key: row.get(1)?,
                    content: row.get(2)?,
                    category: cat_str.parse().unwrap(),
                    timestamp: row.get(4)?,
                    session_id: row.get(5)?,
                    relevance_score: row.get(6)?,
                })
            })?
            .filter_map(|r| r.ok())
            .collect();
        Ok(rows)
    }

    /// Export every `core`-category entry to `<workspace>/MEMORY_SNAPSHOT.json`.
    /// An empty `core` set writes nothing and returns 0.
    pub fn export_snapshot(&self, workspace_dir: &Path) -> Result<usize, MemoryError> {
        let entries = self.list_by_category("core")?;
        if entries.is_empty() {
            return Ok(0);
        }

        let snapshot: Vec<SnapshotEntry> = entries
            .iter()
            .map(|e| SnapshotEntry {
                key: e.key.clone(),
                content: e.content.clone(),
                category: e.category.to_string(),
                timestamp: e.timestamp.clone(),
            })
            .collect();

        let json = serde_json::to_string_pretty(&snapshot)
            .map_err(|e| MemoryError::Serialization(e.to_string()))?;
        std::fs::write(workspace_dir.join(SNAPSHOT_FILENAME), json)
            .map_err(|e| MemoryError::SnapshotIo(e.to_string()))?;
        Ok(snapshot.len())
    }

    /// Read back `MEMORY_SNAPSHOT.json` and store every entry carrying both
    /// a `key` and `content`. Per-entry parse failures are skipped, not
    /// fatal. Returns the count hydrated.
    pub fn hydrate_snapshot(&self, workspace_dir: &Path) -> Result<usize, MemoryError> {
        let path = workspace_dir.join(SNAPSHOT_FILENAME);
        let raw = std::fs::read_to_string(&path).map_err(|e| MemoryError::SnapshotIo(e.to_string()))?;
        let values: Vec<serde_json::Value> =
            serde_json::from_str(&raw).map_err(|e| MemoryError::Serialization(e.to_string()))?;

        let mut hydrated = 0;
        for value in values {
            let (Some(key), Some(content)) = (
                value.get("key").and_then(|v| v.as_str()),
                value.get("content").and_then(|v| v.as_str()),
            ) else {
                warn!("skipping snapshot entry missing key or content");
                continue;
            };
            let category = value
                .get("category")
                .and_then(|v| v.as_str())
                .map(|s| s.parse().unwrap())
                .unwrap_or(MemoryCategory::Core);

            match self.store(key, content, category, None) {
                Ok(_) => hydrated += 1,
                Err(e) => warn!(key, "failed to hydrate snapshot entry: {e}"),
            }
        }
        debug!(hydrated, "snapshot hydration complete");
        Ok(hydrated)
    }

    /// True iff the store is empty and a snapshot file exists to seed from.
    pub fn should_hydrate(&self, workspace_dir: &Path) -> Result<bool, MemoryError> {
        Ok(self.count()? == 0 && workspace_dir.join(SNAPSHOT_FILENAME).exists())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> MemoryStore {
        MemoryStore::new(Connection::open_in_memory().unwrap()).unwrap()
    }

    #[test]
    fn export_empty_core_writes_nothing_and_returns_zero() {
        let store = store();
        let dir = tempfile::tempdir().unwrap();
        let n = store.export_snapshot(dir.path()).unwrap();
        assert_eq!(n, 0);
        assert!(!dir.path().join(SNAPSHOT_FILENAME).exists());
    }

    #[test]
    fn export_then_hydrate_round_trips_core_entries() {
        let dir = tempfile::tempdir().unwrap();

        let source = store();
        source.store("name", "Ada", MemoryCategory::Core, None).unwrap();
        source.store("daily-note", "irrelevant", MemoryCategory::Daily, None).unwrap();
        let exported = source.export_snapshot(dir.path()).unwrap();
        assert_eq!(exported, 1);

        let target = store();
        assert!(target.should_hydrate(dir.path()).unwrap());
        let hydrated = target.hydrate_snapshot(dir.path()).unwrap();
        assert_eq!(hydrated, 1);
        assert_eq!(target.count().unwrap(), 1);
    }

    #[test]
    fn should_hydrate_false_when_entries_already_present() {
        let dir = tempfile::tempdir().unwrap();
        let store = store();
        store.store("k", "v", MemoryCategory::Core, None).unwrap();
        store.export_snapshot(dir.path()).unwrap();
        assert!(!store.should_hydrate(dir.path()).unwrap());
    }

    #[test]
    fn hydrate_skips_entries_missing_key_or_content() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(SNAPSHOT_FILENAME),
            r#"[{"key":"a","content":"ok","category":"core","timestamp":"t"},{"content":"no key"}]"#,
        )
        .unwrap();
        let store = store();
        let hydrated = store.hydrate_snapshot(dir.path()).unwrap();
        assert_eq!(hydrated, 1);
    }
}
