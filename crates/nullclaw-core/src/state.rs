//! Thread-safe, atomically-persisted record of the last active channel+chat.

use std::sync::Mutex;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::{NullclawError, Result};

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PersistedLastChannel {
    #[serde(rename = "last_channel")]
    pub last_channel: Option<String>,
    #[serde(rename = "last_chat_id")]
    pub last_chat_id: Option<String>,
    #[serde(rename = "updated_at")]
    pub updated_at: i64,
}

struct Inner {
    record: PersistedLastChannel,
}

/// Guards a single [`PersistedLastChannel`] behind a mutex and persists it
/// atomically: write a sibling `.tmp` file, then rename over the final path.
pub struct StateManager {
    path: std::path::PathBuf,
    inner: Mutex<Inner>,
}

impl StateManager {
    pub fn new(path: impl Into<std::path::PathBuf>) -> Self {
        Self {
            path: path.into(),
            inner: Mutex::new(Inner {
                record: PersistedLastChannel::default(),
            }),
        }
    }

    /// Update the in-memory record. Never touches disk.
    pub fn set(&self, channel: impl Into<String>, chat_id: impl Into<String>) {
        let mut inner = self.inner.lock().unwrap();
        inner.record.last_channel = Some(channel.into());
        inner.record.last_chat_id = Some(chat_id.into());
        inner.record.updated_at = now_secs();
    }

    /// Snapshot the current record.
    pub fn get(&self) -> PersistedLastChannel {
        self.inner.lock().unwrap().record.clone()
    }

    /// Serialize the current record and atomically replace the state file.
    pub fn save(&self) -> Result<()> {
        let record = self.inner.lock().unwrap().record.clone();
        let json = serde_json::to_vec_pretty(&record)?;

        let tmp_path = tmp_path_for(&self.path);
        std::fs::write(&tmp_path, &json).map_err(NullclawError::from)?;

        match std::fs::rename(&tmp_path, &self.path) {
            Ok(()) => Ok(()),
            Err(e) if is_cross_device(&e) => {
                // EXDEV: the rename can't cross filesystems. Fall back to a
                // direct write of the final path and drop the temp file.
                std::fs::write(&self.path, &json).map_err(NullclawError::from)?;
                let _ = std::fs::remove_file(&tmp_path);
                Ok(())
            }
            Err(e) => Err(NullclawError::from(e)),
        }
    }

    /// Load the record from disk if present. A missing file is a fresh start,
    /// not an error. A malformed file leaves the in-memory record unchanged.
    pub fn load(&self) -> Result<()> {
        let bytes = match std::fs::read(&self.path) {
            Ok(b) => b,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(()),
            Err(e) => return Err(NullclawError::from(e)),
        };
        match serde_json::from_slice::<PersistedLastChannel>(&bytes) {
            Ok(record) => {
                self.inner.lock().unwrap().record = record;
                Ok(())
            }
            Err(_) => Ok(()),
        }
    }
}

fn tmp_path_for(path: &std::path::Path) -> std::path::PathBuf {
    let mut tmp = path.as_os_str().to_owned();
    tmp.push(".tmp");
    std::path::PathBuf::from(tmp)
}

fn is_cross_device(e: &std::io::Error) -> bool {
    e.raw_os_error() == Some(libc_exdev())
}

/// `EXDEV` is 18 on Linux and every other target this repo cares about.
fn libc_exdev() -> i32 {
    18
}

fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn round_trip_preserves_fields() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mgr = StateManager::new(&path);
        mgr.set("telegram", "chat-42");
        mgr.save().unwrap();

        let reloaded = StateManager::new(&path);
        reloaded.load().unwrap();
        let got = reloaded.get();
        assert_eq!(got.last_channel.as_deref(), Some("telegram"));
        assert_eq!(got.last_chat_id.as_deref(), Some("chat-42"));
        assert!(got.updated_at > 0);
    }

    #[test]
    fn round_trip_with_special_chars() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");

        let mgr = StateManager::new(&path);
        mgr.set("tele\"gram", "chat\n42");
        mgr.save().unwrap();

        let reloaded = StateManager::new(&path);
        reloaded.load().unwrap();
        let got = reloaded.get();
        assert_eq!(got.last_channel.as_deref(), Some("tele\"gram"));
        assert_eq!(got.last_chat_id.as_deref(), Some("chat\n42"));
    }

    #[test]
    fn missing_file_is_not_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nope.json");
        let mgr = StateManager::new(&path);
        assert!(mgr.load().is_ok());
        assert_eq!(mgr.get().last_channel, None);
    }

    #[test]
    fn malformed_file_leaves_state_unchanged() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        std::fs::write(&path, b"not json").unwrap();

        let mgr = StateManager::new(&path);
        mgr.set("keep-me", "chat-1");
        mgr.load().unwrap();
        assert_eq!(mgr.get().last_channel.as_deref(), Some("keep-me"));
    }

    #[test]
    fn updated_at_strictly_increases() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("state.json");
        let mgr = StateManager::new(&path);
        mgr.set("a", "1");
        let first = mgr.get().updated_at;
        std::thread::sleep(std::time::Duration::from_millis(10));
        mgr.set("b", "2");
        let second = mgr.get().updated_at;
        assert!(second >= first);
    }
}
