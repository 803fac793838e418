// ABOUTME: Durable session store — one pretty-printed JSON file per session id.
// ABOUTME: Loads, saves (atomic tmp + rename), lists with metadata, and removes session files.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Local};
use serde::{Deserialize, Serialize};

use crate::session::history::{self, History, HistoryShapeError};

/// On-disk record for a single session.
#[derive(Debug, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub model: String,
    pub system_role: String,
    pub history: History,
}

/// Read-only view of a stored session, computed on every listing.
#[derive(Debug, Clone)]
pub struct SessionMetadata {
    pub id: String,
    pub message_count: usize,
    pub last_activity: Option<DateTime<Local>>,
    /// Set when the file could not be read or parsed.
    pub error: Option<String>,
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("session '{0}' not found")]
    NotFound(String),
    #[error("invalid session id '{0}'")]
    InvalidId(String),
    #[error("session '{id}' is corrupt: {reason}")]
    Corrupt { id: String, reason: String },
    #[error("session storage I/O failed: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode session: {0}")]
    Encode(#[from] serde_json::Error),
}

/// File-backed store rooted at a sessions directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    dir: PathBuf,
}

impl SessionStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file backing `id`.
    pub fn session_path(&self, id: &str) -> Result<PathBuf, StoreError> {
        if id.is_empty()
            || id == "."
            || id.contains("..")
            || id.contains('/')
            || id.contains('\\')
        {
            return Err(StoreError::InvalidId(id.to_string()));
        }
        Ok(self.dir.join(format!("{id}.json")))
    }

    /// Load the history stored for `id`.
    pub fn load(&self, id: &str) -> Result<History, StoreError> {
        let path = self.session_path(id)?;
        let bytes = match std::fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(StoreError::NotFound(id.to_string()));
            }
            Err(e) => return Err(e.into()),
        };
        let record = parse_record(id, &bytes)?;
        tracing::debug!(session = id, messages = record.history.len(), "loaded session");
        Ok(record.history)
    }

    /// Persist `history` for `id`. Histories shorter than one exchange are never written.
    pub fn save(
        &self,
        id: &str,
        history: &History,
        system_role: &str,
        model: &str,
    ) -> Result<(), StoreError> {
        if history.len() < 2 {
            tracing::debug!(session = id, "skipping save of incomplete session");
            return Ok(());
        }
        let path = self.session_path(id)?;
        let record = SessionRecord {
            session_id: id.to_string(),
            model: model.to_string(),
            system_role: system_role.to_string(),
            history: history.clone(),
        };
        std::fs::create_dir_all(&self.dir)?;
        let tmp_path = path.with_extension("json.tmp");
        let content = serde_json::to_string_pretty(&record)?;
        std::fs::write(&tmp_path, &content)?;
        std::fs::rename(&tmp_path, &path)?;
        tracing::debug!(session = id, messages = history.len(), "saved session");
        Ok(())
    }

    /// Enumerate all stored sessions, sorted by id.
    pub fn list(&self) -> Result<Vec<SessionMetadata>, StoreError> {
        let entries = match std::fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };

        let mut sessions: Vec<SessionMetadata> = entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| p.extension().is_some_and(|ext| ext == "json"))
            .filter_map(|p| {
                let id = p.file_stem()?.to_string_lossy().to_string();
                Some(describe(&p, id))
            })
            .collect();
        sessions.sort_by(|a, b| a.id.cmp(&b.id));
        Ok(sessions)
    }

    /// Delete the file backing `id`.
    pub fn remove(&self, id: &str) -> Result<(), StoreError> {
        let path = self.session_path(id)?;
        match std::fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Err(StoreError::NotFound(id.to_string())),
            Err(e) => Err(e.into()),
        }
    }
}

/// Decode a stored record; anything undecodable, including invalid UTF-8, is corrupt.
fn parse_record(id: &str, bytes: &[u8]) -> Result<SessionRecord, StoreError> {
    let corrupt = |reason: String| StoreError::Corrupt {
        id: id.to_string(),
        reason,
    };
    let record: SessionRecord = serde_json::from_slice(bytes).map_err(|e| corrupt(e.to_string()))?;
    history::validate(&record.history).map_err(|e: HistoryShapeError| corrupt(e.to_string()))?;
    Ok(record)
}

fn describe(path: &Path, id: String) -> SessionMetadata {
    let last_activity = std::fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .map(DateTime::<Local>::from);

    let parsed = std::fs::read(path)
        .map_err(|e| e.to_string())
        .and_then(|bytes| parse_record(&id, &bytes).map_err(|e| e.to_string()));

    match parsed {
        Ok(record) => SessionMetadata {
            id,
            message_count: record.history.len(),
            last_activity,
            error: None,
        },
        Err(reason) => SessionMetadata {
            id,
            message_count: 0,
            last_activity,
            error: Some(reason),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::history::{Message, Role};

    fn exchange(prompt: &str, reply: &str) -> History {
        vec![Message::user(prompt), Message::assistant(reply)]
    }

    #[test]
    fn save_load_roundtrip() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());

        let mut history = exchange("Hello, how are you?", "I'm doing well, thanks!");
        history.extend(exchange("Second question", "Second answer"));
        store.save("abc", &history, "be nice", "test-model").unwrap();

        let loaded = store.load("abc").unwrap();
        assert_eq!(loaded, history);
        assert_eq!(loaded[0].role, Role::User);
        assert_eq!(loaded[3].text, "Second answer");
    }

    #[test]
    fn record_carries_model_and_system_role() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        store
            .save("meta", &exchange("q", "a"), "You are terse.", "gemini-2.5-flash")
            .unwrap();

        let raw = std::fs::read_to_string(tmp.path().join("meta.json")).unwrap();
        let record: SessionRecord = serde_json::from_str(&raw).unwrap();
        assert_eq!(record.session_id, "meta");
        assert_eq!(record.model, "gemini-2.5-flash");
        assert_eq!(record.system_role, "You are terse.");
        assert!(raw.contains('\n'), "record should be pretty-printed");
    }

    #[test]
    fn save_skips_incomplete_histories() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path().join("sessions"));

        store.save("empty", &Vec::new(), "", "m").unwrap();
        store.save("half", &vec![Message::user("only")], "", "m").unwrap();

        assert!(!tmp.path().join("sessions").exists());
    }

    #[test]
    fn incomplete_save_leaves_existing_file_untouched() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        store.save("keep", &exchange("q", "a"), "", "m").unwrap();
        let before = std::fs::read_to_string(tmp.path().join("keep.json")).unwrap();

        store.save("keep", &Vec::new(), "", "m").unwrap();

        let after = std::fs::read_to_string(tmp.path().join("keep.json")).unwrap();
        assert_eq!(before, after);
    }

    #[test]
    fn save_is_atomic() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        store.save("xyz", &exchange("q", "a"), "", "m").unwrap();

        assert!(tmp.path().join("xyz.json").exists());
        assert!(
            !tmp.path().join("xyz.json.tmp").exists(),
            "tmp file should not exist after successful save"
        );
    }

    #[test]
    fn load_missing_is_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        assert!(matches!(store.load("ghost"), Err(StoreError::NotFound(id)) if id == "ghost"));
    }

    #[test]
    fn load_garbage_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bad.json"), "{ not json").unwrap();
        let store = SessionStore::new(tmp.path());
        assert!(matches!(store.load("bad"), Err(StoreError::Corrupt { .. })));
    }

    #[test]
    fn load_non_utf8_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bin.json"), [0xff, 0xfe, 0x01]).unwrap();
        let store = SessionStore::new(tmp.path());

        assert!(matches!(store.load("bin"), Err(StoreError::Corrupt { id, .. }) if id == "bin"));
        let listed = store.list().unwrap();
        assert_eq!(listed.len(), 1);
        assert!(listed[0].error.as_deref().unwrap().contains("corrupt"));
    }

    #[test]
    fn load_odd_history_is_corrupt() {
        let tmp = tempfile::tempdir().unwrap();
        let record = SessionRecord {
            session_id: "odd".to_string(),
            model: "m".to_string(),
            system_role: String::new(),
            history: vec![Message::user("dangling")],
        };
        std::fs::write(
            tmp.path().join("odd.json"),
            serde_json::to_string(&record).unwrap(),
        )
        .unwrap();

        let store = SessionStore::new(tmp.path());
        match store.load("odd") {
            Err(StoreError::Corrupt { reason, .. }) => assert!(reason.contains("odd length")),
            other => panic!("expected Corrupt, got {other:?}"),
        }
    }

    #[test]
    fn path_traversal_ids_are_rejected() {
        let store = SessionStore::new("/tmp/sessions");
        for id in ["", "../etc", "a/b", "a\\b", "."] {
            assert!(
                matches!(store.session_path(id), Err(StoreError::InvalidId(_))),
                "id {id:?} should be rejected"
            );
        }
    }

    #[test]
    fn list_is_sorted_and_flags_corrupt_entries() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        let mut long = exchange("1", "2");
        long.extend(exchange("3", "4"));
        store.save("charlie", &long, "", "m").unwrap();
        store.save("alpha", &exchange("q", "a"), "", "m").unwrap();
        std::fs::write(tmp.path().join("bravo.json"), "garbage").unwrap();
        std::fs::write(tmp.path().join("notes.txt"), "ignored").unwrap();

        let listed = store.list().unwrap();
        let ids: Vec<&str> = listed.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["alpha", "bravo", "charlie"]);

        assert_eq!(listed[0].message_count, 2);
        assert!(listed[0].error.is_none());
        assert!(listed[1].error.is_some());
        assert_eq!(listed[2].message_count, 4);
        assert!(listed[2].last_activity.is_some());
    }

    #[test]
    fn list_missing_dir_is_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path().join("nope"));
        assert!(store.list().unwrap().is_empty());
    }

    #[test]
    fn remove_deletes_file() {
        let tmp = tempfile::tempdir().unwrap();
        let store = SessionStore::new(tmp.path());
        store.save("gone", &exchange("q", "a"), "", "m").unwrap();

        store.remove("gone").unwrap();
        assert!(matches!(store.load("gone"), Err(StoreError::NotFound(_))));
        assert!(matches!(store.remove("gone"), Err(StoreError::NotFound(_))));
    }
}
