//! Backup journal: a local JSON array file mirroring every persisted record.
//!
//! The file always holds one pretty-printed JSON array with the full accepted
//! history. Each append reads the array, pushes the record and replaces the
//! file through a sibling temporary file. A journal has exactly one writer;
//! share it behind a lock if ingest ever becomes concurrent.

use crate::message::StoredMessage;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

/// Error type for journal operations
#[derive(Debug)]
pub enum JournalError {
    Io(std::io::Error),
    Json(serde_json::Error),
}

impl From<std::io::Error> for JournalError {
    fn from(err: std::io::Error) -> Self {
        JournalError::Io(err)
    }
}

impl From<serde_json::Error> for JournalError {
    fn from(err: serde_json::Error) -> Self {
        JournalError::Json(err)
    }
}

impl std::fmt::Display for JournalError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JournalError::Io(e) => write!(f, "Journal IO error: {}", e),
            JournalError::Json(e) => write!(f, "Journal JSON error: {}", e),
        }
    }
}

impl std::error::Error for JournalError {}

/// Append-only JSON array journal
#[derive(Debug, Clone)]
pub struct BackupJournal {
    path: PathBuf,
}

impl BackupJournal {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Typed view of the journal, for inspection.
    ///
    /// Lenient: an unreadable file reads as empty and entries that are not
    /// stored messages are left out. Never used on the append path.
    pub fn load(&self) -> Vec<StoredMessage> {
        let entries = match self.entries() {
            Ok(entries) => entries,
            Err(e) => {
                tracing::warn!("Journal {} unreadable: {}", self.path.display(), e);
                return Vec::new();
            }
        };

        entries
            .into_iter()
            .filter_map(|entry| serde_json::from_value(entry).ok())
            .collect()
    }

    /// Raw journal entries, whatever their shape.
    ///
    /// A missing file, or one that is not a JSON array, is an empty history.
    /// Any other read failure is an error so the history is never overwritten.
    pub fn entries(&self) -> Result<Vec<Value>, JournalError> {
        let contents = match fs::read(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(JournalError::Io(e)),
        };

        match serde_json::from_slice(&contents) {
            Ok(entries) => Ok(entries),
            Err(e) => {
                tracing::warn!("Journal {} is not a JSON array, starting empty: {}", self.path.display(), e);
                Ok(Vec::new())
            }
        }
    }

    /// Append one record and rewrite the whole file.
    ///
    /// Existing entries are kept as-is, even ones this crate did not write.
    /// Returns the number of entries now in the journal.
    pub fn append(&self, record: &StoredMessage) -> Result<usize, JournalError> {
        let mut entries = self.entries()?;
        entries.push(serde_json::to_value(record)?);
        self.replace(&entries)?;
        Ok(entries.len())
    }

    fn replace(&self, entries: &[Value]) -> Result<(), JournalError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)?;
            }
        }

        let tmp_path = self.tmp_path();
        {
            let mut file = fs::File::create(&tmp_path)?;
            serde_json::to_writer_pretty(&mut file, entries)?;
            file.flush()?;
            file.sync_all()?;
        }
        fs::rename(&tmp_path, &self.path)?;
        Ok(())
    }

    fn tmp_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_else(|| "journal.json".into());
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn record(username: &str, message: &str) -> StoredMessage {
        StoredMessage {
            date: "2024-01-01 00:00:00.000000".to_string(),
            username: username.to_string(),
            message: message.to_string(),
        }
    }

    #[test]
    fn test_append_to_missing_file() {
        let temp_dir = TempDir::new().unwrap();
        let journal = BackupJournal::new(temp_dir.path().join("storage").join("data.json"));

        assert_eq!(journal.append(&record("alice", "hi")).unwrap(), 1);
        assert_eq!(journal.load(), vec![record("alice", "hi")]);
    }

    #[test]
    fn test_append_preserves_history() {
        let temp_dir = TempDir::new().unwrap();
        let journal = BackupJournal::new(temp_dir.path().join("data.json"));

        journal.append(&record("a", "1")).unwrap();
        journal.append(&record("b", "2")).unwrap();
        assert_eq!(journal.append(&record("c", "3")).unwrap(), 3);

        let names: Vec<String> = journal.load().into_iter().map(|r| r.username).collect();
        assert_eq!(names, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_invalid_file_restarts_from_empty() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.json");
        fs::write(&path, b"{ this is not json").unwrap();

        let journal = BackupJournal::new(&path);
        assert!(journal.load().is_empty());
        assert_eq!(journal.append(&record("alice", "hi")).unwrap(), 1);

        let raw: serde_json::Value = serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(raw.as_array().map(|a| a.len()), Some(1));
    }

    #[test]
    fn test_append_keeps_foreign_entries() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.json");
        fs::write(
            &path,
            br#"[
  {"date": "2023-12-31 23:59:59.000000", "username": "old", "message": "keep me"},
  {"date": "2023-12-31 23:59:59.500000", "username": "legacy", "message": null}
]"#,
        )
        .unwrap();

        let journal = BackupJournal::new(&path);
        assert_eq!(journal.append(&record("alice", "hi")).unwrap(), 3);

        let entries = journal.entries().unwrap();
        assert_eq!(entries.len(), 3);
        assert_eq!(entries[0]["message"], "keep me");
        assert!(entries[1]["message"].is_null());
        assert_eq!(entries[2]["username"], "alice");

        // Typed view skips what it cannot represent
        let names: Vec<String> = journal.load().into_iter().map(|r| r.username).collect();
        assert_eq!(names, vec!["old", "alice"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_unreadable_journal_is_not_overwritten() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.json");
        // Self-referencing symlink: every read fails with a loop error
        std::os::unix::fs::symlink(&path, &path).unwrap();

        let journal = BackupJournal::new(&path);
        let err = journal.append(&record("alice", "hi")).unwrap_err();

        assert!(matches!(err, JournalError::Io(_)));
        assert!(fs::symlink_metadata(&path).unwrap().file_type().is_symlink());
        assert!(!temp_dir.path().join("data.json.tmp").exists());
    }

    #[test]
    fn test_file_is_pretty_array_without_tmp_leftover() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("data.json");
        let journal = BackupJournal::new(&path);

        journal.append(&record("alice", "hi")).unwrap();

        let text = fs::read_to_string(&path).unwrap();
        assert!(text.starts_with("[\n  {"));
        assert!(text.contains("\"date\": \"2024-01-01 00:00:00.000000\""));
        assert!(!temp_dir.path().join("data.json.tmp").exists());
    }
}
