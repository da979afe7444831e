use std::collections::HashSet;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use dashwatch_common::{DashwatchError, Keyed};

/// One line of the append-only log.
#[derive(Debug, Serialize)]
struct LogEntry<'a, R> {
    key: &'a str,
    logged_at: String,
    record: &'a R,
}

#[derive(Debug, Deserialize)]
struct LoggedKey {
    key: String,
}

/// Keys of every record already delivered, backed by a JSON-lines file that only grows.
#[derive(Debug)]
pub struct DedupStore {
    path: PathBuf,
    seen: HashSet<String>,
}

/// False when a crashed write left the last line without its newline.
fn ends_cleanly(file: &mut File) -> io::Result<bool> {
    if file.metadata()?.len() == 0 {
        return Ok(true);
    }
    file.seek(SeekFrom::End(-1))?;
    let mut last = [0u8; 1];
    file.read_exact(&mut last)?;
    Ok(last[0] == b'\n')
}

fn unavailable(path: &Path, e: impl std::fmt::Display) -> DashwatchError {
    DashwatchError::PersistenceUnavailable {
        path: path.to_path_buf(),
        reason: e.to_string(),
    }
}

impl DedupStore {
    /// Read every logged key. A missing or empty log is a first run; a log that
    /// cannot be read or appended to is fatal.
    pub fn load(path: impl Into<PathBuf>) -> Result<Self, DashwatchError> {
        let path = path.into();

        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => String::new(),
            Err(e) => return Err(unavailable(&path, e)),
        };

        let mut seen = HashSet::new();
        let mut corrupt = 0usize;
        for line in content.lines().filter(|l| !l.trim().is_empty()) {
            match serde_json::from_str::<LoggedKey>(line) {
                Ok(entry) => {
                    seen.insert(entry.key);
                }
                Err(_) => corrupt += 1,
            }
        }
        if corrupt > 0 {
            warn!(path = %path.display(), corrupt, "Skipped unreadable dedup log lines");
        }

        // Fail now rather than after a send we could not record.
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| unavailable(&path, e))?;
        }
        OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .map_err(|e| unavailable(&path, e))?;

        info!(path = %path.display(), keys = seen.len(), "Loaded dedup log");
        Ok(Self { path, seen })
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }

    pub fn contains(&self, key: &str) -> bool {
        self.seen.contains(key)
    }

    /// Records whose key has not been logged, in input order. Repeats within
    /// `records` are kept once.
    pub fn filter_novel<T: Keyed>(&self, records: Vec<T>) -> Vec<T> {
        let mut batch_keys = HashSet::new();
        records
            .into_iter()
            .filter(|r| {
                let key = r.dedup_key();
                !self.seen.contains(&key) && batch_keys.insert(key)
            })
            .collect()
    }

    /// Append `records` to the log and remember their keys. Keys already
    /// logged are skipped. Returns how many lines were written.
    pub fn commit<T: Keyed + Serialize>(&mut self, records: &[T]) -> Result<usize, DashwatchError> {
        let logged_at = Utc::now().to_rfc3339();
        let mut buf = String::new();
        let mut keys = Vec::new();
        for record in records {
            let key = record.dedup_key();
            if self.seen.contains(&key) || keys.contains(&key) {
                continue;
            }
            let line = serde_json::to_string(&LogEntry {
                key: &key,
                logged_at: logged_at.clone(),
                record,
            })
            .map_err(|e| unavailable(&self.path, e))?;
            buf.push_str(&line);
            buf.push('\n');
            keys.push(key);
        }
        if keys.is_empty() {
            return Ok(0);
        }

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .append(true)
            .open(&self.path)
            .map_err(|e| unavailable(&self.path, e))?;
        if !ends_cleanly(&mut file).map_err(|e| unavailable(&self.path, e))? {
            warn!(path = %self.path.display(), "Dedup log ends mid-line, starting a new one");
            buf.insert(0, '\n');
        }
        file.write_all(buf.as_bytes())
            .and_then(|_| file.sync_data())
            .map_err(|e| unavailable(&self.path, e))?;

        let written = keys.len();
        self.seen.extend(keys);
        info!(path = %self.path.display(), written, "Committed to dedup log");
        Ok(written)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dashwatch_common::CommentRecord;

    fn comment(store: &str, text: &str) -> CommentRecord {
        CommentRecord {
            store: store.into(),
            timestamp: "2025-03-01".into(),
            score: 8,
            comment: text.into(),
        }
    }

    #[test]
    fn missing_log_is_an_empty_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = DedupStore::load(dir.path().join("state/sent.jsonl")).unwrap();
        assert!(store.is_empty());
        assert!(dir.path().join("state/sent.jsonl").exists());
    }

    #[test]
    fn commit_then_reload_remembers_keys() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.jsonl");
        let mut store = DedupStore::load(&path).unwrap();
        let records = vec![comment("1 A", "hi"), comment("2 B", "hi")];
        assert_eq!(store.commit(&records).unwrap(), 2);

        let reloaded = DedupStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.filter_novel(records).is_empty());
    }

    #[test]
    fn commit_only_appends() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.jsonl");
        let mut store = DedupStore::load(&path).unwrap();
        store.commit(&[comment("1 A", "one")]).unwrap();
        let before = fs::read_to_string(&path).unwrap();

        store.commit(&[comment("1 A", "one"), comment("1 A", "two")]).unwrap();
        let after = fs::read_to_string(&path).unwrap();

        assert!(after.starts_with(&before));
        assert_eq!(after.lines().count(), 2);
    }

    #[test]
    fn filter_novel_keeps_order_and_drops_repeats() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = DedupStore::load(dir.path().join("sent.jsonl")).unwrap();
        store.commit(&[comment("1 A", "old")]).unwrap();

        let novel = store.filter_novel(vec![
            comment("3 C", "x"),
            comment("1 A", "old"),
            comment("2 B", "y"),
            comment("3 C", "x"),
        ]);
        let stores: Vec<_> = novel.iter().map(|c| c.store.as_str()).collect();
        assert_eq!(stores, vec!["3 C", "2 B"]);
    }

    #[test]
    fn corrupt_lines_are_skipped() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.jsonl");
        fs::write(&path, "{\"key\":\"a\"}\nnot json\n\n{\"key\":\"b\",\"logged_at\":\"x\"}\n").unwrap();
        let store = DedupStore::load(&path).unwrap();
        assert_eq!(store.len(), 2);
        assert!(store.contains("a"));
    }

    #[test]
    fn torn_last_line_does_not_swallow_the_next_commit() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sent.jsonl");
        fs::write(&path, "{\"key\":\"a\"}\n{\"key\":\"b\",\"logg").unwrap();

        let mut store = DedupStore::load(&path).unwrap();
        assert_eq!(store.len(), 1);
        store.commit(&[comment("1 A", "new")]).unwrap();

        let reloaded = DedupStore::load(&path).unwrap();
        assert_eq!(reloaded.len(), 2);
        assert!(reloaded.filter_novel(vec![comment("1 A", "new")]).is_empty());
    }

    #[test]
    fn unreadable_log_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        // A directory where the file should be cannot be read as a log.
        let err = DedupStore::load(dir.path()).unwrap_err();
        assert!(matches!(err, DashwatchError::PersistenceUnavailable { .. }));
    }
}
