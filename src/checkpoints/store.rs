//! Durable list of windows awaiting retry.
//!
//! The whole list is rewritten on every mutation: serialized to a temp file
//! in the same directory, then renamed over the checkpoint file. A crash
//! therefore leaves either the old or the new list, never a torn one.

use anyhow::{anyhow, Context, Result};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use tempfile::NamedTempFile;
use tracing::{debug, info};

use super::entry::CheckpointEntry;
use super::lock::CheckpointLock;

pub struct CheckpointStore {
    path: PathBuf,
    entries: Mutex<Vec<CheckpointEntry>>,
    _lock: CheckpointLock,
}

impl std::fmt::Debug for CheckpointStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CheckpointStore")
            .field("path", &self.path)
            .finish_non_exhaustive()
    }
}

/// Read the entries in a checkpoint file. A missing or blank file is empty.
pub fn load(path: &Path) -> Result<Vec<CheckpointEntry>> {
    if !path.exists() {
        return Ok(Vec::new());
    }
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read checkpoint file: {}", path.display()))?;
    if content.trim().is_empty() {
        return Ok(Vec::new());
    }
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse checkpoint file: {}", path.display()))
}

impl CheckpointStore {
    /// Lock the checkpoint file for this process and load its entries.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create checkpoint directory: {}", parent.display())
            })?;
        }
        let lock = CheckpointLock::acquire(path)?;
        let entries = load(path)?;
        if !entries.is_empty() {
            info!(
                path = %path.display(),
                pending = entries.len(),
                "loaded pending checkpoint entries"
            );
        }
        Ok(Self {
            path: path.to_path_buf(),
            entries: Mutex::new(entries),
            _lock: lock,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Snapshot of the pending entries, oldest first.
    pub fn pending(&self) -> Result<Vec<CheckpointEntry>> {
        Ok(self.guard()?.clone())
    }

    pub fn len(&self) -> Result<usize> {
        Ok(self.guard()?.len())
    }

    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.guard()?.is_empty())
    }

    /// Record a failed window and persist.
    pub fn append(&self, entry: CheckpointEntry) -> Result<()> {
        let mut entries = self.guard()?;
        let mut next = entries.clone();
        debug!(entry = %entry, "appending checkpoint entry");
        next.push(entry);
        self.persist(&next)?;
        *entries = next;
        Ok(())
    }

    /// Take the most recently appended entry and persist.
    pub fn pop_one(&self) -> Result<Option<CheckpointEntry>> {
        let mut entries = self.guard()?;
        let mut next = entries.clone();
        let Some(popped) = next.pop() else {
            return Ok(None);
        };
        self.persist(&next)?;
        *entries = next;
        Ok(Some(popped))
    }

    /// Delete the first entry equal to `entry` and persist.
    ///
    /// Returns false (and writes nothing) when no such entry is pending.
    pub fn remove(&self, entry: &CheckpointEntry) -> Result<bool> {
        let mut entries = self.guard()?;
        let Some(index) = entries.iter().position(|e| e == entry) else {
            return Ok(false);
        };
        let mut next = entries.clone();
        next.remove(index);
        self.persist(&next)?;
        *entries = next;
        Ok(true)
    }

    fn guard(&self) -> Result<MutexGuard<'_, Vec<CheckpointEntry>>> {
        self.entries
            .lock()
            .map_err(|_| anyhow!("Checkpoint store lock poisoned"))
    }

    fn persist(&self, entries: &[CheckpointEntry]) -> Result<()> {
        let dir = match self.path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        let json =
            serde_json::to_string_pretty(entries).context("Failed to serialize checkpoints")?;

        let mut temp = NamedTempFile::new_in(dir).with_context(|| {
            format!("Failed to create temp file in {}", dir.display())
        })?;
        temp.write_all(json.as_bytes())
            .and_then(|_| temp.as_file().sync_all())
            .with_context(|| format!("Failed to write temp file for {}", self.path.display()))?;
        temp.persist(&self.path)
            .with_context(|| format!("Failed to replace checkpoint file: {}", self.path.display()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TimeFormat, TimeWindow};
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn entry(minute: u32) -> CheckpointEntry {
        CheckpointEntry::from_window(&TimeWindow {
            measurement: "cpu".to_string(),
            start: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute, 0).unwrap(),
            end: Utc.with_ymd_and_hms(2024, 1, 1, 0, minute + 5, 0).unwrap(),
            bucket: "cpu".to_string(),
            time_format: TimeFormat::WholeSeconds,
        })
    }

    #[test]
    fn test_missing_file_is_empty_store() {
        let temp = TempDir::new().unwrap();
        let store = CheckpointStore::open(&temp.path().join("writeobj.json")).unwrap();
        assert!(store.is_empty().unwrap());
        assert!(store.pop_one().unwrap().is_none());
        assert!(!temp.path().join("writeobj.json").exists());
    }

    #[test]
    fn test_append_survives_reopen() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("writeobj.json");
        {
            let store = CheckpointStore::open(&path).unwrap();
            store.append(entry(0)).unwrap();
            store.append(entry(5)).unwrap();
        }
        let store = CheckpointStore::open(&path).unwrap();
        assert_eq!(store.pending().unwrap(), vec![entry(0), entry(5)]);
    }

    #[test]
    fn test_pop_one_is_lifo_and_persisted() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("writeobj.json");
        let store = CheckpointStore::open(&path).unwrap();
        store.append(entry(0)).unwrap();
        store.append(entry(5)).unwrap();

        assert_eq!(store.pop_one().unwrap(), Some(entry(5)));
        assert_eq!(load(&path).unwrap(), vec![entry(0)]);
        assert_eq!(store.pop_one().unwrap(), Some(entry(0)));
        assert!(load(&path).unwrap().is_empty());
    }

    #[test]
    fn test_remove_specific_entry() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("writeobj.json");
        let store = CheckpointStore::open(&path).unwrap();
        for minute in [0, 5, 10] {
            store.append(entry(minute)).unwrap();
        }
        assert!(store.remove(&entry(5)).unwrap());
        assert!(!store.remove(&entry(5)).unwrap());
        assert_eq!(load(&path).unwrap(), vec![entry(0), entry(10)]);
    }

    #[test]
    fn test_file_is_a_pretty_json_list() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("writeobj.json");
        let store = CheckpointStore::open(&path).unwrap();
        store.append(entry(0)).unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert!(content.starts_with("[\n"));
        let value: serde_json::Value = serde_json::from_str(&content).unwrap();
        assert_eq!(value[0]["start_dt"], "2024-01-01T00:00:00Z");
        assert_eq!(value[0]["time_format"], "%Y-%m-%dT%H:%M:%SZ");
    }

    #[test]
    fn test_second_open_is_refused() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("writeobj.json");
        let _store = CheckpointStore::open(&path).unwrap();
        assert!(CheckpointStore::open(&path).is_err());
    }

    #[test]
    fn test_corrupt_file_is_an_error() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("writeobj.json");
        fs::write(&path, "{not json").unwrap();
        assert!(CheckpointStore::open(&path).is_err());
    }

    #[test]
    fn test_nested_directory_is_created() {
        let temp = TempDir::new().unwrap();
        let path = temp.path().join("state").join("writeobj.json");
        let store = CheckpointStore::open(&path).unwrap();
        store.append(entry(0)).unwrap();
        assert!(path.exists());
    }
}
