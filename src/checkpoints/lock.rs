//! Advisory lock that keeps two processes off the same checkpoint file.

use anyhow::{bail, Context, Result};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

/// Exclusive `fs2` lock on `<checkpoint file>.lock`, held until dropped.
///
/// The lock file itself is left on disk; only the lock matters.
#[derive(Debug)]
pub struct CheckpointLock {
    path: PathBuf,
    file: File,
}

impl CheckpointLock {
    pub fn lock_path(checkpoint_path: &Path) -> PathBuf {
        let mut name = checkpoint_path.as_os_str().to_os_string();
        name.push(".lock");
        PathBuf::from(name)
    }

    /// Take the lock without waiting.
    pub fn acquire(checkpoint_path: &Path) -> Result<Self> {
        let path = Self::lock_path(checkpoint_path);
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("Failed to open lock file: {}", path.display()))?;
        if FileExt::try_lock_exclusive(&file).is_err() {
            bail!(
                "Checkpoint file {} is in use by another migration process",
                checkpoint_path.display()
            );
        }
        file.set_len(0)
            .with_context(|| format!("Failed to truncate lock file: {}", path.display()))?;
        writeln!(file, "pid={}", std::process::id())
            .with_context(|| format!("Failed to write lock file: {}", path.display()))?;
        Ok(Self { path, file })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for CheckpointLock {
    fn drop(&mut self) {
        FileExt::unlock(&self.file).ok();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_lock_is_exclusive_until_dropped() {
        let temp = TempDir::new().unwrap();
        let checkpoint = temp.path().join("writeobj.json");

        let first = CheckpointLock::acquire(&checkpoint).unwrap();
        assert_eq!(first.path(), temp.path().join("writeobj.json.lock"));
        assert!(CheckpointLock::acquire(&checkpoint).is_err());

        drop(first);
        assert!(CheckpointLock::acquire(&checkpoint).is_ok());
    }
}
