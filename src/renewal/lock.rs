//! Per-MD advisory lock (§5): an exclusively-created lockfile under
//! `STAGING/<md>/lock`, holding the locking process's PID and a timestamp.
//! Grounded loosely on `original_source`'s `md_store.c` directory-based
//! filesystem operations, since the `Store` trait itself has no exclusive-
//! create primitive to build this on top of.

use crate::error::{DriverError, Result};
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::fs::OpenOptions;
use tokio::io::AsyncWriteExt;

/// Holds an exclusive lock on one MD's staging directory for as long as it
/// lives; the lockfile is removed on drop (best-effort, synchronously).
pub struct MdLock {
    path: PathBuf,
}

impl MdLock {
    /// Attempts to acquire the lock for `md_name` under `staging_root`
    /// (typically `<store-root>/staging/<md_name>/lock`). Returns `Ok(None)`
    /// if another holder already owns it rather than erroring, since a busy
    /// lock is an expected scheduling outcome, not a fault.
    pub async fn try_acquire(staging_root: &Path, md_name: &str) -> Result<Option<Self>> {
        let dir = staging_root.join(md_name);
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| DriverError::store_io(format!("create {}: {}", dir.display(), e)))?;
        let path = dir.join("lock");

        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path).await {
            Ok(file) => file,
            Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => return Ok(None),
            Err(e) => return Err(DriverError::store_io(format!("create {}: {}", path.display(), e))),
        };

        let payload = format!("pid={} ts={}\n", std::process::id(), now_secs());
        file.write_all(payload.as_bytes())
            .await
            .map_err(|e| DriverError::store_io(format!("write {}: {}", path.display(), e)))?;

        Ok(Some(Self { path }))
    }
}

impl Drop for MdLock {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.path);
    }
}

fn now_secs() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn second_acquire_fails_while_first_is_held() {
        let dir = std::env::temp_dir().join(format!("acmed-lock-test-{}", rand::random::<u64>()));
        let first = MdLock::try_acquire(&dir, "a.test").await.unwrap();
        assert!(first.is_some());
        let second = MdLock::try_acquire(&dir, "a.test").await.unwrap();
        assert!(second.is_none());
    }

    #[tokio::test]
    async fn lock_is_released_on_drop() {
        let dir = std::env::temp_dir().join(format!("acmed-lock-test-{}", rand::random::<u64>()));
        {
            let _first = MdLock::try_acquire(&dir, "a.test").await.unwrap();
        }
        let second = MdLock::try_acquire(&dir, "a.test").await.unwrap();
        assert!(second.is_some());
    }
}
