//! Filesystem-backed [`Store`]: each group is a top-level directory, each
//! name a subdirectory, each file a plain file. Writes land in a sibling
//! temp file first and are renamed into place, so a crash mid-write never
//! leaves a reader looking at truncated data — grounded on
//! `original_source`'s `md_store.c` fs backend (`md_json_freplace`).

use super::{Group, Store};
use crate::error::{DriverError, Result};
use async_trait::async_trait;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use tokio::fs;

/// §4.1 / §6: directories are owner-only, key material is owner read/write only.
const DIR_MODE: u32 = 0o700;
const FILE_MODE: u32 = 0o600;

pub struct FileStore {
    root: PathBuf,
}

impl FileStore {
    pub fn new(root: impl AsRef<Path>) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
        }
    }

    fn dir(&self, group: Group, name: &str) -> PathBuf {
        self.root.join(group.dirname()).join(sanitize(name))
    }
}

/// `create_dir_all` then force the leaf directory to `DIR_MODE`, regardless
/// of umask or whether the directory already existed.
async fn create_dir_all_locked(dir: &Path) -> std::io::Result<()> {
    fs::create_dir_all(dir).await?;
    fs::set_permissions(dir, std::fs::Permissions::from_mode(DIR_MODE)).await
}

/// MD names are domain names; this still guards against a path-traversal
/// name sneaking through a config file.
fn sanitize(name: &str) -> String {
    name.chars()
        .map(|c| if c == '/' || c == '\\' || c == '.' { '_' } else { c })
        .collect()
}

#[async_trait]
impl Store for FileStore {
    async fn write(&self, group: Group, name: &str, file: &str, data: &[u8]) -> Result<()> {
        let dir = self.dir(group, name);
        create_dir_all_locked(&dir)
            .await
            .map_err(|e| DriverError::store_io(format!("create {}: {}", dir.display(), e)))?;

        let target = dir.join(file);
        let tmp = dir.join(format!(".{}.tmp-{}", file, std::process::id()));
        fs::write(&tmp, data)
            .await
            .map_err(|e| DriverError::store_io(format!("write {}: {}", tmp.display(), e)))?;
        fs::set_permissions(&tmp, std::fs::Permissions::from_mode(FILE_MODE))
            .await
            .map_err(|e| DriverError::store_io(format!("chmod {}: {}", tmp.display(), e)))?;
        fs::rename(&tmp, &target).await.map_err(|e| {
            DriverError::store_io(format!("rename {} -> {}: {}", tmp.display(), target.display(), e))
        })?;
        Ok(())
    }

    async fn read(&self, group: Group, name: &str, file: &str) -> Result<Option<Vec<u8>>> {
        let path = self.dir(group, name).join(file);
        match fs::read(&path).await {
            Ok(data) => Ok(Some(data)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(DriverError::store_io(format!("read {}: {}", path.display(), e))),
        }
    }

    async fn remove(&self, group: Group, name: &str, file: &str) -> Result<()> {
        let path = self.dir(group, name).join(file);
        match fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(_) if !path.exists() => Ok(()),
            Err(e) => Err(DriverError::store_io(format!("remove {}: {}", path.display(), e))),
        }
    }

    async fn remove_all(&self, group: Group, name: &str) -> Result<()> {
        let dir = self.dir(group, name);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(DriverError::store_io(format!("purge {}: {}", dir.display(), e))),
        }
    }

    async fn rename(&self, from_group: Group, to_group: Group, name: &str) -> Result<()> {
        let from = self.dir(from_group, name);
        let to = self.dir(to_group, name);
        if let Some(parent) = to.parent() {
            create_dir_all_locked(parent)
                .await
                .map_err(|e| DriverError::store_io(format!("create {}: {}", parent.display(), e)))?;
        }
        if to.exists() {
            fs::remove_dir_all(&to)
                .await
                .map_err(|e| DriverError::store_io(format!("replace {}: {}", to.display(), e)))?;
        }
        fs::rename(&from, &to).await.map_err(|e| {
            DriverError::store_io(format!("move {} -> {}: {}", from.display(), to.display(), e))
        })
    }

    async fn names(&self, group: Group) -> Result<Vec<String>> {
        let dir = self.root.join(group.dirname());
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(DriverError::store_io(format!("list {}: {}", dir.display(), e))),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DriverError::store_io(format!("list {}: {}", dir.display(), e)))?
        {
            if entry.file_type().await.map(|t| t.is_dir()).unwrap_or(false) {
                out.push(entry.file_name().to_string_lossy().into_owned());
            }
        }
        out.sort();
        Ok(out)
    }

    async fn files(&self, group: Group, name: &str) -> Result<Vec<String>> {
        let dir = self.dir(group, name);
        let mut out = Vec::new();
        let mut entries = match fs::read_dir(&dir).await {
            Ok(e) => e,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(out),
            Err(e) => return Err(DriverError::store_io(format!("list {}: {}", dir.display(), e))),
        };
        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| DriverError::store_io(format!("list {}: {}", dir.display(), e)))?
        {
            let file_name = entry.file_name().to_string_lossy().into_owned();
            if !file_name.starts_with(".") {
                out.push(file_name);
            }
        }
        out.sort();
        Ok(out)
    }
}
