//! In-memory [`Store`] for unit/integration tests — never a production
//! default, since its records vanish when the process exits, defeating
//! the whole point of a restart-resumable driver (§2.9/§4.1).

use super::{Group, Store};
use crate::error::Result;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

type Record = HashMap<String, Vec<u8>>;
type GroupTable = HashMap<String, Record>;

#[derive(Default)]
pub struct MemoryStore {
    groups: RwLock<HashMap<&'static str, GroupTable>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn write(&self, group: Group, name: &str, file: &str, data: &[u8]) -> Result<()> {
        let mut groups = self.groups.write().await;
        groups
            .entry(group.dirname())
            .or_default()
            .entry(name.to_string())
            .or_default()
            .insert(file.to_string(), data.to_vec());
        Ok(())
    }

    async fn read(&self, group: Group, name: &str, file: &str) -> Result<Option<Vec<u8>>> {
        let groups = self.groups.read().await;
        Ok(groups
            .get(group.dirname())
            .and_then(|g| g.get(name))
            .and_then(|r| r.get(file))
            .cloned())
    }

    async fn remove(&self, group: Group, name: &str, file: &str) -> Result<()> {
        let mut groups = self.groups.write().await;
        if let Some(g) = groups.get_mut(group.dirname()) {
            if let Some(r) = g.get_mut(name) {
                r.remove(file);
            }
        }
        Ok(())
    }

    async fn remove_all(&self, group: Group, name: &str) -> Result<()> {
        let mut groups = self.groups.write().await;
        if let Some(g) = groups.get_mut(group.dirname()) {
            g.remove(name);
        }
        Ok(())
    }

    async fn rename(&self, from_group: Group, to_group: Group, name: &str) -> Result<()> {
        let mut groups = self.groups.write().await;
        let record = groups
            .get_mut(from_group.dirname())
            .and_then(|g| g.remove(name))
            .unwrap_or_default();
        groups
            .entry(to_group.dirname())
            .or_default()
            .insert(name.to_string(), record);
        Ok(())
    }

    async fn names(&self, group: Group) -> Result<Vec<String>> {
        let groups = self.groups.read().await;
        let mut names: Vec<String> = groups
            .get(group.dirname())
            .map(|g| g.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        Ok(names)
    }

    async fn files(&self, group: Group, name: &str) -> Result<Vec<String>> {
        let groups = self.groups.read().await;
        let mut files: Vec<String> = groups
            .get(group.dirname())
            .and_then(|g| g.get(name))
            .map(|r| r.keys().cloned().collect())
            .unwrap_or_default();
        files.sort();
        Ok(files)
    }
}
