//! In-memory storage
//!
//! HashMap-backed implementation of the storage seam. Used by tests and
//! as a scratch store when no data directory is configured.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;

use crate::error::MemoryResult;

use super::{Collection, Storage};

#[derive(Default)]
struct Tables {
    collections: HashMap<Collection, HashMap<String, Vec<u8>>>,
    blobs: HashMap<String, Vec<u8>>,
    logs: HashMap<String, Vec<String>>,
}

/// Volatile storage; contents are lost on drop.
#[derive(Default)]
pub struct MemoryStorage {
    tables: RwLock<Tables>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Storage for MemoryStorage {
    async fn put(&self, collection: Collection, id: &str, record: Vec<u8>) -> MemoryResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .collections
            .entry(collection)
            .or_default()
            .insert(id.to_string(), record);
        Ok(())
    }

    async fn get(&self, collection: Collection, id: &str) -> MemoryResult<Option<Vec<u8>>> {
        let tables = self.tables.read().await;
        Ok(tables
            .collections
            .get(&collection)
            .and_then(|table| table.get(id))
            .cloned())
    }

    async fn delete(&self, collection: Collection, id: &str) -> MemoryResult<bool> {
        let mut tables = self.tables.write().await;
        Ok(tables
            .collections
            .get_mut(&collection)
            .map(|table| table.remove(id).is_some())
            .unwrap_or(false))
    }

    async fn list(&self, collection: Collection) -> MemoryResult<Vec<Vec<u8>>> {
        let tables = self.tables.read().await;
        Ok(tables
            .collections
            .get(&collection)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, collection: Collection) -> MemoryResult<()> {
        let mut tables = self.tables.write().await;
        tables.collections.remove(&collection);
        Ok(())
    }

    async fn count(&self, collection: Collection) -> MemoryResult<usize> {
        let tables = self.tables.read().await;
        Ok(tables
            .collections
            .get(&collection)
            .map(|table| table.len())
            .unwrap_or(0))
    }

    async fn put_blob(&self, name: &str, bytes: Vec<u8>) -> MemoryResult<()> {
        let mut tables = self.tables.write().await;
        tables.blobs.insert(name.to_string(), bytes);
        Ok(())
    }

    async fn get_blob(&self, name: &str) -> MemoryResult<Option<Vec<u8>>> {
        let tables = self.tables.read().await;
        Ok(tables.blobs.get(name).cloned())
    }

    async fn append_line(&self, name: &str, line: &str) -> MemoryResult<()> {
        let mut tables = self.tables.write().await;
        tables
            .logs
            .entry(name.to_string())
            .or_default()
            .push(line.to_string());
        Ok(())
    }

    async fn read_lines(&self, name: &str) -> MemoryResult<Vec<String>> {
        let tables = self.tables.read().await;
        Ok(tables.logs.get(name).cloned().unwrap_or_default())
    }
}
