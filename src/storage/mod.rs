//! Persistent store seam
//!
//! The storage engine is an external collaborator: four logical
//! collections keyed by string id, plus two named router artifacts
//! (the `weights` blob and the append-only `corrections` log).
//! Records cross the seam as serialized JSON bytes with stable field
//! names and ISO-8601 timestamps.

pub mod file;
pub mod memory;

pub use file::FileStorage;
pub use memory::MemoryStorage;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::error::MemoryResult;

/// Router weights blob name.
pub const WEIGHTS_BLOB: &str = "weights";
/// Correction log name.
pub const CORRECTIONS_LOG: &str = "corrections";

/// The typed collections.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Collection {
    Identity,
    Experience,
    Knowledge,
}

impl Collection {
    pub const ALL: [Collection; 3] = [
        Collection::Identity,
        Collection::Experience,
        Collection::Knowledge,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Collection::Identity => "identity",
            Collection::Experience => "experience",
            Collection::Knowledge => "knowledge",
        }
    }
}

/// Key-value object store with typed collections.
#[async_trait]
pub trait Storage: Send + Sync {
    async fn put(&self, collection: Collection, id: &str, record: Vec<u8>) -> MemoryResult<()>;
    async fn get(&self, collection: Collection, id: &str) -> MemoryResult<Option<Vec<u8>>>;
    /// Returns true when a record was removed.
    async fn delete(&self, collection: Collection, id: &str) -> MemoryResult<bool>;
    async fn list(&self, collection: Collection) -> MemoryResult<Vec<Vec<u8>>>;
    async fn clear(&self, collection: Collection) -> MemoryResult<()>;
    async fn count(&self, collection: Collection) -> MemoryResult<usize>;

    /// Named blob in the router slot (weights).
    async fn put_blob(&self, name: &str, bytes: Vec<u8>) -> MemoryResult<()>;
    async fn get_blob(&self, name: &str) -> MemoryResult<Option<Vec<u8>>>;

    /// Append one line to a named log (corrections).
    async fn append_line(&self, name: &str, line: &str) -> MemoryResult<()>;
    async fn read_lines(&self, name: &str) -> MemoryResult<Vec<String>>;
}

/// Serialize a record for the store.
pub fn encode<T: Serialize>(record: &T) -> MemoryResult<Vec<u8>> {
    Ok(serde_json::to_vec(record)?)
}

/// Deserialize a record from the store.
pub fn decode<T: DeserializeOwned>(bytes: &[u8]) -> MemoryResult<T> {
    Ok(serde_json::from_slice(bytes)?)
}
