//! File-backed storage
//!
//! Each collection lives in memory and is snapshotted to a
//! zstd-compressed bincode file on every mutation. The correction log is
//! an append-only JSONL file guarded by an advisory lock.

use std::collections::HashMap;
use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Seek, SeekFrom, Write};
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use tokio::fs as tokio_fs;
use tokio::sync::RwLock;
use tracing::{debug, info};

#[cfg(unix)]
use fs2::FileExt;
#[cfg(unix)]
use std::os::unix::fs::OpenOptionsExt;

use crate::error::{MemoryError, MemoryResult};

use super::{Collection, Storage};

const SNAPSHOT_EXTENSION: &str = "mem";
const ZSTD_LEVEL: i32 = 3;
const LOCK_RETRIES: usize = 10;
const LOCK_RETRY_SLEEP: Duration = Duration::from_millis(100);

type Table = HashMap<String, Vec<u8>>;

/// Durable storage rooted at a data directory.
pub struct FileStorage {
    dir: PathBuf,
    tables: RwLock<HashMap<Collection, Table>>,
}

impl FileStorage {
    /// Open (or create) the data directory and load existing snapshots.
    pub fn open(dir: impl Into<PathBuf>) -> MemoryResult<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)?;

        let mut tables = HashMap::new();
        for collection in Collection::ALL {
            let path = dir
                .join(collection.name())
                .with_extension(SNAPSHOT_EXTENSION);
            let table = if path.exists() {
                let file = File::open(&path)?;
                let decoder = zstd::stream::read::Decoder::new(file)?;
                let table: Table = bincode::deserialize_from(decoder)?;
                info!(
                    "Loaded {} {} records from {:?}",
                    table.len(),
                    collection.name(),
                    path
                );
                table
            } else {
                Table::new()
            };
            tables.insert(collection, table);
        }

        Ok(Self {
            dir,
            tables: RwLock::new(tables),
        })
    }

    fn snapshot_path(&self, collection: Collection) -> PathBuf {
        self.dir
            .join(collection.name())
            .with_extension(SNAPSHOT_EXTENSION)
    }

    fn blob_path(&self, name: &str) -> PathBuf {
        self.dir.join(name).with_extension("bin")
    }

    fn log_path(&self, name: &str) -> PathBuf {
        self.dir.join(name).with_extension("jsonl")
    }

    /// Write the current state of a collection to its snapshot file.
    async fn flush(&self, collection: Collection) -> MemoryResult<()> {
        let snapshot = {
            let tables = self.tables.read().await;
            tables.get(&collection).cloned().unwrap_or_default()
        };
        let path = self.snapshot_path(collection);

        tokio::task::spawn_blocking(move || -> MemoryResult<()> {
            let file = File::create(&path)?;
            let writer = BufWriter::new(file);
            let mut encoder = zstd::stream::write::Encoder::new(writer, ZSTD_LEVEL)
                .map_err(|e| MemoryError::store(e.to_string()))?;
            bincode::serialize_into(&mut encoder, &snapshot)?;
            encoder
                .finish()
                .map_err(|e| MemoryError::store(e.to_string()))?;
            Ok(())
        })
        .await
        .map_err(|e| MemoryError::store(format!("snapshot task failed: {e}")))??;

        debug!("Flushed {} snapshot", collection.name());
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn put(&self, collection: Collection, id: &str, record: Vec<u8>) -> MemoryResult<()> {
        {
            let mut tables = self.tables.write().await;
            tables
                .entry(collection)
                .or_default()
                .insert(id.to_string(), record);
        }
        self.flush(collection).await
    }

    async fn get(&self, collection: Collection, id: &str) -> MemoryResult<Option<Vec<u8>>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&collection)
            .and_then(|table| table.get(id))
            .cloned())
    }

    async fn delete(&self, collection: Collection, id: &str) -> MemoryResult<bool> {
        let removed = {
            let mut tables = self.tables.write().await;
            tables
                .get_mut(&collection)
                .map(|table| table.remove(id).is_some())
                .unwrap_or(false)
        };
        if removed {
            self.flush(collection).await?;
        }
        Ok(removed)
    }

    async fn list(&self, collection: Collection) -> MemoryResult<Vec<Vec<u8>>> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&collection)
            .map(|table| table.values().cloned().collect())
            .unwrap_or_default())
    }

    async fn clear(&self, collection: Collection) -> MemoryResult<()> {
        {
            let mut tables = self.tables.write().await;
            tables.insert(collection, Table::new());
        }
        self.flush(collection).await
    }

    async fn count(&self, collection: Collection) -> MemoryResult<usize> {
        let tables = self.tables.read().await;
        Ok(tables
            .get(&collection)
            .map(|table| table.len())
            .unwrap_or(0))
    }

    async fn put_blob(&self, name: &str, bytes: Vec<u8>) -> MemoryResult<()> {
        tokio_fs::write(self.blob_path(name), bytes).await?;
        Ok(())
    }

    async fn get_blob(&self, name: &str) -> MemoryResult<Option<Vec<u8>>> {
        let path = self.blob_path(name);
        if !path.exists() {
            return Ok(None);
        }
        Ok(Some(tokio_fs::read(path).await?))
    }

    async fn append_line(&self, name: &str, line: &str) -> MemoryResult<()> {
        let path = self.log_path(name);
        let mut payload = line.to_string();
        payload.push('\n');

        let mut options = OpenOptions::new();
        options.read(true).write(true).create(true);
        #[cfg(unix)]
        {
            options.append(true);
            options.mode(0o600);
        }
        let mut file = options.open(&path)?;

        tokio::task::spawn_blocking(move || -> MemoryResult<()> {
            for _ in 0..LOCK_RETRIES {
                #[cfg(unix)]
                match file.try_lock_exclusive() {
                    Ok(()) => {
                        file.seek(SeekFrom::End(0))?;
                        file.write_all(payload.as_bytes())?;
                        file.flush()?;
                        let _ = fs2::FileExt::unlock(&file);
                        return Ok(());
                    }
                    Err(_) => {
                        std::thread::sleep(LOCK_RETRY_SLEEP);
                    }
                }
                #[cfg(not(unix))]
                {
                    file.seek(SeekFrom::End(0))?;
                    file.write_all(payload.as_bytes())?;
                    file.flush()?;
                    return Ok(());
                }
            }

            Err(MemoryError::store(
                "could not acquire exclusive lock on log file",
            ))
        })
        .await
        .map_err(|e| MemoryError::store(format!("log append task failed: {e}")))??;

        Ok(())
    }

    async fn read_lines(&self, name: &str) -> MemoryResult<Vec<String>> {
        let path = self.log_path(name);
        if !path.exists() {
            return Ok(Vec::new());
        }

        let content = tokio_fs::read_to_string(path).await?;
        Ok(content
            .lines()
            .filter(|line| !line.trim().is_empty())
            .map(|line| line.to_string())
            .collect())
    }
}
