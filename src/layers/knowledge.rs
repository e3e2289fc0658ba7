//! Knowledge store (KMM)
//!
//! Durable skills and concepts. Embeddings are mandatory at insert time;
//! reinforcement raises confidence and boosts future search scores.

use std::sync::Arc;

use tracing::debug;

use crate::error::{MemoryError, MemoryResult};
use crate::layers::Scored;
use crate::similarity::cosine;
use crate::storage::{decode, encode, Collection, Storage};
use crate::types::{KnowledgeCategory, KnowledgeEntry};

/// Confidence gained per reinforcement.
pub const REINFORCEMENT_STEP: f32 = 0.05;
/// Search boost ceiling from repeated reinforcement.
const MAX_BOOST: f32 = 2.0;

pub struct KnowledgeStore {
    storage: Arc<dyn Storage>,
}

impl KnowledgeStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn put(&self, entry: KnowledgeEntry) -> MemoryResult<()> {
        if entry.embedding.is_empty() {
            return Err(MemoryError::MissingEmbedding);
        }
        debug!("Storing knowledge entry ({:?})", entry.category);
        let bytes = encode(&entry)?;
        self.storage
            .put(Collection::Knowledge, &entry.id, bytes)
            .await
    }

    pub async fn get(&self, id: &str) -> MemoryResult<Option<KnowledgeEntry>> {
        match self.storage.get(Collection::Knowledge, id).await? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn get_all(&self) -> MemoryResult<Vec<KnowledgeEntry>> {
        let records = self.storage.list(Collection::Knowledge).await?;
        let mut entries = Vec::with_capacity(records.len());
        for bytes in records {
            entries.push(decode(&bytes)?);
        }
        Ok(entries)
    }

    pub async fn get_by_category(
        &self,
        category: KnowledgeCategory,
    ) -> MemoryResult<Vec<KnowledgeEntry>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|entry| entry.category == category)
            .collect())
    }

    /// Reinforce: +1 count, +0.05 confidence capped at 1.0.
    pub async fn reinforce(&self, id: &str) -> MemoryResult<KnowledgeEntry> {
        let mut entry = self
            .get(id)
            .await?
            .ok_or_else(|| MemoryError::store(format!("knowledge entry not found: {id}")))?;

        entry.reinforcement_count += 1;
        entry.confidence = (entry.confidence + REINFORCEMENT_STEP).min(1.0);

        let bytes = encode(&entry)?;
        self.storage
            .put(Collection::Knowledge, &entry.id, bytes)
            .await?;
        Ok(entry)
    }

    pub async fn delete(&self, id: &str) -> MemoryResult<bool> {
        self.storage.delete(Collection::Knowledge, id).await
    }

    pub async fn clear(&self) -> MemoryResult<()> {
        self.storage.clear(Collection::Knowledge).await
    }

    pub async fn count(&self) -> MemoryResult<usize> {
        self.storage.count(Collection::Knowledge).await
    }

    /// Semantic search with a reinforcement boost:
    /// score = similarity x confidence x min(2.0, 1 + 0.1 x count).
    pub async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f32,
    ) -> MemoryResult<Vec<Scored<KnowledgeEntry>>> {
        let mut hits: Vec<Scored<KnowledgeEntry>> = Vec::new();

        for entry in self.get_all().await? {
            let similarity = cosine(query_embedding, &entry.embedding);
            let boost = (1.0 + 0.1 * entry.reinforcement_count as f32).min(MAX_BOOST);
            let score = similarity * entry.confidence * boost;

            if score >= threshold {
                hits.push(Scored {
                    item: entry,
                    similarity,
                    score,
                });
            }
        }

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(top_k);
        Ok(hits)
    }
}
