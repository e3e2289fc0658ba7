//! Identity store (IMM)
//!
//! Exact key-value user attributes. Never embedded, never semantically
//! searched. For any key the canonical fact is the stored one with the
//! highest confidence; older duplicates are kept as history.

use std::sync::Arc;

use chrono::Utc;
use tracing::debug;

use crate::error::{MemoryError, MemoryResult};
use crate::storage::{decode, encode, Collection, Storage};
use crate::types::IdentityFact;

pub struct IdentityStore {
    storage: Arc<dyn Storage>,
}

impl IdentityStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn put(&self, fact: IdentityFact) -> MemoryResult<()> {
        debug!("Storing identity fact {}={}", fact.key, fact.value);
        let bytes = encode(&fact)?;
        self.storage.put(Collection::Identity, &fact.id, bytes).await
    }

    pub async fn get(&self, id: &str) -> MemoryResult<Option<IdentityFact>> {
        match self.storage.get(Collection::Identity, id).await? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn get_all(&self) -> MemoryResult<Vec<IdentityFact>> {
        let records = self.storage.list(Collection::Identity).await?;
        let mut facts = Vec::with_capacity(records.len());
        for bytes in records {
            facts.push(decode(&bytes)?);
        }
        Ok(facts)
    }

    /// The canonical fact for a key: highest confidence, ties broken by
    /// most recent confirmation.
    pub async fn get_by_key(&self, key: &str) -> MemoryResult<Option<IdentityFact>> {
        let key = key.to_lowercase();
        let facts = self.get_all().await?;
        Ok(facts
            .into_iter()
            .filter(|fact| fact.key == key)
            .max_by(|a, b| {
                a.confidence
                    .partial_cmp(&b.confidence)
                    .unwrap_or(std::cmp::Ordering::Equal)
                    .then(a.last_confirmed.cmp(&b.last_confirmed))
            }))
    }

    /// Reinforce a fact: raise confidence (capped at 1.0), bump the
    /// confirmation count, refresh the confirmation timestamp.
    pub async fn update_confidence(&self, id: &str, confidence: f32) -> MemoryResult<IdentityFact> {
        let mut fact = self
            .get(id)
            .await?
            .ok_or_else(|| MemoryError::store(format!("identity fact not found: {id}")))?;

        fact.confidence = confidence.clamp(0.0, 1.0);
        fact.confirmation_count += 1;
        fact.last_confirmed = Utc::now();

        self.storage
            .put(Collection::Identity, id, encode(&fact)?)
            .await?;
        Ok(fact)
    }

    /// Conflict resolution replacement: swap in the new value at reduced
    /// confidence and restart the confirmation count.
    pub async fn replace_value(&self, id: &str, new_value: &str) -> MemoryResult<IdentityFact> {
        let mut fact = self
            .get(id)
            .await?
            .ok_or_else(|| MemoryError::store(format!("identity fact not found: {id}")))?;

        fact.value = new_value.to_string();
        fact.confidence = 0.7;
        fact.confirmation_count = 1;
        fact.last_confirmed = Utc::now();

        self.storage
            .put(Collection::Identity, id, encode(&fact)?)
            .await?;
        Ok(fact)
    }

    pub async fn delete(&self, id: &str) -> MemoryResult<bool> {
        self.storage.delete(Collection::Identity, id).await
    }

    pub async fn clear(&self) -> MemoryResult<()> {
        self.storage.clear(Collection::Identity).await
    }

    pub async fn count(&self) -> MemoryResult<usize> {
        self.storage.count(Collection::Identity).await
    }

    /// Case-insensitive substring match over key, value, and category,
    /// sorted by confidence descending.
    pub async fn search(&self, query: &str) -> MemoryResult<Vec<IdentityFact>> {
        let needle = query.to_lowercase();
        let mut matches: Vec<IdentityFact> = self
            .get_all()
            .await?
            .into_iter()
            .filter(|fact| {
                fact.key.to_lowercase().contains(&needle)
                    || fact.value.to_lowercase().contains(&needle)
                    || fact.category.to_string().contains(&needle)
            })
            .collect();

        matches.sort_by(|a, b| {
            b.confidence
                .partial_cmp(&a.confidence)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(matches)
    }
}
