//! Experience store (EMM)
//!
//! Conversational events whose importance decays exponentially with age,
//! anchored to the importance they had at creation. Semantic search
//! weights cosine similarity by current importance and recency.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::MemoryResult;
use crate::layers::Scored;
use crate::similarity::cosine;
use crate::storage::{decode, encode, Collection, Storage};
use crate::types::{ConversationContext, ExperienceEntry};

/// Importance never decays below this floor.
pub const MIN_IMPORTANCE: f32 = 0.1;
/// Daily multiplicative decay factor.
pub const DECAY_RATE: f32 = 0.95;
/// Recency weighting floor in semantic search.
const RECENCY_FLOOR: f32 = 0.5;
/// Days until recency reaches its floor.
const RECENCY_WINDOW_DAYS: f32 = 30.0;
/// Entries below this importance are hidden from `get_recent`.
const RECENT_MIN_IMPORTANCE: f32 = 0.2;

const SECONDS_PER_DAY: f32 = 86_400.0;

pub struct ExperienceStore {
    storage: Arc<dyn Storage>,
}

impl ExperienceStore {
    pub fn new(storage: Arc<dyn Storage>) -> Self {
        Self { storage }
    }

    pub async fn put(&self, entry: ExperienceEntry) -> MemoryResult<()> {
        debug!(
            "Storing experience (context={}, importance={:.2})",
            entry.context, entry.importance
        );
        let bytes = encode(&entry)?;
        self.storage
            .put(Collection::Experience, &entry.id, bytes)
            .await
    }

    pub async fn get(&self, id: &str) -> MemoryResult<Option<ExperienceEntry>> {
        match self.storage.get(Collection::Experience, id).await? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub async fn get_all(&self) -> MemoryResult<Vec<ExperienceEntry>> {
        let records = self.storage.list(Collection::Experience).await?;
        let mut entries = Vec::with_capacity(records.len());
        for bytes in records {
            entries.push(decode(&bytes)?);
        }
        Ok(entries)
    }

    pub async fn get_by_context(
        &self,
        context: ConversationContext,
    ) -> MemoryResult<Vec<ExperienceEntry>> {
        Ok(self
            .get_all()
            .await?
            .into_iter()
            .filter(|entry| entry.context == context)
            .collect())
    }

    pub async fn delete(&self, id: &str) -> MemoryResult<bool> {
        self.storage.delete(Collection::Experience, id).await
    }

    pub async fn clear(&self) -> MemoryResult<()> {
        self.storage.clear(Collection::Experience).await
    }

    pub async fn count(&self) -> MemoryResult<usize> {
        self.storage.count(Collection::Experience).await
    }

    /// Brute-force semantic search. Entries without embeddings are
    /// invisible here. Score = similarity x importance x recency.
    pub async fn search(
        &self,
        query_embedding: &[f32],
        top_k: usize,
        threshold: f32,
        context: Option<ConversationContext>,
    ) -> MemoryResult<Vec<Scored<ExperienceEntry>>> {
        let now = Utc::now();
        let mut hits: Vec<Scored<ExperienceEntry>> = Vec::new();

        for entry in self.get_all().await? {
            if let Some(filter) = context {
                if entry.context != filter {
                    continue;
                }
            }
            let Some(embedding) = entry.embedding.as_deref() else {
                continue;
            };

            let similarity = cosine(query_embedding, embedding);
            let age_days =
                (now - entry.timestamp).num_seconds().max(0) as f32 / SECONDS_PER_DAY;
            let recency = (1.0 - age_days / RECENCY_WINDOW_DAYS).max(RECENCY_FLOOR);
            let score = similarity * entry.importance * recency;

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

    /// Decay sweep: recompute every entry's importance from its original
    /// importance and age. Writes back only entries that changed, so the
    /// pass is idempotent and safe to run on any schedule. Checks the
    /// cancellation flag between store iterations.
    pub async fn apply_decay(&self, cancel: &AtomicBool) -> MemoryResult<usize> {
        let now = Utc::now();
        let mut updated = 0usize;

        for mut entry in self.get_all().await? {
            if cancel.load(Ordering::Relaxed) {
                info!("Decay sweep cancelled after {updated} updates");
                break;
            }

            let age_days =
                (now - entry.timestamp).num_seconds().max(0) as f32 / SECONDS_PER_DAY;
            let decayed =
                (entry.original_importance * DECAY_RATE.powf(age_days)).max(MIN_IMPORTANCE);

            if (decayed - entry.importance).abs() > f32::EPSILON {
                entry.importance = decayed;
                let bytes = encode(&entry)?;
                self.storage
                    .put(Collection::Experience, &entry.id, bytes)
                    .await?;
                updated += 1;
            }
        }

        if updated > 0 {
            debug!("Decay sweep updated {updated} experience entries");
        }
        Ok(updated)
    }

    /// Recent entries still above the visibility floor, newest first.
    pub async fn get_recent(
        &self,
        limit: usize,
        context: Option<ConversationContext>,
    ) -> MemoryResult<Vec<ExperienceEntry>> {
        let mut entries: Vec<ExperienceEntry> = self
            .get_all()
            .await?
            .into_iter()
            .filter(|entry| entry.importance >= RECENT_MIN_IMPORTANCE)
            .filter(|entry| context.map_or(true, |c| entry.context == c))
            .collect();

        entries.sort_by(|a, b| b.timestamp.cmp(&a.timestamp));
        entries.truncate(limit);
        Ok(entries)
    }

    /// Remove entries whose importance has fallen below the threshold.
    pub async fn prune_below(&self, threshold: f32) -> MemoryResult<usize> {
        let stale: Vec<String> = self
            .get_all()
            .await?
            .into_iter()
            .filter(|entry| entry.importance < threshold)
            .map(|entry| entry.id)
            .collect();

        let mut removed = 0usize;
        for id in stale {
            if self.storage.delete(Collection::Experience, &id).await? {
                removed += 1;
            }
        }

        if removed > 0 {
            info!("Pruned {removed} low-importance experience entries");
        }
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::MemoryStorage;
    use crate::types::Role;
    use chrono::Duration;

    fn store() -> ExperienceStore {
        ExperienceStore::new(Arc::new(MemoryStorage::new()))
    }

    fn entry_with_embedding(content: &str, importance: f32, embedding: Vec<f32>) -> ExperienceEntry {
        ExperienceEntry::new(content, Role::User, importance).with_embedding(embedding)
    }

    #[tokio::test]
    async fn test_put_get_round_trip() {
        let store = store();
        let entry = ExperienceEntry::new("had coffee with Sarah", Role::User, 0.6);
        let id = entry.id.clone();
        store.put(entry).await.unwrap();

        let loaded = store.get(&id).await.unwrap().unwrap();
        assert_eq!(loaded.content, "had coffee with Sarah");
        assert!((loaded.importance - 0.6).abs() < 1e-6);
        assert!((loaded.original_importance - 0.6).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_search_scores_and_truncates() {
        let store = store();
        store
            .put(entry_with_embedding("strong match", 1.0, vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .put(entry_with_embedding("weak match", 1.0, vec![0.6, 0.8]))
            .await
            .unwrap();
        store
            .put(entry_with_embedding("orthogonal", 1.0, vec![0.0, 1.0]))
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 10, 0.3, None).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].item.content, "strong match");
        assert!(hits[0].score > hits[1].score);

        let top_one = store.search(&[1.0, 0.0], 1, 0.3, None).await.unwrap();
        assert_eq!(top_one.len(), 1);
    }

    #[tokio::test]
    async fn test_search_skips_unembedded_and_filters_context() {
        let store = store();
        store
            .put(ExperienceEntry::new("no embedding", Role::User, 0.9))
            .await
            .unwrap();
        store
            .put(
                entry_with_embedding("work thing", 1.0, vec![1.0, 0.0])
                    .with_context(ConversationContext::Work),
            )
            .await
            .unwrap();

        let all = store.search(&[1.0, 0.0], 10, 0.1, None).await.unwrap();
        assert_eq!(all.len(), 1);

        let family = store
            .search(&[1.0, 0.0], 10, 0.1, Some(ConversationContext::Family))
            .await
            .unwrap();
        assert!(family.is_empty());
    }

    #[tokio::test]
    async fn test_importance_weights_search_scores() {
        let store = store();
        store
            .put(entry_with_embedding("important", 1.0, vec![1.0, 0.0]))
            .await
            .unwrap();
        store
            .put(entry_with_embedding("trivial", 0.2, vec![1.0, 0.0]))
            .await
            .unwrap();

        let hits = store.search(&[1.0, 0.0], 10, 0.0, None).await.unwrap();
        assert_eq!(hits[0].item.content, "important");
        assert!(hits[0].score > hits[1].score);
        // Same similarity on both
        assert!((hits[0].similarity - hits[1].similarity).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_decay_respects_floor_and_anchor() {
        let store = store();
        let mut entry = ExperienceEntry::new("old memory", Role::User, 0.8);
        entry.timestamp = Utc::now() - Duration::days(365);
        let id = entry.id.clone();
        store.put(entry).await.unwrap();

        let cancel = AtomicBool::new(false);
        let updated = store.apply_decay(&cancel).await.unwrap();
        assert_eq!(updated, 1);

        let decayed = store.get(&id).await.unwrap().unwrap();
        assert!((decayed.importance - MIN_IMPORTANCE).abs() < 1e-6);
        // The anchor never moves
        assert!((decayed.original_importance - 0.8).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_decay_is_idempotent() {
        let store = store();
        let mut entry = ExperienceEntry::new("last week", Role::User, 0.8);
        entry.timestamp = Utc::now() - Duration::days(7);
        let id = entry.id.clone();
        store.put(entry).await.unwrap();

        let cancel = AtomicBool::new(false);
        store.apply_decay(&cancel).await.unwrap();
        let first = store.get(&id).await.unwrap().unwrap().importance;

        store.apply_decay(&cancel).await.unwrap();
        let second = store.get(&id).await.unwrap().unwrap().importance;

        assert!((first - second).abs() < 1e-4);
        assert!(first < 0.8);
        assert!(first >= MIN_IMPORTANCE);
    }

    #[tokio::test]
    async fn test_decay_observes_cancellation() {
        let store = store();
        let mut entry = ExperienceEntry::new("will not decay now", Role::User, 0.8);
        entry.timestamp = Utc::now() - Duration::days(30);
        store.put(entry).await.unwrap();

        let cancel = AtomicBool::new(true);
        let updated = store.apply_decay(&cancel).await.unwrap();
        assert_eq!(updated, 0);
    }

    #[tokio::test]
    async fn test_get_recent_filters_and_orders() {
        let store = store();

        let mut faded = ExperienceEntry::new("faded", Role::User, 0.15);
        faded.importance = 0.15;
        store.put(faded).await.unwrap();

        let mut older = ExperienceEntry::new("older", Role::User, 0.6);
        older.timestamp = Utc::now() - Duration::hours(5);
        store.put(older).await.unwrap();
        store
            .put(ExperienceEntry::new("newest", Role::User, 0.6))
            .await
            .unwrap();

        let recent = store.get_recent(10, None).await.unwrap();
        assert_eq!(recent.len(), 2);
        assert_eq!(recent[0].content, "newest");
        assert_eq!(recent[1].content, "older");
    }

    #[tokio::test]
    async fn test_prune_below() {
        let store = store();
        let mut weak = ExperienceEntry::new("weak", Role::User, 0.5);
        weak.importance = MIN_IMPORTANCE;
        store.put(weak).await.unwrap();
        store
            .put(ExperienceEntry::new("strong", Role::User, 0.9))
            .await
            .unwrap();

        let removed = store.prune_below(0.2).await.unwrap();
        assert_eq!(removed, 1);
        assert_eq!(store.count().await.unwrap(), 1);
    }
}
