//! Memory engine
//!
//! The public facade over the router, the three layer stores, and the
//! embedding provider. Writes are serialized under one coarse lock so the
//! extraction, conflict check, and persist of a single call never
//! interleave; retrieval is a snapshot read and may miss in-flight
//! entries.

pub mod context;
pub mod importance;
mod retrieve;
mod write;

pub use context::detect_context;
pub use importance::score_importance;

use std::collections::VecDeque;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::embedding::{EmbeddingProvider, EmbeddingStatus};
use crate::error::{MemoryError, MemoryResult};
use crate::layers::{ExperienceStore, IdentityStore, KnowledgeStore};
use crate::router::{Router, RouterConfig};
use crate::storage::Storage;
use crate::types::{
    ConflictAction, IdentityConflict, Layer, WriteResult,
};

#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Seed for classifier weight initialization
    pub rng_seed: u64,
    /// How many recent lines feed the routing fingerprint and blending
    pub recent_context_limit: usize,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            rng_seed: 42,
            recent_context_limit: 10,
        }
    }
}

/// Tiered associative memory for one conversational agent.
pub struct MemoryEngine {
    embeddings: Arc<dyn EmbeddingProvider>,
    router: Router,
    identity: IdentityStore,
    experience: ExperienceStore,
    knowledge: KnowledgeStore,
    /// Serializes write pipelines; retrieval does not take it
    write_lock: Mutex<()>,
    /// Rolling window of recent utterances for context blending
    recent: Mutex<VecDeque<String>>,
    /// Observed by the decay sweep and retraining between iterations
    sweep_cancel: Arc<AtomicBool>,
    config: EngineConfig,
}

impl MemoryEngine {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        storage: Arc<dyn Storage>,
        config: EngineConfig,
    ) -> Self {
        let router = Router::new(
            embeddings.clone(),
            storage.clone(),
            RouterConfig {
                rng_seed: config.rng_seed,
            },
        );

        Self {
            embeddings,
            router,
            identity: IdentityStore::new(storage.clone()),
            experience: ExperienceStore::new(storage.clone()),
            knowledge: KnowledgeStore::new(storage),
            write_lock: Mutex::new(()),
            recent: Mutex::new(VecDeque::new()),
            sweep_cancel: Arc::new(AtomicBool::new(false)),
            config,
        }
    }

    /// Bring the engine up: embeddings ready, classifier loaded or seeded.
    /// Starts degraded (identity-only, fallback routing) when the
    /// embedding provider cannot come up.
    pub async fn init(&self) -> MemoryResult<()> {
        match self.router.init().await {
            Ok(()) => info!("Memory engine initialized"),
            Err(e) => warn!("Memory engine starting degraded: {e}"),
        }
        Ok(())
    }

    pub fn status(&self) -> EmbeddingStatus {
        self.embeddings.status()
    }

    pub fn identity(&self) -> &IdentityStore {
        &self.identity
    }

    pub fn experience(&self) -> &ExperienceStore {
        &self.experience
    }

    pub fn knowledge(&self) -> &KnowledgeStore {
        &self.knowledge
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Apply a user decision to a previously surfaced identity conflict.
    pub async fn resolve_conflict(
        &self,
        conflict: &IdentityConflict,
        action: ConflictAction,
    ) -> MemoryResult<WriteResult> {
        let _guard = self.write_lock.lock().await;

        match action {
            ConflictAction::KeepExisting => {
                let existing = self
                    .identity
                    .get(&conflict.existing_id)
                    .await?
                    .ok_or_else(|| {
                        MemoryError::store(format!(
                            "conflicting fact no longer exists: {}",
                            conflict.existing_id
                        ))
                    })?;
                let updated = self
                    .identity
                    .update_confidence(&existing.id, existing.confidence + 0.1)
                    .await?;
                Ok(WriteResult::ok(
                    Layer::Identity,
                    updated.id,
                    format!("kept '{}' for {}", updated.value, updated.key),
                ))
            }
            ConflictAction::UpdateNew => {
                let updated = self
                    .identity
                    .replace_value(&conflict.existing_id, &conflict.new_value)
                    .await?;
                Ok(WriteResult::ok(
                    Layer::Identity,
                    updated.id,
                    format!("updated {} to '{}'", updated.key, updated.value),
                ))
            }
            ConflictAction::AskLater => Ok(WriteResult {
                success: true,
                layer: Some(Layer::Identity),
                entry_id: None,
                conflict: None,
                forget_query: None,
                message: format!("left '{}' unchanged for now", conflict.key),
            }),
        }
    }

    /// Teach the router the correct layer for an utterance.
    pub async fn teach(
        &self,
        text: &str,
        context: &[String],
        correct_layer: Layer,
    ) -> MemoryResult<()> {
        self.router.learn(text, context, correct_layer).await
    }

    /// Rebuild the classifier from the seed corpus and correction history.
    pub async fn retrain(&self) -> MemoryResult<usize> {
        self.router.retrain_from_history(&self.sweep_cancel).await
    }

    /// Run one importance-decay sweep over the experience store.
    pub async fn apply_decay(&self) -> MemoryResult<usize> {
        self.experience.apply_decay(&self.sweep_cancel).await
    }

    /// Drop experience entries whose importance fell below `threshold`.
    pub async fn prune_experience(&self, threshold: f32) -> MemoryResult<usize> {
        self.experience.prune_below(threshold).await
    }

    /// Request cancellation of in-flight sweeps and retraining.
    pub fn cancel_maintenance(&self) {
        self.sweep_cancel.store(true, Ordering::Relaxed);
    }

    /// Re-arm maintenance after a cancellation.
    pub fn resume_maintenance(&self) {
        self.sweep_cancel.store(false, Ordering::Relaxed);
    }

    pub async fn count(&self, layer: Layer) -> MemoryResult<usize> {
        match layer {
            Layer::Identity => self.identity.count().await,
            Layer::Experience => self.experience.count().await,
            Layer::Knowledge => self.knowledge.count().await,
        }
    }

    pub async fn clear(&self, layer: Layer) -> MemoryResult<()> {
        info!("Clearing {layer} layer");
        match layer {
            Layer::Identity => self.identity.clear().await,
            Layer::Experience => self.experience.clear().await,
            Layer::Knowledge => self.knowledge.clear().await,
        }
    }

    pub async fn delete(&self, layer: Layer, id: &str) -> MemoryResult<bool> {
        match layer {
            Layer::Identity => self.identity.delete(id).await,
            Layer::Experience => self.experience.delete(id).await,
            Layer::Knowledge => self.knowledge.delete(id).await,
        }
    }

    /// List a layer's entries as JSON records.
    pub async fn list(&self, layer: Layer) -> MemoryResult<serde_json::Value> {
        let value = match layer {
            Layer::Identity => serde_json::to_value(self.identity.get_all().await?)?,
            Layer::Experience => serde_json::to_value(self.experience.get_all().await?)?,
            Layer::Knowledge => serde_json::to_value(self.knowledge.get_all().await?)?,
        };
        Ok(value)
    }

    async fn recent_lines(&self) -> Vec<String> {
        let recent = self.recent.lock().await;
        recent.iter().cloned().collect()
    }

    async fn push_recent(&self, line: String) {
        let mut recent = self.recent.lock().await;
        recent.push_back(line);
        while recent.len() > self.config.recent_context_limit {
            recent.pop_front();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::HashProvider;
    use crate::storage::MemoryStorage;
    use crate::types::{FactCategory, IdentityFact, SuggestedAction};

    fn engine() -> MemoryEngine {
        MemoryEngine::new(
            Arc::new(HashProvider::ready(64)),
            Arc::new(MemoryStorage::new()),
            EngineConfig::default(),
        )
    }

    fn conflict_for(fact: &IdentityFact, new_value: &str) -> IdentityConflict {
        IdentityConflict {
            key: fact.key.clone(),
            existing_id: fact.id.clone(),
            existing_value: fact.value.clone(),
            existing_confidence: fact.confidence,
            new_value: new_value.to_string(),
            suggested_action: SuggestedAction::Update,
        }
    }

    #[tokio::test]
    async fn test_resolve_keep_existing_reinforces() {
        let engine = engine();
        let fact = IdentityFact::new("name", "John", FactCategory::Identity);
        let conflict = conflict_for(&fact, "Alex");
        engine.identity().put(fact).await.unwrap();

        let result = engine
            .resolve_conflict(&conflict, ConflictAction::KeepExisting)
            .await
            .unwrap();
        assert!(result.success);

        let kept = engine.identity().get_by_key("name").await.unwrap().unwrap();
        assert_eq!(kept.value, "John");
        assert!((kept.confidence - 0.9).abs() < 1e-6);
        assert_eq!(kept.confirmation_count, 2);
    }

    #[tokio::test]
    async fn test_resolve_update_new_replaces() {
        let engine = engine();
        let mut fact = IdentityFact::new("name", "John", FactCategory::Identity);
        fact.confidence = 0.9;
        let conflict = conflict_for(&fact, "Alex");
        engine.identity().put(fact).await.unwrap();

        let result = engine
            .resolve_conflict(&conflict, ConflictAction::UpdateNew)
            .await
            .unwrap();
        assert!(result.success);

        let updated = engine.identity().get_by_key("name").await.unwrap().unwrap();
        assert_eq!(updated.value, "Alex");
        assert!((updated.confidence - 0.7).abs() < 1e-6);
    }

    #[tokio::test]
    async fn test_resolve_ask_later_is_noop() {
        let engine = engine();
        let fact = IdentityFact::new("name", "John", FactCategory::Identity);
        let conflict = conflict_for(&fact, "Alex");
        engine.identity().put(fact).await.unwrap();

        let result = engine
            .resolve_conflict(&conflict, ConflictAction::AskLater)
            .await
            .unwrap();
        assert!(result.success);

        let unchanged = engine.identity().get_by_key("name").await.unwrap().unwrap();
        assert_eq!(unchanged.value, "John");
        assert_eq!(unchanged.confirmation_count, 1);
    }

    #[tokio::test]
    async fn test_layer_admin_operations() {
        let engine = engine();
        engine
            .identity()
            .put(IdentityFact::new("name", "John", FactCategory::Identity))
            .await
            .unwrap();

        assert_eq!(engine.count(Layer::Identity).await.unwrap(), 1);
        assert_eq!(engine.count(Layer::Experience).await.unwrap(), 0);

        let listed = engine.list(Layer::Identity).await.unwrap();
        assert_eq!(listed.as_array().unwrap().len(), 1);

        engine.clear(Layer::Identity).await.unwrap();
        assert_eq!(engine.count(Layer::Identity).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_maintenance_cancellation_flag() {
        let engine = engine();
        engine.cancel_maintenance();
        assert!(engine.retrain().await.is_err());

        engine.resume_maintenance();
        engine.init().await.unwrap();
        assert!(engine.retrain().await.is_ok());
    }
}
