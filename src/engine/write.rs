//! Write pipeline
//!
//! Routes an utterance (or honors a forced layer), materializes the
//! record in its store, and surfaces identity conflicts instead of
//! overwriting. Safety blocks and failed extractions come back as
//! unsuccessful results with readable messages, not errors.

use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, MemoryResult};
use crate::types::{
    CommandIntent, ConversationContext, Decision, ExperienceEntry, FactCategory, IdentityConflict,
    IdentityFact, KnowledgeCategory, KnowledgeEntry, Layer, RouteSource, RoutingResult,
    SuggestedAction, WriteRequest, WriteResult,
};

use super::{context::detect_context, importance::score_importance, MemoryEngine};

/// Existing facts above this confidence ask before being replaced.
const ASK_USER_CONFIDENCE: f32 = 0.8;

impl MemoryEngine {
    /// Route and persist one utterance.
    pub async fn write(&self, request: WriteRequest) -> MemoryResult<WriteResult> {
        let _guard = self.write_lock.lock().await;

        let content = request.content.trim().to_string();
        if content.is_empty() {
            return Ok(WriteResult::failure("nothing to store"));
        }

        let routing = match request.force_layer {
            Some(layer) => RoutingResult {
                decision: layer.into(),
                confidence: 1.0,
                source: RouteSource::Rule,
                intent: None,
            },
            None => {
                let recent = self.recent_lines().await;
                self.router.route(&content, &recent).await?
            }
        };
        debug!(decision = ?routing.decision, source = ?routing.source, "Write routed");

        if routing.decision == Decision::Blocked {
            warn!("Write rejected by safety rules");
            return Ok(WriteResult::failure("blocked by safety filter"));
        }

        // `/forget` surfaces a structured intent; nothing is persisted
        if let Some(CommandIntent::Forget { query }) = &routing.intent {
            return Ok(WriteResult {
                success: true,
                layer: None,
                entry_id: None,
                conflict: None,
                forget_query: Some(query.clone()),
                message: format!("forget request captured for '{query}'"),
            });
        }

        // Slash commands store their payload, not the command line
        let body = match &routing.intent {
            Some(CommandIntent::Remember { text }) => text.clone(),
            Some(CommandIntent::Recall { query }) => query.clone(),
            _ => content.clone(),
        };

        // Ask and Conflict default to the experience layer
        let target = routing.decision.layer().unwrap_or(Layer::Experience);
        let result = match target {
            Layer::Identity => self.write_identity(&body).await?,
            Layer::Experience => self.write_experience(&body, &request).await?,
            Layer::Knowledge => self.write_knowledge(&body).await?,
        };

        if result.success {
            self.push_recent(content).await;
        }
        Ok(result)
    }

    async fn write_identity(&self, body: &str) -> MemoryResult<WriteResult> {
        let Some(extracted) = self.router.rules().extract(body) else {
            return Ok(WriteResult::failure(
                "could not extract an identity fact from the input",
            ));
        };

        match self.identity.get_by_key(&extracted.key).await? {
            Some(existing) if !existing.value.eq_ignore_ascii_case(&extracted.value) => {
                let suggested_action = if existing.confidence > ASK_USER_CONFIDENCE {
                    SuggestedAction::AskUser
                } else {
                    SuggestedAction::Update
                };
                Ok(WriteResult::conflict(IdentityConflict {
                    key: existing.key.clone(),
                    existing_id: existing.id.clone(),
                    existing_value: existing.value.clone(),
                    existing_confidence: existing.confidence,
                    new_value: extracted.value,
                    suggested_action,
                }))
            }
            Some(existing) => {
                let updated = self
                    .identity
                    .update_confidence(&existing.id, existing.confidence + 0.1)
                    .await?;
                Ok(WriteResult::ok(
                    Layer::Identity,
                    updated.id.clone(),
                    format!(
                        "reinforced {}={} (confidence {:.2})",
                        updated.key, updated.value, updated.confidence
                    ),
                ))
            }
            None => {
                let category = if extracted.key == "name" {
                    FactCategory::Identity
                } else {
                    FactCategory::Preference
                };
                let fact = IdentityFact::new(&extracted.key, &extracted.value, category);
                let id = fact.id.clone();
                let message = format!("stored {}={}", fact.key, fact.value);
                self.identity.put(fact).await?;
                Ok(WriteResult::ok(Layer::Identity, id, message))
            }
        }
    }

    async fn write_experience(
        &self,
        body: &str,
        request: &WriteRequest,
    ) -> MemoryResult<WriteResult> {
        let importance = score_importance(body, request.role);
        let detected = detect_context(body);
        let context = if detected != ConversationContext::General {
            detected
        } else {
            request.context
        };

        let mut entry = ExperienceEntry::new(body, request.role, importance).with_context(context);

        // Embedding is optional here; entries without one simply stay out
        // of semantic search
        if self.embeddings.is_ready() {
            match self.embeddings.embed(body).await {
                Ok(embedding) => entry.embedding = Some(embedding),
                Err(e) => warn!("Storing experience without embedding: {e}"),
            }
        } else {
            warn!("Embeddings not ready; experience stored without vector");
        }

        let id = entry.id.clone();
        self.experience.put(entry).await?;
        Ok(WriteResult::ok(
            Layer::Experience,
            id,
            format!("stored experience ({context}, importance {importance:.2})"),
        ))
    }

    async fn write_knowledge(&self, body: &str) -> MemoryResult<WriteResult> {
        if !self.embeddings.is_ready() {
            return Err(MemoryError::embedding(
                "knowledge writes require a ready embedding provider",
            ));
        }
        let embedding = self.embeddings.embed(body).await?;

        let entry = KnowledgeEntry::new(body, KnowledgeCategory::Skill, embedding);
        let id = entry.id.clone();
        self.knowledge.put(entry).await?;
        Ok(WriteResult::ok(Layer::Knowledge, id, "stored knowledge entry"))
    }
}
