//! Retrieval pipeline
//!
//! Layered query: exact identity lookup always runs; the semantic phases
//! run only while the embedding provider is ready. Results merge under a
//! strict layer precedence (identity > experience > knowledge) and are
//! ranked within a layer by similarity, falling back to confidence.

use serde_json::json;
use tracing::{debug, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::MemoryResult;
use crate::types::{Layer, RetrieveOptions, RetrievedMemory};

use super::MemoryEngine;

/// Identity facts below this confidence stay out of retrieval.
const IDENTITY_MIN_CONFIDENCE: f32 = 0.5;
/// Identity phase contributes at most this many results.
const IDENTITY_MAX_RESULTS: usize = 3;
/// Knowledge search runs at a slightly looser bar than experience.
const KNOWLEDGE_THRESHOLD_RATIO: f32 = 0.8;

impl MemoryEngine {
    /// Query all enabled layers and merge by layer precedence.
    pub async fn retrieve(
        &self,
        query: &str,
        options: &RetrieveOptions,
    ) -> MemoryResult<Vec<RetrievedMemory>> {
        let mut results: Vec<RetrievedMemory> = Vec::new();

        // Identity phase: exact search, no embeddings involved
        if options.include_identity {
            for fact in self
                .identity
                .search(query)
                .await?
                .into_iter()
                .filter(|fact| fact.confidence >= IDENTITY_MIN_CONFIDENCE)
                .take(IDENTITY_MAX_RESULTS)
            {
                results.push(RetrievedMemory {
                    layer: Layer::Identity,
                    content: format!("{}: {}", fact.key, fact.value),
                    confidence: fact.confidence,
                    similarity: None,
                    timestamp: fact.last_confirmed,
                    metadata: json!({
                        "key": fact.key,
                        "value": fact.value,
                        "category": fact.category,
                        "source": fact.source,
                        "confirmation_count": fact.confirmation_count,
                    }),
                });
            }
        }

        // Semantic phases: embeddings required, degrade to identity-only
        let wants_semantic = options.include_experience || options.include_knowledge;
        if wants_semantic && self.embeddings.is_ready() {
            match self.embeddings.embed(query).await {
                Ok(query_embedding) => {
                    if options.include_experience {
                        for hit in self
                            .experience
                            .search(
                                &query_embedding,
                                options.top_k,
                                options.semantic_threshold,
                                options.context_filter,
                            )
                            .await?
                        {
                            results.push(RetrievedMemory {
                                layer: Layer::Experience,
                                content: hit.item.content,
                                confidence: hit.item.importance,
                                similarity: Some(hit.similarity),
                                timestamp: hit.item.timestamp,
                                metadata: json!({
                                    "context": hit.item.context,
                                    "role": hit.item.role,
                                    "score": hit.score,
                                    "original_importance": hit.item.original_importance,
                                }),
                            });
                        }
                    }

                    if options.include_knowledge {
                        let threshold = options.semantic_threshold * KNOWLEDGE_THRESHOLD_RATIO;
                        for hit in self
                            .knowledge
                            .search(&query_embedding, options.top_k, threshold)
                            .await?
                        {
                            results.push(RetrievedMemory {
                                layer: Layer::Knowledge,
                                content: hit.item.content,
                                confidence: hit.item.confidence,
                                similarity: Some(hit.similarity),
                                timestamp: hit.item.timestamp,
                                metadata: json!({
                                    "category": hit.item.category,
                                    "reinforcement_count": hit.item.reinforcement_count,
                                    "score": hit.score,
                                }),
                            });
                        }
                    }
                }
                Err(e) => {
                    warn!("Query embedding failed; returning identity matches only: {e}");
                }
            }
        }

        // Merge: stable sort keeps per-layer score order for equal keys
        results.sort_by(|a, b| {
            b.layer
                .priority()
                .cmp(&a.layer.priority())
                .then_with(|| {
                    b.rank_key()
                        .partial_cmp(&a.rank_key())
                        .unwrap_or(std::cmp::Ordering::Equal)
                })
        });
        results.truncate(options.top_k);

        debug!("Retrieved {} memories for query", results.len());
        Ok(results)
    }
}
