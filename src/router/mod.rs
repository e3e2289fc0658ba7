//! Write-path router
//!
//! Composes the hard rules, the route cache, and the linear classifier
//! into a single decision, and owns online learning. Rule hits are cheap
//! and never cached; ML decisions are cached by request fingerprint and
//! invalidated whenever the weights move.

pub mod cache;
pub mod classifier;
pub mod rules;
pub mod seed;

pub use cache::RouteCache;
pub use classifier::LinearClassifier;
pub use rules::{ExtractedFact, RuleEngine};
pub use seed::SEED_CORPUS;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::embedding::EmbeddingProvider;
use crate::error::{MemoryError, MemoryResult};
use crate::similarity::mean_vectors;
use crate::storage::{decode, encode, Storage, CORRECTIONS_LOG, WEIGHTS_BLOB};
use crate::types::{
    CorrectionEntry, Decision, Layer, RouteSource, RouterWeights, RoutingResult,
};

/// Below this top probability the router asks instead of deciding.
pub const CONFIDENCE_THRESHOLD: f32 = 0.6;
/// Top-two probabilities closer than this signal competing intents.
pub const CONFLICT_MARGIN: f32 = 0.15;

/// How many trailing context lines blend into the routing embedding.
const CONTEXT_BLEND_LINES: usize = 5;

#[derive(Debug, Clone)]
pub struct RouterConfig {
    /// Seed for weight initialization; fixed so retraining reproduces runs.
    pub rng_seed: u64,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self { rng_seed: 42 }
    }
}

struct RouterState {
    classifier: Option<LinearClassifier>,
    cache: RouteCache,
}

/// Hybrid router over the three memory layers.
pub struct Router {
    rules: RuleEngine,
    embeddings: Arc<dyn EmbeddingProvider>,
    storage: Arc<dyn Storage>,
    state: Mutex<RouterState>,
    config: RouterConfig,
}

impl Router {
    pub fn new(
        embeddings: Arc<dyn EmbeddingProvider>,
        storage: Arc<dyn Storage>,
        config: RouterConfig,
    ) -> Self {
        Self {
            rules: RuleEngine::new(),
            embeddings,
            storage,
            state: Mutex::new(RouterState {
                classifier: None,
                cache: RouteCache::new(),
            }),
            config,
        }
    }

    pub fn rules(&self) -> &RuleEngine {
        &self.rules
    }

    /// Load persisted weights or seed-train a fresh classifier.
    pub async fn init(&self) -> MemoryResult<()> {
        self.embeddings.ensure_ready().await?;
        let mut state = self.state.lock().await;
        if state.classifier.is_none() {
            self.load_or_seed(&mut state).await?;
        }
        Ok(())
    }

    /// Route one utterance given recent conversation lines.
    pub async fn route(&self, text: &str, recent_context: &[String]) -> MemoryResult<RoutingResult> {
        let trimmed = text.trim();

        // 1. Hard rules short-circuit; never cached
        if let Some(result) = self.rules.apply(trimmed) {
            debug!(decision = ?result.decision, "Routed by rule");
            return Ok(result);
        }

        let key = RouteCache::fingerprint(trimmed, recent_context);
        let mut state = self.state.lock().await;

        // 2. Cached ML decision
        if let Some(hit) = state.cache.get(&key) {
            debug!("Route cache hit");
            return Ok(hit);
        }

        // 3. Lazy classifier initialization
        if state.classifier.is_none() {
            if let Err(e) = self.load_or_seed(&mut state).await {
                warn!("Classifier unavailable, falling back to experience: {e}");
                return Ok(Self::fallback());
            }
        }

        // 4. Context-blended embedding
        let input = match self.blended_embedding(trimmed, recent_context).await {
            Ok(input) => input,
            Err(e) => {
                warn!("Embedding failed during routing, falling back: {e}");
                return Ok(Self::fallback());
            }
        };

        let classifier = state
            .classifier
            .as_ref()
            .ok_or(MemoryError::ClassifierUninitialized)?;

        // 5. Classify and rank
        let probabilities = classifier.predict(&input);
        let mut ranked: Vec<(Layer, f32)> = Layer::ALL
            .iter()
            .map(|&layer| (layer, probabilities[layer.index()]))
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        // 6. Decision rule
        let (top_layer, p_top) = ranked[0];
        let (_, p_second) = ranked[1];
        let result = RoutingResult {
            decision: decide(top_layer, p_top, p_second),
            confidence: p_top,
            source: RouteSource::Ml,
            intent: None,
        };

        // 7. Cache and return
        state.cache.set(key, result.clone());
        Ok(result)
    }

    /// Per-layer probabilities for an utterance; diagnostic surface.
    pub async fn probabilities(
        &self,
        text: &str,
        recent_context: &[String],
    ) -> MemoryResult<[f32; 3]> {
        let input = self.blended_embedding(text.trim(), recent_context).await?;
        let mut state = self.state.lock().await;
        if state.classifier.is_none() {
            self.load_or_seed(&mut state).await?;
        }
        let classifier = state
            .classifier
            .as_ref()
            .ok_or(MemoryError::ClassifierUninitialized)?;
        Ok(classifier.predict(&input))
    }

    /// One online correction: gradient step, log append, weight persist,
    /// cache invalidation. The cache is cleared before this returns.
    pub async fn learn(
        &self,
        text: &str,
        recent_context: &[String],
        correct_layer: Layer,
    ) -> MemoryResult<()> {
        let mut state = self.state.lock().await;
        if state.classifier.is_none() {
            self.load_or_seed(&mut state).await?;
        }

        let input = self.blended_embedding(text.trim(), recent_context).await?;
        let classifier = state
            .classifier
            .as_mut()
            .ok_or(MemoryError::ClassifierUninitialized)?;
        classifier.train_step(&input, correct_layer);

        let correction = CorrectionEntry {
            text: text.trim().to_string(),
            context: recent_context.to_vec(),
            correct_layer,
            timestamp: Utc::now(),
        };
        self.storage
            .append_line(CORRECTIONS_LOG, &serde_json::to_string(&correction)?)
            .await?;

        let weights = classifier.weights().clone();
        self.persist_weights(&weights).await?;

        state.cache.clear();
        info!("Learned correction: '{}' -> {}", correction.text, correct_layer);
        Ok(())
    }

    /// Rebuild the classifier from scratch: fresh seeded weights, one pass
    /// over the seed corpus, then every persisted correction in order.
    /// Returns the number of corrections replayed.
    pub async fn retrain_from_history(&self, cancel: &AtomicBool) -> MemoryResult<usize> {
        let mut state = self.state.lock().await;
        let dimension = self.embeddings.dimension();
        let mut classifier = LinearClassifier::new(dimension, self.config.rng_seed);

        for (text, layer) in SEED_CORPUS {
            if cancel.load(Ordering::Relaxed) {
                info!("Retraining cancelled during seed replay");
                return Err(MemoryError::Internal("retraining cancelled".into()));
            }
            let input = self.embeddings.embed(text).await?;
            classifier.train_step(&input, *layer);
        }

        let lines = self.storage.read_lines(CORRECTIONS_LOG).await?;
        let mut replayed = 0usize;
        for line in &lines {
            if cancel.load(Ordering::Relaxed) {
                info!("Retraining cancelled during correction replay");
                return Err(MemoryError::Internal("retraining cancelled".into()));
            }
            let correction: CorrectionEntry = match serde_json::from_str(line) {
                Ok(correction) => correction,
                Err(e) => {
                    warn!("Skipping malformed correction line: {e}");
                    continue;
                }
            };
            let input = self
                .blended_embedding(&correction.text, &correction.context)
                .await?;
            classifier.train_step(&input, correction.correct_layer);
            replayed += 1;
        }

        let weights = classifier.weights().clone();
        self.persist_weights(&weights).await?;
        state.classifier = Some(classifier);
        state.cache.clear();

        info!(
            "Retrained classifier from {} seed examples and {} corrections",
            SEED_CORPUS.len(),
            replayed
        );
        Ok(replayed)
    }

    /// Snapshot of the current weights, if the classifier is initialized.
    pub async fn current_weights(&self) -> Option<RouterWeights> {
        let state = self.state.lock().await;
        state
            .classifier
            .as_ref()
            .map(|classifier| classifier.weights().clone())
    }

    pub async fn cache_len(&self) -> usize {
        self.state.lock().await.cache.len()
    }

    fn fallback() -> RoutingResult {
        RoutingResult {
            decision: Decision::Experience,
            confidence: 0.5,
            source: RouteSource::Ml,
            intent: None,
        }
    }

    async fn load_or_seed(&self, state: &mut RouterState) -> MemoryResult<()> {
        let dimension = self.embeddings.dimension();

        if let Some(bytes) = self.storage.get_blob(WEIGHTS_BLOB).await? {
            match decode::<RouterWeights>(&bytes) {
                Ok(weights) if weights.dimension() == dimension => {
                    state.classifier = Some(LinearClassifier::from_weights(weights)?);
                    info!("Loaded persisted router weights ({dimension} dims)");
                    return Ok(());
                }
                Ok(weights) => {
                    warn!(
                        "Persisted weights have dimension {}, provider reports {}; reseeding",
                        weights.dimension(),
                        dimension
                    );
                }
                Err(e) => {
                    warn!("Could not decode persisted weights, reseeding: {e}");
                }
            }
        }

        let mut classifier = LinearClassifier::new(dimension, self.config.rng_seed);
        for (text, layer) in SEED_CORPUS {
            let input = self.embeddings.embed(text).await?;
            classifier.train_step(&input, *layer);
        }

        let weights = classifier.weights().clone();
        self.persist_weights(&weights).await?;
        state.classifier = Some(classifier);
        info!("Seed-trained router classifier on {} examples", SEED_CORPUS.len());
        Ok(())
    }

    async fn persist_weights(&self, weights: &RouterWeights) -> MemoryResult<()> {
        self.storage.put_blob(WEIGHTS_BLOB, encode(weights)?).await
    }

    /// Embed the utterance, blending in recent context when present.
    async fn blended_embedding(
        &self,
        text: &str,
        recent_context: &[String],
    ) -> MemoryResult<Vec<f32>> {
        let text_embedding = self.embeddings.embed(text).await?;
        if recent_context.is_empty() {
            return Ok(text_embedding);
        }

        let tail_start = recent_context.len().saturating_sub(CONTEXT_BLEND_LINES);
        let context_text = recent_context[tail_start..].join("\n");
        let context_embedding = self.embeddings.embed(&context_text).await?;
        Ok(mean_vectors(&text_embedding, &context_embedding))
    }
}

/// Decision rule over the ranked top-two probabilities.
fn decide(top_layer: Layer, p_top: f32, p_second: f32) -> Decision {
    if p_top < CONFIDENCE_THRESHOLD {
        Decision::Ask
    } else if p_top - p_second < CONFLICT_MARGIN {
        Decision::Conflict
    } else {
        top_layer.into()
    }
}
