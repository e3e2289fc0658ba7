//! Local embedding provider backed by fastembed
//!
//! Loads AllMiniLML6V2 lazily on first use and serves mean-pooled,
//! L2-normalized sentence vectors.

use std::sync::Arc;

use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use tokio::sync::RwLock;
use tracing::{info, warn};

use crate::error::{MemoryError, MemoryResult};
use crate::similarity::l2_normalize;

use super::{EmbeddingProvider, EmbeddingStatus, StatusBroadcast};

/// Output dimension of AllMiniLML6V2.
pub const EMBEDDING_DIMENSION: usize = 384;

/// Embedding provider running the model in-process.
pub struct FastembedProvider {
    model: Arc<RwLock<Option<TextEmbedding>>>,
    status: StatusBroadcast,
}

impl FastembedProvider {
    pub fn new() -> Self {
        Self {
            model: Arc::new(RwLock::new(None)),
            status: StatusBroadcast::default(),
        }
    }

    async fn load_model(&self) -> MemoryResult<()> {
        let mut guard = self.model.write().await;
        if guard.is_some() {
            return Ok(());
        }

        self.status.set(EmbeddingStatus::Loading);
        info!("Loading embedding model (AllMiniLML6V2)...");

        let loaded = tokio::task::spawn_blocking(|| {
            TextEmbedding::try_new(InitOptions::new(EmbeddingModel::AllMiniLML6V2))
        })
        .await
        .map_err(|e| MemoryError::embedding(format!("embedding loader task failed: {e}")))?;

        match loaded {
            Ok(model) => {
                *guard = Some(model);
                self.status.set(EmbeddingStatus::Ready);
                info!("Embedding model ready ({EMBEDDING_DIMENSION} dims)");
                Ok(())
            }
            Err(e) => {
                self.status.set(EmbeddingStatus::Error);
                warn!("Failed to initialize embedding model: {e}");
                Err(MemoryError::embedding(e.to_string()))
            }
        }
    }
}

impl Default for FastembedProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl EmbeddingProvider for FastembedProvider {
    fn dimension(&self) -> usize {
        EMBEDDING_DIMENSION
    }

    fn status_broadcast(&self) -> &StatusBroadcast {
        &self.status
    }

    async fn ensure_ready(&self) -> MemoryResult<()> {
        if self.status.current() == EmbeddingStatus::Error {
            // Retry path: error -> idle -> loading
            self.status.set(EmbeddingStatus::Idle);
        }
        self.load_model().await
    }

    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        if self.model.read().await.is_none() {
            self.ensure_ready().await?;
        }

        let mut guard = self.model.write().await;
        let model = guard
            .as_mut()
            .ok_or_else(|| MemoryError::embedding("model not loaded"))?;

        let mut vectors = model
            .embed(vec![text.to_string()], None)
            .map_err(|e| MemoryError::embedding(e.to_string()))?;

        let mut vector = vectors
            .pop()
            .ok_or_else(|| MemoryError::embedding("model returned no vector"))?;
        l2_normalize(&mut vector);
        Ok(vector)
    }
}
