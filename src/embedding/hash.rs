//! Deterministic hash-based embedding provider
//!
//! Sums a pseudo-random unit vector per token, so texts sharing tokens get
//! positive cosine similarity. No semantic understanding; intended for
//! tests and offline operation.

use async_trait::async_trait;

use crate::error::{MemoryError, MemoryResult};
use crate::similarity::l2_normalize;

use super::{EmbeddingProvider, EmbeddingStatus, StatusBroadcast};

/// Bag-of-token-hashes embedder.
pub struct HashProvider {
    dimension: usize,
    status: StatusBroadcast,
}

impl HashProvider {
    pub fn new(dimension: usize) -> Self {
        assert!(dimension > 0, "embedding dimension must be positive");
        Self {
            dimension,
            status: StatusBroadcast::default(),
        }
    }

    /// Small default dimension keeps seed training fast in tests.
    pub fn ready(dimension: usize) -> Self {
        let provider = Self::new(dimension);
        provider.status.set(EmbeddingStatus::Loading);
        provider.status.set(EmbeddingStatus::Ready);
        provider
    }

    fn token_seed(token: &str) -> u64 {
        // FNV-1a over the token bytes
        let mut hash = 0xcbf2_9ce4_8422_2325u64;
        for byte in token.bytes() {
            hash ^= byte as u64;
            hash = hash.wrapping_mul(0x0000_0100_0000_01b3);
        }
        hash
    }

    fn splitmix(state: &mut u64) -> u64 {
        *state = state.wrapping_add(0x9e37_79b9_7f4a_7c15);
        let mut z = *state;
        z = (z ^ (z >> 30)).wrapping_mul(0xbf58_476d_1ce4_e5b9);
        z = (z ^ (z >> 27)).wrapping_mul(0x94d0_49bb_1331_11eb);
        z ^ (z >> 31)
    }

    fn token_vector(&self, token: &str) -> Vec<f32> {
        let mut state = Self::token_seed(token);
        let mut vector = Vec::with_capacity(self.dimension);
        for _ in 0..self.dimension {
            let bits = Self::splitmix(&mut state);
            // Map to [-1, 1]
            vector.push((bits as i64 as f64 / i64::MAX as f64) as f32);
        }
        l2_normalize(&mut vector);
        vector
    }
}

impl Default for HashProvider {
    fn default() -> Self {
        Self::ready(64)
    }
}

#[async_trait]
impl EmbeddingProvider for HashProvider {
    fn dimension(&self) -> usize {
        self.dimension
    }

    fn status_broadcast(&self) -> &StatusBroadcast {
        &self.status
    }

    async fn ensure_ready(&self) -> MemoryResult<()> {
        if self.status.current() == EmbeddingStatus::Error {
            self.status.set(EmbeddingStatus::Idle);
        }
        self.status.set(EmbeddingStatus::Loading);
        self.status.set(EmbeddingStatus::Ready);
        Ok(())
    }

    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>> {
        if self.status.current() != EmbeddingStatus::Ready {
            return Err(MemoryError::embedding("hash provider not ready"));
        }

        let mut vector = vec![0.0f32; self.dimension];
        let mut tokens = 0usize;
        for token in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
        {
            let contribution = self.token_vector(token);
            for (acc, x) in vector.iter_mut().zip(contribution.iter()) {
                *acc += x;
            }
            tokens += 1;
        }

        if tokens == 0 {
            // Empty input still yields a stable non-zero vector
            vector = self.token_vector("");
        }

        l2_normalize(&mut vector);
        Ok(vector)
    }
}
