//! Linear layer classifier
//!
//! Three weight vectors over the embedding space, no bias. Probabilities
//! come from a numerically stable softmax; learning is a one-vs-rest
//! cross-entropy gradient step per example. Magnitudes stay small through
//! the small init range and learning rate; there is no regularization.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::error::{MemoryError, MemoryResult};
use crate::types::{Layer, RouterWeights};

/// Online learning rate.
pub const LEARNING_RATE: f32 = 0.05;
/// Weight init range: [-INIT_RANGE, +INIT_RANGE].
pub const INIT_RANGE: f32 = 0.05;

/// 3-way softmax classifier over sentence embeddings.
pub struct LinearClassifier {
    weights: RouterWeights,
    dimension: usize,
}

impl LinearClassifier {
    /// Fresh classifier with small random weights. The seed makes runs
    /// reproducible; retraining reuses the same seed.
    pub fn new(dimension: usize, seed: u64) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let mut init = || -> Vec<f32> {
            (0..dimension)
                .map(|_| rng.gen_range(-INIT_RANGE..=INIT_RANGE))
                .collect()
        };

        Self {
            weights: RouterWeights {
                identity: init(),
                experience: init(),
                knowledge: init(),
            },
            dimension,
        }
    }

    /// Restore a classifier from persisted weights.
    pub fn from_weights(weights: RouterWeights) -> MemoryResult<Self> {
        let dimension = weights.dimension();
        if dimension == 0
            || weights.experience.len() != dimension
            || weights.knowledge.len() != dimension
        {
            return Err(MemoryError::Internal(
                "persisted router weights have inconsistent dimensions".into(),
            ));
        }
        Ok(Self { weights, dimension })
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    pub fn weights(&self) -> &RouterWeights {
        &self.weights
    }

    /// Per-layer probabilities for an embedding, in `Layer::ALL` order.
    pub fn predict(&self, input: &[f32]) -> [f32; 3] {
        let scores = [
            dot(&self.weights.identity, input),
            dot(&self.weights.experience, input),
            dot(&self.weights.knowledge, input),
        ];
        softmax(scores)
    }

    /// One gradient step: `W[L] += eta * (1[L == correct] - p_L) * x`.
    pub fn train_step(&mut self, input: &[f32], correct: Layer) {
        let probabilities = self.predict(input);

        for layer in Layer::ALL {
            let target = if layer == correct { 1.0 } else { 0.0 };
            let error = target - probabilities[layer.index()];
            let weights = self.weights.layer_mut(layer);
            for (w, x) in weights.iter_mut().zip(input.iter()) {
                *w += LEARNING_RATE * error * x;
            }
        }
    }
}

fn dot(a: &[f32], b: &[f32]) -> f32 {
    a.iter().zip(b.iter()).map(|(x, y)| x * y).sum()
}

/// Numerically stable softmax: shift by the max score before exponentiating.
fn softmax(scores: [f32; 3]) -> [f32; 3] {
    let max = scores.iter().cloned().fold(f32::NEG_INFINITY, f32::max);
    let exps = [
        (scores[0] - max).exp(),
        (scores[1] - max).exp(),
        (scores[2] - max).exp(),
    ];
    let sum: f32 = exps.iter().sum();
    [exps[0] / sum, exps[1] / sum, exps[2] / sum]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn unit(dimension: usize, hot: usize) -> Vec<f32> {
        let mut v = vec![0.0; dimension];
        v[hot] = 1.0;
        v
    }

    #[test]
    fn test_softmax_sums_to_one() {
        let probs = softmax([2.0, -1.0, 0.5]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-6);
        for p in probs {
            assert!(p > 0.0 && p < 1.0);
        }
    }

    #[test]
    fn test_softmax_stable_for_large_scores() {
        let probs = softmax([1000.0, 999.0, -1000.0]);
        let sum: f32 = probs.iter().sum();
        assert!((sum - 1.0).abs() < 1e-5);
        assert!(probs[0] > probs[1]);
        assert!(probs.iter().all(|p| p.is_finite()));
    }

    #[test]
    fn test_seeded_init_is_deterministic() {
        let a = LinearClassifier::new(16, 42);
        let b = LinearClassifier::new(16, 42);
        assert_eq!(a.weights(), b.weights());

        let c = LinearClassifier::new(16, 7);
        assert_ne!(a.weights(), c.weights());
    }

    #[test]
    fn test_init_range() {
        let classifier = LinearClassifier::new(64, 42);
        for layer in Layer::ALL {
            for &w in classifier.weights().layer(layer) {
                assert!(w.abs() <= INIT_RANGE + 1e-6);
            }
        }
    }

    #[test]
    fn test_train_step_increases_target_probability() {
        let mut classifier = LinearClassifier::new(8, 42);
        let x = unit(8, 3);

        let before = classifier.predict(&x)[Layer::Knowledge.index()];
        classifier.train_step(&x, Layer::Knowledge);
        let after = classifier.predict(&x)[Layer::Knowledge.index()];

        assert!(after > before, "expected {after} > {before}");
    }

    #[test]
    fn test_repeated_training_converges_to_target() {
        let mut classifier = LinearClassifier::new(8, 42);
        let x = unit(8, 1);

        for _ in 0..200 {
            classifier.train_step(&x, Layer::Identity);
        }

        let probs = classifier.predict(&x);
        assert!(probs[Layer::Identity.index()] > 0.6);
    }

    #[test]
    fn test_from_weights_rejects_mismatched_lengths() {
        let weights = RouterWeights {
            identity: vec![0.0; 4],
            experience: vec![0.0; 4],
            knowledge: vec![0.0; 3],
        };
        assert!(LinearClassifier::from_weights(weights).is_err());
    }
}
