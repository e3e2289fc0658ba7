//! Similarity primitives
//!
//! Cosine similarity and vector helpers shared by the semantic stores and
//! the router. Search is a brute-force scan; at the target scale
//! (tens of thousands of entries) this beats maintaining an index.

use uuid::Uuid;

/// Cosine similarity between two vectors.
///
/// Returns 0.0 for mismatched lengths or zero-norm inputs; otherwise the
/// result is in [-1.0, 1.0].
pub fn cosine(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }

    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }

    if norm_a <= 0.0 || norm_b <= 0.0 {
        return 0.0;
    }

    dot / (norm_a.sqrt() * norm_b.sqrt())
}

/// Normalize a vector to unit length in place. Zero vectors are left as-is.
pub fn l2_normalize(vec: &mut [f32]) {
    let norm: f32 = vec.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in vec.iter_mut() {
            *x /= norm;
        }
    }
}

/// Element-wise mean of two equal-length vectors.
///
/// Used for context blending: the query embedding averaged with the
/// recent-context embedding.
pub fn mean_vectors(a: &[f32], b: &[f32]) -> Vec<f32> {
    debug_assert_eq!(a.len(), b.len());
    a.iter().zip(b.iter()).map(|(x, y)| (x + y) / 2.0).collect()
}

/// Generate a unique entry id.
pub fn new_id() -> String {
    Uuid::new_v4().to_string()
}
