//! Error types for the memory core
//!
//! Conflicts are not errors: a detected identity conflict is returned as a
//! successful `WriteResult` carrying the conflict payload, so callers can
//! resolve it interactively.

use thiserror::Error;

/// Result type for memory operations
pub type MemoryResult<T> = Result<T, MemoryError>;

/// Memory system errors
#[derive(Debug, Error)]
pub enum MemoryError {
    /// Input matched the safety blocklist; the caller must not persist it
    #[error("blocked by safety filter: {reason}")]
    SafetyBlocked { reason: String },

    /// No identity pattern matched an identity-layer write
    #[error("could not extract an identity fact from the input")]
    ExtractionFailed,

    /// The embedding provider is not ready or failed to embed
    #[error("embedding provider unavailable: {reason}")]
    EmbeddingUnavailable { reason: String },

    /// Knowledge entries require an embedding at insert time
    #[error("knowledge entries require an embedding")]
    MissingEmbedding,

    /// The underlying persistent store failed
    #[error("storage failure: {reason}")]
    Store { reason: String },

    /// The router classifier has not been initialized or seeded yet
    #[error("router classifier is not initialized")]
    ClassifierUninitialized,

    /// Serialization of a persisted record failed
    #[error("serialization failed: {reason}")]
    Serialization { reason: String },

    /// Anything else
    #[error("{0}")]
    Internal(String),
}

impl MemoryError {
    pub fn store(reason: impl Into<String>) -> Self {
        Self::Store {
            reason: reason.into(),
        }
    }

    pub fn embedding(reason: impl Into<String>) -> Self {
        Self::EmbeddingUnavailable {
            reason: reason.into(),
        }
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

impl From<std::io::Error> for MemoryError {
    fn from(err: std::io::Error) -> Self {
        Self::Store {
            reason: err.to_string(),
        }
    }
}

impl From<bincode::Error> for MemoryError {
    fn from(err: bincode::Error) -> Self {
        Self::Serialization {
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_carries_reason() {
        let err = MemoryError::store("disk full");
        assert!(err.to_string().contains("disk full"));

        let err = MemoryError::embedding("model not loaded");
        assert!(err.to_string().contains("model not loaded"));
    }

    #[test]
    fn test_io_error_maps_to_store() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "gone");
        let err: MemoryError = io.into();
        assert!(matches!(err, MemoryError::Store { .. }));
    }
}
