//! Embedding provider seam
//!
//! The sentence-embedding model is an external collaborator: the core only
//! sees `embed`, `dimension`, and an observable status. Status transitions
//! move forward only (idle → loading → ready | error); an errored provider
//! may be retried by resetting to idle.

pub mod fastembed;
pub mod hash;

pub use fastembed::FastembedProvider;
pub use hash::HashProvider;

use std::sync::Mutex;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::MemoryResult;

/// Lifecycle of an embedding provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingStatus {
    Idle,
    Loading,
    Ready,
    Error,
}

impl EmbeddingStatus {
    /// Forward-only transition check. Error is retryable via idle.
    fn can_transition(self, next: EmbeddingStatus) -> bool {
        use EmbeddingStatus::*;
        matches!(
            (self, next),
            (Idle, Loading) | (Loading, Ready) | (Loading, Error) | (Error, Idle)
        )
    }
}

/// Callback invoked on each status change.
pub type StatusCallback = Box<dyn Fn(EmbeddingStatus) + Send + Sync>;

struct BroadcastInner {
    current: EmbeddingStatus,
    subscribers: Vec<(u64, StatusCallback)>,
    next_id: u64,
}

/// Tiny publish/subscribe cell for provider status.
///
/// `subscribe` delivers the current value immediately and returns an id
/// usable with `unsubscribe`.
pub struct StatusBroadcast {
    inner: Mutex<BroadcastInner>,
}

impl StatusBroadcast {
    pub fn new(initial: EmbeddingStatus) -> Self {
        Self {
            inner: Mutex::new(BroadcastInner {
                current: initial,
                subscribers: Vec::new(),
                next_id: 0,
            }),
        }
    }

    pub fn current(&self) -> EmbeddingStatus {
        self.inner.lock().expect("status lock poisoned").current
    }

    /// Apply a transition. Invalid transitions are ignored.
    pub fn set(&self, next: EmbeddingStatus) {
        let mut inner = self.inner.lock().expect("status lock poisoned");
        if inner.current == next {
            return;
        }
        if !inner.current.can_transition(next) {
            debug!(from = ?inner.current, to = ?next, "ignoring invalid status transition");
            return;
        }
        inner.current = next;
        for (_, callback) in &inner.subscribers {
            callback(next);
        }
    }

    pub fn subscribe(&self, callback: StatusCallback) -> u64 {
        let mut inner = self.inner.lock().expect("status lock poisoned");
        let id = inner.next_id;
        inner.next_id += 1;
        callback(inner.current);
        inner.subscribers.push((id, callback));
        id
    }

    pub fn unsubscribe(&self, id: u64) {
        let mut inner = self.inner.lock().expect("status lock poisoned");
        inner.subscribers.retain(|(sub_id, _)| *sub_id != id);
    }
}

impl Default for StatusBroadcast {
    fn default() -> Self {
        Self::new(EmbeddingStatus::Idle)
    }
}

/// External sentence-embedding model.
///
/// Implementations return L2-normalized vectors and are deterministic for
/// identical input.
#[async_trait]
pub trait EmbeddingProvider: Send + Sync {
    /// Embedding dimension D; the classifier sizes its weights from this.
    fn dimension(&self) -> usize;

    /// The status cell; callers may subscribe for change notification.
    fn status_broadcast(&self) -> &StatusBroadcast;

    fn status(&self) -> EmbeddingStatus {
        self.status_broadcast().current()
    }

    fn is_ready(&self) -> bool {
        self.status() == EmbeddingStatus::Ready
    }

    /// Load the model if necessary and move the status to ready.
    async fn ensure_ready(&self) -> MemoryResult<()>;

    /// Embed one text. Fails fast when the provider is unavailable.
    async fn embed(&self, text: &str) -> MemoryResult<Vec<f32>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn test_subscribe_delivers_current_state() {
        let broadcast = StatusBroadcast::new(EmbeddingStatus::Ready);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = seen.clone();

        broadcast.subscribe(Box::new(move |status| {
            assert_eq!(status, EmbeddingStatus::Ready);
            seen_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_forward_only_transitions() {
        let broadcast = StatusBroadcast::default();
        broadcast.set(EmbeddingStatus::Ready); // idle -> ready is not legal
        assert_eq!(broadcast.current(), EmbeddingStatus::Idle);

        broadcast.set(EmbeddingStatus::Loading);
        broadcast.set(EmbeddingStatus::Ready);
        assert_eq!(broadcast.current(), EmbeddingStatus::Ready);

        // No going back once ready
        broadcast.set(EmbeddingStatus::Idle);
        assert_eq!(broadcast.current(), EmbeddingStatus::Ready);
    }

    #[test]
    fn test_error_is_retryable_from_idle() {
        let broadcast = StatusBroadcast::default();
        broadcast.set(EmbeddingStatus::Loading);
        broadcast.set(EmbeddingStatus::Error);
        broadcast.set(EmbeddingStatus::Idle);
        broadcast.set(EmbeddingStatus::Loading);
        broadcast.set(EmbeddingStatus::Ready);
        assert_eq!(broadcast.current(), EmbeddingStatus::Ready);
    }

    #[test]
    fn test_unsubscribe_stops_notifications() {
        let broadcast = StatusBroadcast::default();
        let count = Arc::new(AtomicUsize::new(0));
        let count_clone = count.clone();

        let id = broadcast.subscribe(Box::new(move |_| {
            count_clone.fetch_add(1, Ordering::SeqCst);
        }));
        assert_eq!(count.load(Ordering::SeqCst), 1); // immediate delivery

        broadcast.unsubscribe(id);
        broadcast.set(EmbeddingStatus::Loading);
        assert_eq!(count.load(Ordering::SeqCst), 1);
    }
}
