//! Route cache
//!
//! Bounded, TTL'd, insertion-ordered cache of routing results keyed by the
//! request fingerprint (text plus the last three context lines). Cleared
//! whenever the classifier learns, since cached decisions are stale the
//! moment the weights move.

use std::collections::{HashMap, VecDeque};
use std::time::{Duration, Instant};

use crate::types::RoutingResult;

/// Maximum number of cached routes.
pub const CACHE_CAPACITY: usize = 1000;
/// Entries older than this are treated as misses and evicted.
pub const CACHE_TTL: Duration = Duration::from_secs(30 * 60);

struct CacheSlot {
    result: RoutingResult,
    inserted_at: Instant,
}

/// LRU cache over routing results. Not internally synchronized; the router
/// guards it with its own lock.
pub struct RouteCache {
    slots: HashMap<String, CacheSlot>,
    order: VecDeque<String>,
    capacity: usize,
    ttl: Duration,
}

impl RouteCache {
    pub fn new() -> Self {
        Self::with_limits(CACHE_CAPACITY, CACHE_TTL)
    }

    pub fn with_limits(capacity: usize, ttl: Duration) -> Self {
        Self {
            slots: HashMap::new(),
            order: VecDeque::new(),
            capacity,
            ttl,
        }
    }

    /// Fingerprint of a routing request.
    pub fn fingerprint(text: &str, recent_context: &[String]) -> String {
        let tail_start = recent_context.len().saturating_sub(3);
        format!("{}|{}", text, recent_context[tail_start..].join("|"))
    }

    pub fn get(&mut self, key: &str) -> Option<RoutingResult> {
        let expired = match self.slots.get(key) {
            Some(slot) => slot.inserted_at.elapsed() >= self.ttl,
            None => return None,
        };

        if expired {
            self.remove(key);
            return None;
        }

        // Promote to most-recently-used
        self.order.retain(|k| k != key);
        self.order.push_back(key.to_string());
        self.slots.get(key).map(|slot| slot.result.clone())
    }

    pub fn set(&mut self, key: String, result: RoutingResult) {
        if self.slots.contains_key(&key) {
            self.remove(&key);
        }

        while self.slots.len() >= self.capacity {
            match self.order.pop_front() {
                Some(oldest) => {
                    self.slots.remove(&oldest);
                }
                None => break,
            }
        }

        self.slots.insert(
            key.clone(),
            CacheSlot {
                result,
                inserted_at: Instant::now(),
            },
        );
        self.order.push_back(key);
    }

    fn remove(&mut self, key: &str) {
        self.slots.remove(key);
        self.order.retain(|k| k != key);
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }
}

impl Default for RouteCache {
    fn default() -> Self {
        Self::new()
    }
}
