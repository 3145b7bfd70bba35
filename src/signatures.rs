//! Bounded LRU of thinking-block signatures
//!
//! Upstream anthropic stamps an opaque `signature` on every thinking block it
//! emits and verifies that signature when the block is echoed back on a later
//! turn. Recording the signatures we have seen lets the request sanitizer
//! tell anthropic-origin thinking blocks (keep verbatim, the signature must
//! survive) apart from zai-origin ones (convert before anthropic sees them).
//!
//! The store is shared by every in-flight request; a single mutex guards the
//! map and is held only across the O(log n) promotion/eviction. `has` is a
//! mutating read (a hit promotes the entry), so there is no read-only path.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

const DEFAULT_MAX_SIZE: usize = 1000;

struct Inner {
    /// signature -> access sequence number
    by_signature: HashMap<String, u64>,
    /// access sequence number -> signature; lowest key is least-recent
    by_sequence: BTreeMap<u64, String>,
    next_sequence: u64,
}

impl Inner {
    fn touch(&mut self, signature: &str) -> bool {
        let Some(seq) = self.by_signature.get(signature).copied() else {
            return false;
        };
        // Delete-then-insert moves the entry to the most-recent end.
        self.by_sequence.remove(&seq);
        let seq = self.next_sequence;
        self.next_sequence += 1;
        self.by_sequence.insert(seq, signature.to_string());
        self.by_signature.insert(signature.to_string(), seq);
        true
    }
}

/// Access-order LRU of signature strings.
pub struct SignatureStore {
    max_size: usize,
    inner: Mutex<Inner>,
}

impl SignatureStore {
    /// Create a store with the given capacity. Zero falls back to the
    /// default; range validation beyond that happens at the config boundary.
    pub fn new(max_size: usize) -> Self {
        let max_size = if max_size == 0 {
            DEFAULT_MAX_SIZE
        } else {
            max_size
        };
        Self {
            max_size,
            inner: Mutex::new(Inner {
                by_signature: HashMap::new(),
                by_sequence: BTreeMap::new(),
                next_sequence: 0,
            }),
        }
    }

    /// Record a signature. An existing signature is promoted to most-recent;
    /// a new one evicts the least-recent entry when at capacity. Empty
    /// strings are ignored.
    pub fn add(&self, signature: &str) {
        if signature.is_empty() {
            return;
        }
        let mut inner = self.inner.lock().unwrap();
        if inner.touch(signature) {
            return;
        }
        if inner.by_signature.len() >= self.max_size {
            let oldest = inner.by_sequence.keys().next().copied();
            if let Some(oldest) = oldest {
                if let Some(evicted) = inner.by_sequence.remove(&oldest) {
                    inner.by_signature.remove(&evicted);
                }
            }
        }
        let seq = inner.next_sequence;
        inner.next_sequence += 1;
        inner.by_sequence.insert(seq, signature.to_string());
        inner.by_signature.insert(signature.to_string(), seq);
    }

    /// Membership test. A hit promotes the entry to most-recent.
    pub fn has(&self, signature: &str) -> bool {
        if signature.is_empty() {
            return false;
        }
        self.inner.lock().unwrap().touch(signature)
    }

    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().by_signature.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.by_signature.clear();
        inner.by_sequence.clear();
    }

    /// Snapshot of retained signatures, least-recent first. Diagnostic only.
    pub fn all(&self) -> Vec<String> {
        let inner = self.inner.lock().unwrap();
        inner.by_sequence.values().cloned().collect()
    }

    pub fn max_size(&self) -> usize {
        self.max_size
    }
}
