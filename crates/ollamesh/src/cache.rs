//! Content-addressed cache of completed responses.
//!
//! Deterministic prompts against the same model and sampling options tend to
//! produce identical completions, so finished responses are stored under a
//! SHA-256 key of `(model, prompt, options projection)` and replayed as a
//! single instant fragment on a hit. Caching is an optimization, never a
//! correctness requirement: a `put` that hits the capacity limit purges the
//! store and retries once, and is silently dropped if that still fails.
//!
//! The store is an explicitly owned object injected into the gateway — no
//! module-level singleton — and supports concurrent access through an
//! interior mutex. Last-write-wins on the same key is acceptable because
//! values for an identical key are expected to be identical.

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use sha2::{Digest, Sha256};
use tracing::warn;

/// Default capacity in entries.
const DEFAULT_MAX_ENTRIES: usize = 256;

/// The stable projection of request options that participates in the key.
///
/// Image attachments never reach this type: image-bearing requests are not
/// cached at all (unique prompts, unbounded key space from blob hashing).
#[derive(Debug, Clone, Serialize)]
pub struct KeyProjection {
    pub history_len: usize,
    pub num_ctx: usize,
    pub temperature: f32,
    pub repeat_penalty: f32,
}

/// Derive the deterministic cache key for a request.
pub fn cache_key(model: &str, prompt: &str, options: &KeyProjection) -> String {
    let mut hasher = Sha256::new();
    hasher.update(model.as_bytes());
    hasher.update([0]);
    hasher.update(prompt.as_bytes());
    hasher.update([0]);
    // serde_json serialization of KeyProjection is infallible: plain struct,
    // no maps with non-string keys.
    let projection = serde_json::to_string(options).unwrap_or_default();
    hasher.update(projection.as_bytes());
    hex::encode(hasher.finalize())
}

/// In-memory store of prior completions. Keys map to complete finished
/// responses only — entries are never partially updated.
#[derive(Debug)]
pub struct ResponseCache {
    entries: Mutex<HashMap<String, String>>,
    max_entries: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl Default for ResponseCache {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_ENTRIES)
    }
}

impl ResponseCache {
    /// Create a cache holding at most `max_entries` completions.
    pub fn new(max_entries: usize) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            max_entries,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Look up a completed response.
    pub fn get(&self, key: &str) -> Option<String> {
        let entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        match entries.get(key) {
            Some(value) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(value.clone())
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a completed response. Never fails: on overflow the store is
    /// purged and the write retried once.
    pub fn put(&self, key: String, value: String) {
        let mut entries = self.entries.lock().unwrap_or_else(|e| e.into_inner());
        if entries.len() >= self.max_entries && !entries.contains_key(&key) {
            warn!("response cache full ({} entries), purging", entries.len());
            entries.clear();
        }
        if entries.len() < self.max_entries {
            entries.insert(key, value);
        }
        // A zero-capacity cache drops the write; caching is best-effort.
    }

    pub fn len(&self) -> usize {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drop every entry.
    pub fn clear(&self) {
        self.entries
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    pub fn hits(&self) -> u64 {
        self.hits.load(Ordering::Relaxed)
    }

    pub fn misses(&self) -> u64 {
        self.misses.load(Ordering::Relaxed)
    }
}
