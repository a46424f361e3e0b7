//! Synthesized audio cache
//!
//! Entries are evicted strictly in insertion order. Lookups only peek, so
//! the LRU order of the underlying store never changes after insertion.

use std::fmt;
use std::num::NonZeroUsize;

use lru::LruCache;
use sha2::{Digest, Sha256};

use crate::audio::SampleBuffer;

/// Fingerprint of a synthesis request
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    /// Derive the key for already-resolved request parameters
    ///
    /// Fields are length-prefixed before hashing.
    #[must_use]
    pub fn new(text: &str, voice: &str, language: &str) -> Self {
        let mut hasher = Sha256::new();
        for field in [text, voice, language] {
            hasher.update((field.len() as u64).to_le_bytes());
            hasher.update(field.as_bytes());
        }
        Self(hex::encode(hasher.finalize()))
    }

    /// Hex-encoded fingerprint
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0[..12])
    }
}

/// Bounded FIFO store of decoded audio
#[derive(Debug)]
pub struct ResponseCache {
    entries: LruCache<CacheKey, SampleBuffer>,
}

impl ResponseCache {
    /// Create an empty cache holding at most `capacity` entries
    #[must_use]
    pub fn new(capacity: NonZeroUsize) -> Self {
        Self {
            entries: LruCache::new(capacity),
        }
    }

    /// Look up a cached buffer; `None` is a miss
    #[must_use]
    pub fn get(&self, key: &CacheKey) -> Option<SampleBuffer> {
        self.entries.peek(key).cloned()
    }

    /// Whether `key` is cached
    #[must_use]
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.entries.contains(key)
    }

    /// Insert a buffer, evicting the oldest entry when full
    ///
    /// Replacing an existing key keeps its original insertion position.
    pub fn put(&mut self, key: CacheKey, buffer: SampleBuffer) {
        if let Some(existing) = self.entries.peek_mut(&key) {
            *existing = buffer;
            return;
        }

        if let Some((oldest, _)) = self.entries.push(key, buffer) {
            tracing::debug!(key = %oldest, "evicted oldest cached audio");
        }
    }

    /// Number of cached entries
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Maximum number of entries
    #[must_use]
    pub fn capacity(&self) -> NonZeroUsize {
        self.entries.cap()
    }

    /// Drop every entry
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
