//! Per-archive memo state
//!
//! Holds the signature verdict, computed at most once, and an optional LRU
//! of decoded leaf payloads keyed by leaf id.

use crate::error::Result;
use lru::LruCache;
use parking_lot::Mutex;
use serde::Serialize;
use std::num::NonZeroUsize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};

/// A decoded leaf as kept by the cache
#[derive(Debug, Clone)]
pub struct CachedLeaf {
    pub data: Arc<[u8]>,
    /// Whether the stored bytes matched their digest (true when none was recorded)
    pub digest_ok: bool,
}

/// Cache counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub entries: usize,
    pub capacity: usize,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

pub struct ResourceCache {
    signature: OnceLock<bool>,
    decoded: Option<Mutex<LruCache<Arc<str>, CachedLeaf>>>,
    capacity: usize,
    hits: AtomicU64,
    misses: AtomicU64,
}

impl ResourceCache {
    /// Create the memo state. A capacity of zero disables the payload cache.
    pub fn new(capacity: usize) -> Self {
        ResourceCache {
            signature: OnceLock::new(),
            decoded: NonZeroUsize::new(capacity).map(|n| Mutex::new(LruCache::new(n))),
            capacity,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
        }
    }

    /// Signature verdict, if it has been computed
    pub fn signature(&self) -> Option<bool> {
        self.signature.get().copied()
    }

    /// Signature verdict, computing it with `verify` on first use.
    ///
    /// Callers hold the source lock while calling this, so `verify` runs at
    /// most once per archive. An error leaves the verdict unset and the next
    /// call tries again.
    pub fn signature_or_try_init(&self, verify: impl FnOnce() -> Result<bool>) -> Result<bool> {
        if let Some(&verdict) = self.signature.get() {
            return Ok(verdict);
        }
        let verdict = verify()?;
        Ok(*self.signature.get_or_init(|| verdict))
    }

    pub fn is_enabled(&self) -> bool {
        self.decoded.is_some()
    }

    pub fn get(&self, id: &str) -> Option<CachedLeaf> {
        let decoded = self.decoded.as_ref()?;
        let found = decoded.lock().get(id).cloned();
        self.count(found.is_some());
        found
    }

    pub fn get_mut(&mut self, id: &str) -> Option<CachedLeaf> {
        let decoded = self.decoded.as_mut()?;
        let found = decoded.get_mut().get(id).cloned();
        self.count(found.is_some());
        found
    }

    pub fn put(&self, id: Arc<str>, leaf: CachedLeaf) {
        if let Some(decoded) = &self.decoded {
            decoded.lock().put(id, leaf);
        }
    }

    pub fn put_mut(&mut self, id: Arc<str>, leaf: CachedLeaf) {
        if let Some(decoded) = self.decoded.as_mut() {
            decoded.get_mut().put(id, leaf);
        }
    }

    /// Drop all cached payloads. The signature verdict is kept.
    pub fn clear(&self) {
        if let Some(decoded) = &self.decoded {
            decoded.lock().clear();
        }
    }

    fn count(&self, hit: bool) {
        let counter = if hit { &self.hits } else { &self.misses };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            entries: self.decoded.as_ref().map_or(0, |d| d.lock().len()),
            capacity: self.capacity,
        }
    }
}

impl std::fmt::Debug for ResourceCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResourceCache")
            .field("signature", &self.signature())
            .field("stats", &self.stats())
            .finish()
    }
}
