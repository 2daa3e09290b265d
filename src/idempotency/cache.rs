//! # Time-bounded idempotency cache.
//!
//! [`IdempotencyCache`] maps an [`IdempotencyKey`] to the result of the first successful
//! completion of that logical operation, for a bounded time.
//!
//! ## Rules
//! - **First writer wins**: `put` never overwrites a live entry.
//! - **Lazy expiry**: `get` evicts an expired entry and reports it absent.
//! - **Sweep**: `sweep` drops every expired entry; the pipeline runs it periodically.
//! - **Atomic per key**: each read/modify/write happens inside one `DashMap` entry
//!   guard, in synchronous code, so no suspension point exists between check and write.
//!
//! ## Boundary
//! If the side effect succeeded but the process died before `put`, a later retry with
//! the same key re-executes. The persistence layer's own uniqueness constraint on the
//! natural key remains the source of truth; this cache is a fast-path suppressor.
//!
//! Time is read from `tokio::time::Instant` so paused-clock tests can drive expiry.

use std::time::Duration;

use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use tokio::time::Instant;

use super::key::IdempotencyKey;

/// A cached result for one logical operation.
#[derive(Clone, Debug)]
pub struct IdempotencyEntry<T> {
    /// Key of the operation.
    pub key: IdempotencyKey,
    /// Result produced by the first successful completion.
    pub result: T,
    /// When the entry was stored.
    pub created_at: Instant,
    /// When the entry stops being served.
    pub expires_at: Instant,
}

impl<T> IdempotencyEntry<T> {
    fn new(key: IdempotencyKey, result: T, now: Instant, ttl: Duration) -> Self {
        Self {
            key,
            result,
            created_at: now,
            expires_at: now + ttl,
        }
    }

    /// True once `now` reached `expires_at`.
    #[inline]
    pub fn is_expired(&self, now: Instant) -> bool {
        now >= self.expires_at
    }
}

/// Process-wide store of completed operation results.
#[derive(Debug)]
pub struct IdempotencyCache<T> {
    entries: DashMap<IdempotencyKey, IdempotencyEntry<T>>,
    default_ttl: Duration,
}

impl<T: Clone> IdempotencyCache<T> {
    /// Creates an empty cache whose entries live for `default_ttl` unless overridden.
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            default_ttl,
        }
    }

    /// Default time-to-live used by [`put_default`](Self::put_default).
    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Returns the live entry for `key`, evicting it if expired.
    pub fn get(&self, key: &IdempotencyKey) -> Option<IdempotencyEntry<T>> {
        let now = Instant::now();
        match self.entries.entry(key.clone()) {
            Entry::Occupied(occupied) => {
                if occupied.get().is_expired(now) {
                    occupied.remove();
                    None
                } else {
                    Some(occupied.get().clone())
                }
            }
            Entry::Vacant(_) => None,
        }
    }

    /// Stores `result` under `key` unless a live entry already exists.
    ///
    /// Returns `true` if this call stored the result.
    pub fn put(&self, key: IdempotencyKey, result: T, ttl: Duration) -> bool {
        self.put_or_existing(key, result, ttl).is_none()
    }

    /// Same as [`put`](Self::put) with the cache's default TTL.
    pub fn put_default(&self, key: IdempotencyKey, result: T) -> bool {
        self.put(key, result, self.default_ttl)
    }

    /// Stores `result` unless a live entry exists; returns the existing result otherwise.
    ///
    /// `None` means this call won; `Some(existing)` means an earlier writer won and
    /// `result` was discarded.
    pub fn put_or_existing(&self, key: IdempotencyKey, result: T, ttl: Duration) -> Option<T> {
        let now = Instant::now();
        match self.entries.entry(key) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired(now) {
                    let key = occupied.key().clone();
                    occupied.insert(IdempotencyEntry::new(key, result, now, ttl));
                    None
                } else {
                    Some(occupied.get().result.clone())
                }
            }
            Entry::Vacant(vacant) => {
                let key = vacant.key().clone();
                vacant.insert(IdempotencyEntry::new(key, result, now, ttl));
                None
            }
        }
    }

    /// Removes the entry for `key`, live or not. Returns whether one existed.
    pub fn remove(&self, key: &IdempotencyKey) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Drops every expired entry and returns how many were removed.
    pub fn sweep(&self) -> usize {
        let now = Instant::now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_expired(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    /// Number of stored entries, including expired ones not yet evicted.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True if nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Removes everything.
    pub fn clear(&self) {
        self.entries.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn key(s: &str) -> IdempotencyKey {
        IdempotencyKey::new(s)
    }

    #[tokio::test(start_paused = true)]
    async fn test_get_returns_live_entry() {
        let cache = IdempotencyCache::new(Duration::from_secs(60));
        assert!(cache.get(&key("k")).is_none());

        assert!(cache.put_default(key("k"), 7u32));
        let entry = cache.get(&key("k")).expect("live entry");
        assert_eq!(entry.result, 7);
        assert_eq!(entry.expires_at - entry.created_at, Duration::from_secs(60));
    }

    #[tokio::test(start_paused = true)]
    async fn test_first_writer_wins() {
        let cache = IdempotencyCache::new(Duration::from_secs(60));
        assert!(cache.put(key("k"), "first", Duration::from_secs(60)));
        assert!(!cache.put(key("k"), "second", Duration::from_secs(60)));
        assert_eq!(
            cache.put_or_existing(key("k"), "third", Duration::from_secs(60)),
            Some("first")
        );
        assert_eq!(cache.get(&key("k")).map(|e| e.result), Some("first"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_evicted_on_read() {
        let cache = IdempotencyCache::new(Duration::from_secs(10));
        cache.put_default(key("k"), 1u8);
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(cache.get(&key("k")).is_none());
        assert!(cache.is_empty(), "lazy read must delete the entry");
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_entry_can_be_replaced() {
        let cache = IdempotencyCache::new(Duration::from_secs(10));
        cache.put_default(key("k"), 1u8);
        tokio::time::advance(Duration::from_secs(11)).await;

        assert!(cache.put_default(key("k"), 2u8));
        assert_eq!(cache.get(&key("k")).map(|e| e.result), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_removes_only_expired() {
        let cache = IdempotencyCache::new(Duration::from_secs(10));
        cache.put(key("short"), 1u8, Duration::from_secs(5));
        cache.put(key("long"), 2u8, Duration::from_secs(50));
        tokio::time::advance(Duration::from_secs(6)).await;

        assert_eq!(cache.sweep(), 1);
        assert_eq!(cache.len(), 1);
        assert!(cache.get(&key("long")).is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_puts_store_exactly_once() {
        let cache = Arc::new(IdempotencyCache::new(Duration::from_secs(60)));
        let mut handles = Vec::new();
        for i in 0..32u32 {
            let cache = cache.clone();
            handles.push(tokio::spawn(async move { cache.put_default(key("same"), i) }));
        }

        let mut winners = 0;
        for h in handles {
            if h.await.expect("join") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
        assert_eq!(cache.len(), 1);
    }
}
