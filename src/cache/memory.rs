//! In-Memory Store Module
//!
//! Concurrent key->item table with one cancellable expiry task per key.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tracing::debug;

use crate::cache::store::{effective_ttl, wildcard_fragment};
use crate::cache::{ttl_millis, CacheItem, CacheStore};
use crate::error::{CacheError, Result};

/// A scheduled expiry for one key. `id` identifies the Set that armed it.
struct ExpiryTimer {
    id: u64,
    handle: JoinHandle<()>,
}

struct MemoryInner {
    items: DashMap<String, CacheItem>,
    /// Guarded separately so that arming, replacing and cancelling a timer
    /// for a key is serialized with the item mutation it belongs to.
    timers: Mutex<HashMap<String, ExpiryTimer>>,
    next_timer_id: AtomicU64,
    default_ttl: Duration,
}

impl MemoryInner {
    /// Fired by the expiry task armed by Set number `id`.
    fn expire(&self, key: &str, id: u64) {
        let mut timers = self.timers.lock();

        // A later Set or an Evict already replaced or cancelled this timer.
        if timers.get(key).map(|t| t.id) != Some(id) {
            return;
        }

        timers.remove(key);
        self.items.remove(key);
        debug!(key = key, "Memory cache entry expired");
    }

    fn remove_with_timer(&self, timers: &mut HashMap<String, ExpiryTimer>, key: &str) -> bool {
        if let Some(timer) = timers.remove(key) {
            timer.handle.abort();
        }
        self.items.remove(key).is_some()
    }
}

impl Drop for MemoryInner {
    fn drop(&mut self) {
        for timer in self.timers.get_mut().values() {
            timer.handle.abort();
        }
    }
}

// == Memory Store ==
/// In-process store backend.
///
/// Cloning is cheap and every clone shares the same tables. Each instance
/// owns its own item table, timer table and lock.
#[derive(Clone)]
pub struct MemoryStore {
    inner: Arc<MemoryInner>,
}

impl MemoryStore {
    // == Constructor ==
    /// Creates a store whose entries live `default_ttl` unless a Set says otherwise.
    ///
    /// Fails when `default_ttl` is zero.
    pub fn new(default_ttl: Duration) -> Result<Self> {
        if default_ttl.is_zero() {
            return Err(CacheError::Config(
                "default TTL must be greater than 0".to_string(),
            ));
        }

        Ok(Self {
            inner: Arc::new(MemoryInner {
                items: DashMap::new(),
                timers: Mutex::new(HashMap::new()),
                next_timer_id: AtomicU64::new(0),
                default_ttl,
            }),
        })
    }

    /// Number of stored items, expired-but-unswept ones included.
    pub fn len(&self) -> usize {
        self.inner.items.len()
    }

    /// True when nothing is stored.
    pub fn is_empty(&self) -> bool {
        self.inner.items.is_empty()
    }

    /// Number of armed expiry timers.
    pub fn pending_timers(&self) -> usize {
        self.inner.timers.lock().len()
    }

    // == Sweep Expired ==
    /// Removes every item whose expiry time has passed.
    ///
    /// Timers normally do this; the sweep catches anything a timer missed.
    /// Returns the number of items removed.
    pub fn sweep_expired(&self) -> usize {
        let mut timers = self.inner.timers.lock();

        let expired: Vec<String> = self
            .inner
            .items
            .iter()
            .filter(|entry| entry.value().is_expired())
            .map(|entry| entry.key().clone())
            .collect();

        expired
            .iter()
            .filter(|key| self.inner.remove_with_timer(&mut timers, key))
            .count()
    }

    fn remove_if_expired(&self, key: &str) {
        let mut timers = self.inner.timers.lock();

        // A concurrent Set may have refreshed the item since it was read.
        let still_expired = self
            .inner
            .items
            .get(key)
            .map(|item| item.is_expired())
            .unwrap_or(false);

        if still_expired {
            self.inner.remove_with_timer(&mut timers, key);
        }
    }
}

#[async_trait]
impl CacheStore for MemoryStore {
    async fn load(&self, key: &str) -> Result<Option<CacheItem>> {
        let expired = match self.inner.items.get(key) {
            Some(item) if !item.is_expired() => {
                debug!(key = key, "Memory cache hit");
                return Ok(Some(item.value().clone()));
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.remove_if_expired(key);
            debug!(key = key, "Memory cache miss (expired)");
        } else {
            debug!(key = key, "Memory cache miss");
        }
        Ok(None)
    }

    async fn set(&self, key: &str, item: CacheItem, ttl: Option<Duration>) -> Result<()> {
        let ttl = effective_ttl(ttl, self.inner.default_ttl);
        let item = item.expiring_in(ttl);

        let mut timers = self.inner.timers.lock();
        self.inner.items.insert(key.to_string(), item);

        let id = self.inner.next_timer_id.fetch_add(1, Ordering::Relaxed);
        let owner = Arc::downgrade(&self.inner);
        let timer_key = key.to_string();
        let handle = tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Some(inner) = owner.upgrade() {
                inner.expire(&timer_key, id);
            }
        });

        if let Some(previous) = timers.insert(key.to_string(), ExpiryTimer { id, handle }) {
            previous.handle.abort();
        }

        debug!(key = key, ttl_ms = ttl_millis(ttl), "Memory cache set");
        Ok(())
    }

    async fn evict(&self, keys: &[String]) -> Result<()> {
        let mut timers = self.inner.timers.lock();

        let mut doomed: Vec<String> = Vec::new();
        for key in keys {
            match wildcard_fragment(key) {
                Some(fragment) => doomed.extend(
                    self.inner
                        .items
                        .iter()
                        .filter(|entry| entry.key().contains(fragment))
                        .map(|entry| entry.key().clone()),
                ),
                None => doomed.push(key.clone()),
            }
        }

        let removed = doomed
            .iter()
            .filter(|key| self.inner.remove_with_timer(&mut timers, key))
            .count();

        debug!(patterns = ?keys, removed = removed, "Memory cache evict");
        Ok(())
    }
}
