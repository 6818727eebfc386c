//! Connection Cache
//!
//! A small, bounded LRU of live service connections keyed by endpoint
//! address. The cache is process-local and shared by every concurrent
//! client call.
//!
//! ## Contract
//!
//! - Hits return the cached value untouched.
//! - A miss runs the user-supplied factory; the cache's lock is held across
//!   the factory call so concurrent misses for the same address never open
//!   duplicate connections.
//! - When insertion would exceed capacity, the least-recently-used entry is
//!   evicted and the destructor runs on it exactly once.
//! - [`ConnectionCache::purge`] evicts everything, running the destructor
//!   on each held value exactly once.

use crate::error::Result;
use futures::future::BoxFuture;
use lru::LruCache;
use std::num::NonZeroUsize;
use tokio::sync::Mutex;

pub type Factory<V> = Box<dyn Fn(String) -> BoxFuture<'static, Result<V>> + Send + Sync>;
pub type Destructor<V> = Box<dyn Fn(&str, V) + Send + Sync>;

/// Bounded LRU of connections with factory and destructor callbacks.
pub struct ConnectionCache<V: Clone> {
    entries: Mutex<LruCache<String, V>>,
    factory: Factory<V>,
    destructor: Destructor<V>,
}

impl<V: Clone> ConnectionCache<V> {
    pub fn new(capacity: usize, factory: Factory<V>, destructor: Destructor<V>) -> Self {
        let capacity = NonZeroUsize::new(capacity).expect("cache capacity must be non-zero");
        Self {
            entries: Mutex::new(LruCache::new(capacity)),
            factory,
            destructor,
        }
    }

    /// The connection for `address`, synthesizing one on miss.
    pub async fn get(&self, address: &str) -> Result<V> {
        let mut entries = self.entries.lock().await;

        if let Some(value) = entries.get(address) {
            return Ok(value.clone());
        }

        tracing::debug!(%address, "creating new connection");
        let value = (self.factory)(address.to_string()).await?;

        if let Some((evicted_key, evicted)) = entries.push(address.to_string(), value.clone()) {
            // push only returns an entry when it displaced one; with the
            // hit-check above that entry is always the LRU victim.
            tracing::debug!(address = %evicted_key, "evicting connection");
            (self.destructor)(&evicted_key, evicted);
        }

        Ok(value)
    }

    /// Evict every held value, running the destructor on each.
    pub async fn purge(&self) {
        let mut entries = self.entries.lock().await;
        while let Some((key, value)) = entries.pop_lru() {
            (self.destructor)(&key, value);
        }
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }
}
