//! Operator-facing view over the result caches.

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::debug;

use super::keys::CacheKey;
use super::store::CachingService;

/// Inspection and invalidation of one named cache, independent of the value
/// type it stores.
pub trait CacheAdmin: Send + Sync {
    fn name(&self) -> &'static str;
    fn cache_keys(&self) -> BTreeSet<CacheKey>;
    fn remove(&self, key: &CacheKey) -> bool;
    fn remove_all(&self) -> usize;
    fn max_age(&self) -> Duration;
    fn purge_expired(&self) -> usize;
}

impl<T> CacheAdmin for CachingService<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn name(&self) -> &'static str {
        CachingService::name(self)
    }

    fn cache_keys(&self) -> BTreeSet<CacheKey> {
        CachingService::cache_keys(self)
    }

    fn remove(&self, key: &CacheKey) -> bool {
        CachingService::remove(self, key)
    }

    fn remove_all(&self) -> usize {
        CachingService::remove_all(self)
    }

    fn max_age(&self) -> Duration {
        CachingService::max_age(self)
    }

    fn purge_expired(&self) -> usize {
        CachingService::purge_expired(self)
    }
}

/// Every cache the process serves from, in registration order.
#[derive(Clone, Default)]
pub struct CacheRegistry {
    caches: Vec<Arc<dyn CacheAdmin>>,
}

impl CacheRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, cache: Arc<dyn CacheAdmin>) {
        self.caches.push(cache);
    }

    pub fn with(mut self, cache: Arc<dyn CacheAdmin>) -> Self {
        self.register(cache);
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<dyn CacheAdmin>> {
        self.caches.iter()
    }

    /// Live keys across all caches.
    pub fn cache_keys(&self) -> BTreeSet<CacheKey> {
        self.caches
            .iter()
            .flat_map(|cache| cache.cache_keys())
            .collect()
    }

    /// Remove `key` from whichever cache holds it.
    pub fn remove(&self, key: &CacheKey) -> bool {
        self.caches
            .iter()
            .fold(false, |removed, cache| cache.remove(key) | removed)
    }

    pub fn remove_all(&self) -> usize {
        self.caches.iter().map(|cache| cache.remove_all()).sum()
    }

    pub fn purge_expired(&self) -> usize {
        self.caches.iter().map(|cache| cache.purge_expired()).sum()
    }
}

/// Periodically release expired entries from every cache in `caches`.
pub fn spawn_sweeper(caches: CacheRegistry, period: Duration) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut interval = tokio::time::interval(period);
        interval.tick().await; // first tick completes immediately
        loop {
            interval.tick().await;
            let purged = caches.purge_expired();
            debug!(purged, "cache sweep finished");
        }
    })
}
