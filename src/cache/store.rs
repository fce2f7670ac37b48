//! Single-flight result cache with a fixed entry lifetime.
//!
//! Each key owns a slot holding at most one stored entry and at most one
//! in-flight computation. Concurrent misses on a key share the in-flight
//! computation instead of starting their own. Entries expire lazily: an
//! expired entry reads as absent and is replaced by the next successful
//! computation.

use std::any::Any;
use std::collections::BTreeSet;
use std::fmt;
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use metrics::counter;
use time::OffsetDateTime;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::application::params::{ParamMap, ParameterSource};

use super::keys::CacheKey;

pub const HIT_TOTAL: &str = "marketplace_cache_hit_total";
pub const MISS_TOTAL: &str = "marketplace_cache_miss_total";
pub const COALESCED_TOTAL: &str = "marketplace_cache_coalesced_total";
pub const COMPUTE_FAILURE_TOTAL: &str = "marketplace_cache_compute_failure_total";
pub const EVICT_TOTAL: &str = "marketplace_cache_evict_total";

/// A value served from the cache together with its expiration.
#[derive(Debug, Clone, PartialEq)]
pub struct Cached<T> {
    pub value: T,
    pub created_at: OffsetDateTime,
    pub expires_at: OffsetDateTime,
}

type Flight<T> = Shared<BoxFuture<'static, Option<Cached<T>>>>;

struct Entry<T> {
    cached: Cached<T>,
    deadline: Instant,
}

impl<T> Entry<T> {
    fn new(cached: Cached<T>, max_age: Duration) -> Self {
        Self {
            cached,
            deadline: Instant::now() + max_age,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        now < self.deadline
    }
}

struct InFlight<T> {
    ticket: u64,
    flight: Flight<T>,
}

struct Slot<T> {
    entry: Option<Entry<T>>,
    in_flight: Option<InFlight<T>>,
}

impl<T> Default for Slot<T> {
    fn default() -> Self {
        Self {
            entry: None,
            in_flight: None,
        }
    }
}

impl<T> Slot<T> {
    fn live_entry(&self, now: Instant) -> Option<&Entry<T>> {
        self.entry.as_ref().filter(|entry| entry.is_live(now))
    }

    fn is_vacant(&self, now: Instant) -> bool {
        self.in_flight.is_none() && self.live_entry(now).is_none()
    }
}

enum Lookup<T> {
    Hit(Cached<T>),
    Wait(Flight<T>),
}

struct Inner<T> {
    name: &'static str,
    max_age: Duration,
    slots: DashMap<CacheKey, Slot<T>>,
    tickets: AtomicU64,
}

/// Shared handle to a named result cache.
///
/// Cloning is cheap; every clone addresses the same slots.
pub struct CachingService<T> {
    inner: Arc<Inner<T>>,
}

impl<T> Clone for CachingService<T> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<T> fmt::Debug for CachingService<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CachingService")
            .field("name", &self.inner.name)
            .field("max_age", &self.inner.max_age)
            .field("slots", &self.inner.slots.len())
            .finish()
    }
}

impl<T> CachingService<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(name: &'static str, max_age: Duration) -> Self {
        Self {
            inner: Arc::new(Inner {
                name,
                max_age,
                slots: DashMap::new(),
                tickets: AtomicU64::new(0),
            }),
        }
    }

    pub fn name(&self) -> &'static str {
        self.inner.name
    }

    pub fn max_age(&self) -> Duration {
        self.inner.max_age
    }

    /// Value for `id`, computing it at most once per key while no live entry
    /// exists. `None` means the computation failed; failures are not stored.
    pub async fn get<F, Fut, E>(
        &self,
        id: &str,
        source: &dyn ParameterSource,
        params: Option<&ParamMap>,
        compute: F,
    ) -> Option<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        self.fetch(CacheKey::for_request(id, source, params), compute)
            .await
            .map(|cached| cached.value)
    }

    /// Like [`get`](Self::get) but addressed by a ready key and returning the
    /// entry's timestamps alongside the value.
    pub async fn fetch<F, Fut, E>(&self, key: CacheKey, compute: F) -> Option<Cached<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        match self.lookup(key, compute) {
            Lookup::Hit(cached) => Some(cached),
            Lookup::Wait(flight) => flight.await,
        }
    }

    /// Expiration of the live entry for `id`, if any.
    pub fn expiration(&self, id: &str, source: &dyn ParameterSource) -> Option<OffsetDateTime> {
        let key = CacheKey::for_request(id, source, None);
        let now = Instant::now();
        self.inner
            .slots
            .get(&key)
            .and_then(|slot| slot.live_entry(now).map(|entry| entry.cached.expires_at))
    }

    /// Keys that currently hold a live entry.
    pub fn cache_keys(&self) -> BTreeSet<CacheKey> {
        let now = Instant::now();
        self.inner
            .slots
            .iter()
            .filter(|slot| slot.live_entry(now).is_some())
            .map(|slot| slot.key().clone())
            .collect()
    }

    /// Drop the entry and any in-flight computation for `key`.
    pub fn remove(&self, key: &CacheKey) -> bool {
        let removed = self.inner.slots.remove(key).is_some();
        if removed {
            counter!(EVICT_TOTAL, "cache" => self.inner.name).increment(1);
            info!(cache = self.inner.name, key = %key, "cache entry removed");
        }
        removed
    }

    /// Drop every entry and in-flight computation.
    pub fn remove_all(&self) -> usize {
        let keys: Vec<CacheKey> = self
            .inner
            .slots
            .iter()
            .map(|slot| slot.key().clone())
            .collect();
        let removed = keys
            .iter()
            .filter(|key| self.inner.slots.remove(*key).is_some())
            .count();

        counter!(EVICT_TOTAL, "cache" => self.inner.name).increment(removed as u64);
        info!(cache = self.inner.name, removed, "cache cleared");
        removed
    }

    /// Release slots whose entry expired and that have no computation running.
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.inner.slots.len();
        self.inner.slots.retain(|_, slot| !slot.is_vacant(now));
        let purged = before.saturating_sub(self.inner.slots.len());
        if purged > 0 {
            debug!(cache = self.inner.name, purged, "expired cache entries purged");
        }
        purged
    }

    fn lookup<F, Fut, E>(&self, key: CacheKey, compute: F) -> Lookup<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let name = self.inner.name;
        let now = Instant::now();
        let mut slot = self.inner.slots.entry(key.clone()).or_default();

        if let Some(entry) = slot.live_entry(now) {
            counter!(HIT_TOTAL, "cache" => name).increment(1);
            debug!(cache = name, key = %key, "cache hit");
            return Lookup::Hit(entry.cached.clone());
        }

        if let Some(in_flight) = slot.in_flight.as_ref() {
            counter!(COALESCED_TOTAL, "cache" => name).increment(1);
            debug!(cache = name, key = %key, "joining in-flight computation");
            return Lookup::Wait(in_flight.flight.clone());
        }

        counter!(MISS_TOTAL, "cache" => name).increment(1);
        debug!(cache = name, key = %key, "cache miss");

        let ticket = self.inner.tickets.fetch_add(1, Ordering::Relaxed);
        let flight = self.start(key, ticket, compute);
        slot.in_flight = Some(InFlight {
            ticket,
            flight: flight.clone(),
        });
        Lookup::Wait(flight)
    }

    fn start<F, Fut, E>(&self, key: CacheKey, ticket: u64, compute: F) -> Flight<T>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        E: fmt::Display + Send + 'static,
    {
        let inner = Arc::downgrade(&self.inner);
        let name = self.inner.name;
        let max_age = self.inner.max_age;

        let computation = async move {
            let outcome = AssertUnwindSafe(async move { compute().await })
                .catch_unwind()
                .await;
            let cached = settle(name, &key, outcome).map(|value| {
                let now = OffsetDateTime::now_utc();
                Cached {
                    value,
                    created_at: now,
                    expires_at: now + max_age,
                }
            });
            finish(&inner, &key, ticket, cached.as_ref());
            cached
        };

        // Runs to completion even when every waiter is dropped.
        tokio::spawn(computation)
            .map(|joined| joined.ok().flatten())
            .boxed()
            .shared()
    }
}

fn settle<T, E: fmt::Display>(
    name: &'static str,
    key: &CacheKey,
    outcome: Result<Result<T, E>, Box<dyn Any + Send>>,
) -> Option<T> {
    match outcome {
        Ok(Ok(value)) => Some(value),
        Ok(Err(err)) => {
            counter!(COMPUTE_FAILURE_TOTAL, "cache" => name).increment(1);
            warn!(cache = name, key = %key, error = %err, "cache computation failed");
            None
        }
        Err(panic) => {
            counter!(COMPUTE_FAILURE_TOTAL, "cache" => name).increment(1);
            warn!(
                cache = name,
                key = %key,
                panic = panic_message(panic.as_ref()),
                "cache computation panicked"
            );
            None
        }
    }
}

/// Retire computation `ticket` for `key`, storing its result if it succeeded.
///
/// A failed computation on a slot without an entry releases the slot.
fn finish<T: Clone>(
    inner: &Weak<Inner<T>>,
    key: &CacheKey,
    ticket: u64,
    cached: Option<&Cached<T>>,
) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let owns = |slot: &Slot<T>| slot.in_flight.as_ref().map(|f| f.ticket) == Some(ticket);

    let Some(cached) = cached else {
        let released = inner
            .slots
            .remove_if(key, |_, slot| owns(slot) && slot.entry.is_none())
            .is_some();
        if !released {
            if let Some(mut slot) = inner.slots.get_mut(key) {
                if owns(slot.value()) {
                    slot.in_flight = None;
                }
            }
        }
        return;
    };

    let Some(mut slot) = inner.slots.get_mut(key) else {
        debug!(cache = inner.name, key = %key, "discarding result of removed computation");
        return;
    };

    if !owns(slot.value()) {
        debug!(cache = inner.name, key = %key, "discarding result of superseded computation");
        return;
    }

    slot.in_flight = None;
    slot.entry = Some(Entry::new(cached.clone(), inner.max_age));
    debug!(cache = inner.name, key = %key, "cache entry stored");
}

fn panic_message(panic: &(dyn Any + Send)) -> &str {
    panic
        .downcast_ref::<&'static str>()
        .copied()
        .or_else(|| panic.downcast_ref::<String>().map(String::as_str))
        .unwrap_or("non-string panic payload")
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;

    use super::*;
    use crate::application::params::{RequestParams, UrlParameterName};

    fn counted(
        calls: &Arc<AtomicUsize>,
        value: u32,
    ) -> impl FnOnce() -> futures::future::Ready<Result<u32, String>> + Send + 'static {
        let calls = Arc::clone(calls);
        move || {
            calls.fetch_add(1, Ordering::SeqCst);
            futures::future::ready(Ok(value))
        }
    }

    fn request() -> RequestParams {
        RequestParams::new("error_reports").with_param(UrlParameterName::Read, "true")
    }

    #[tokio::test(start_paused = true)]
    async fn live_entry_is_served_without_recomputing() {
        let cache = CachingService::new("reports", Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let params = request();

        assert_eq!(cache.get("all", &params, None, counted(&calls, 1)).await, Some(1));
        assert_eq!(cache.get("all", &params, None, counted(&calls, 2)).await, Some(1));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn expired_entry_is_recomputed() {
        let cache = CachingService::new("reports", Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let params = request();

        cache.get("all", &params, None, counted(&calls, 1)).await;
        tokio::time::advance(Duration::from_secs(59)).await;
        assert_eq!(cache.get("all", &params, None, counted(&calls, 2)).await, Some(1));

        tokio::time::advance(Duration::from_secs(1)).await;
        assert!(cache.cache_keys().is_empty());
        assert!(cache.expiration("all", &params).is_none());
        assert_eq!(cache.get("all", &params, None, counted(&calls, 2)).await, Some(2));
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn failures_are_not_stored() {
        let cache: CachingService<u32> = CachingService::new("reports", Duration::from_secs(60));
        let params = request();

        let failed = cache
            .get("all", &params, None, || async { Err::<u32, _>("database down") })
            .await;
        assert_eq!(failed, None);
        assert!(cache.cache_keys().is_empty());
        assert!(cache.inner.slots.is_empty());

        let calls = Arc::new(AtomicUsize::new(0));
        assert_eq!(cache.get("all", &params, None, counted(&calls, 7)).await, Some(7));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn panicking_computation_reads_as_failure() {
        let cache: CachingService<u32> = CachingService::new("reports", Duration::from_secs(60));
        let params = request();

        let result = cache
            .get("all", &params, None, || async {
                if true {
                    panic!("boom");
                }
                Ok::<u32, String>(1)
            })
            .await;

        assert_eq!(result, None);
        assert!(cache.cache_keys().is_empty());
    }

    #[tokio::test]
    async fn remove_all_empties_key_set() {
        let cache = CachingService::new("reports", Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));

        for id in ["all", "a", "b"] {
            cache.get(id, &request(), None, counted(&calls, 1)).await;
        }
        assert_eq!(cache.cache_keys().len(), 3);

        assert_eq!(cache.remove_all(), 3);
        assert!(cache.cache_keys().is_empty());
    }

    #[tokio::test]
    async fn remove_drops_single_key() {
        let cache = CachingService::new("reports", Duration::from_secs(60));
        let calls = Arc::new(AtomicUsize::new(0));
        let params = request();

        cache.get("all", &params, None, counted(&calls, 1)).await;
        cache.get("other", &params, None, counted(&calls, 1)).await;

        let key = CacheKey::for_request("all", &params, None);
        assert!(cache.remove(&key));
        assert!(!cache.remove(&key));
        assert_eq!(cache.cache_keys().len(), 1);
        assert!(!cache.cache_keys().contains(&key));
    }

    #[tokio::test]
    async fn removal_during_computation_discards_result() {
        let cache: CachingService<u32> = CachingService::new("reports", Duration::from_secs(60));
        let params = request();
        let (release, gate) = tokio::sync::oneshot::channel::<()>();

        let pending = {
            let cache = cache.clone();
            let params = params.clone();
            tokio::spawn(async move {
                cache
                    .get("all", &params, None, move || async move {
                        let _ = gate.await;
                        Ok::<u32, String>(1)
                    })
                    .await
            })
        };

        tokio::task::yield_now().await;
        assert_eq!(cache.remove_all(), 1);
        let _ = release.send(());

        assert_eq!(pending.await.expect("task completes"), Some(1));
        assert!(cache.cache_keys().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn abandoned_computation_runs_to_completion() {
        let cache: CachingService<u32> = CachingService::new("reports", Duration::from_secs(60));
        let pool = Arc::new(tokio::sync::Semaphore::new(1));
        let params = request();

        let caller = {
            let cache = cache.clone();
            let pool = Arc::clone(&pool);
            let params = params.clone();
            tokio::spawn(async move {
                cache
                    .get("a", &params, None, move || async move {
                        let _connection = pool.acquire_owned().await.map_err(|e| e.to_string())?;
                        tokio::time::sleep(Duration::from_millis(20)).await;
                        Ok::<u32, String>(1)
                    })
                    .await
            })
        };

        tokio::time::sleep(Duration::from_millis(5)).await;
        caller.abort();
        assert!(caller.await.is_err_and(|err| err.is_cancelled()));
        tokio::time::sleep(Duration::from_millis(100)).await;

        assert_eq!(pool.available_permits(), 1);
        let key = CacheKey::for_request("a", &params, None);
        assert!(cache.cache_keys().contains(&key));

        let other = {
            let pool = Arc::clone(&pool);
            cache.get("b", &params, None, move || async move {
                let _connection = pool.acquire_owned().await.map_err(|e| e.to_string())?;
                Ok::<u32, String>(2)
            })
        };
        let other = tokio::time::timeout(Duration::from_secs(1), other).await;
        assert_eq!(other, Ok(Some(2)));
    }

    #[tokio::test(start_paused = true)]
    async fn failed_computation_keeps_only_slots_with_entries() {
        let cache: CachingService<u32> = CachingService::new("reports", Duration::from_secs(60));
        let params = request();
        let calls = Arc::new(AtomicUsize::new(0));
        let key = CacheKey::for_request("all", &params, None);

        cache.get("all", &params, None, counted(&calls, 1)).await;
        tokio::time::advance(Duration::from_secs(61)).await;

        for id in ["all", "other"] {
            let failed = cache
                .get(id, &params, None, || async { Err::<u32, _>("timeout") })
                .await;
            assert_eq!(failed, None);
        }

        assert_eq!(cache.inner.slots.len(), 1);
        assert!(
            cache
                .inner
                .slots
                .get(&key)
                .is_some_and(|slot| slot.in_flight.is_none())
        );
        assert_eq!(cache.get("all", &params, None, counted(&calls, 2)).await, Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn expiration_tracks_max_age() {
        let cache = CachingService::new("reports", Duration::from_secs(90));
        let calls = Arc::new(AtomicUsize::new(0));
        let params = request();

        let cached = cache
            .fetch(CacheKey::for_request("all", &params, None), counted(&calls, 3))
            .await
            .expect("computed");
        assert_eq!(cached.expires_at - cached.created_at, time::Duration::seconds(90));
        assert_eq!(cache.expiration("all", &params), Some(cached.expires_at));
    }

    #[tokio::test(start_paused = true)]
    async fn purge_releases_expired_slots_only() {
        let cache = CachingService::new("reports", Duration::from_secs(10));
        let calls = Arc::new(AtomicUsize::new(0));

        cache.get("old", &request(), None, counted(&calls, 1)).await;
        tokio::time::advance(Duration::from_secs(11)).await;
        cache.get("fresh", &request(), None, counted(&calls, 1)).await;

        assert_eq!(cache.purge_expired(), 1);
        assert_eq!(cache.cache_keys().len(), 1);
        assert_eq!(cache.purge_expired(), 0);
    }

    #[test]
    fn panic_message_reads_common_payloads() {
        let literal: Box<dyn Any + Send> = Box::new("static");
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let other: Box<dyn Any + Send> = Box::new(7_u8);

        assert_eq!(panic_message(literal.as_ref()), "static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(other.as_ref()), "non-string panic payload");
    }
}
