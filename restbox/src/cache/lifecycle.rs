//! Request lifecycle controller.
//!
//! [`RequestCache`] owns the three pieces of shared cache state of one
//! client - the [`CacheStore`], the [`EvictionTimers`] and the
//! [`RunningRequests`] index - behind a single mutex, and drives every
//! cacheable GET request through:
//!
//! ```text
//!            +-> EVICTING --------------------------+
//! BUILDING --+                                      +-> MISS ----> RESOLVED
//!            +-> CACHE_CHECK -+-> HIT --------------|------------> RESOLVED
//!                             +-> FUTURE_HIT -------|------------> RESOLVED
//!                             +-> MISS -------------+
//! ```
//!
//! The lock is never held across an `.await`. Network calls run on their own
//! Tokio task, so a caller that drops its future does not strand the other
//! requests coalesced onto its call.

use std::future::Future;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use chrono::{DateTime, Utc};
use restbox_core::{CacheKey, RawResponse, RequestCacheOptions, TransportError};
use tokio::sync::oneshot;
use tracing::{Instrument, debug};

use super::running::{RequestId, RunningRequests};
use super::store::{CacheEntry, CacheStore};
use super::timer::{EvictionTimers, TimerId};
use crate::error::{Error, Result};

#[cfg(feature = "metrics")]
use crate::metrics::{
    CACHE_EVICTED_COUNTER, CACHE_FUTURE_HIT_COUNTER, CACHE_HIT_COUNTER, CACHE_MISS_COUNTER,
};

/// What every request of a slice receives.
pub type Delivery = std::result::Result<Arc<RawResponse>, TransportError>;

type Waiter = oneshot::Sender<Delivery>;

/// How a request was served by the cache layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CacheStatus {
    /// Served from the cache store, no network call.
    Hit,
    /// Coalesced onto an identical in-flight request, no network call.
    FutureHit,
    /// Performed the network call (cache miss or evicting request).
    Miss,
    /// Not eligible for caching: not a GET, or no cache options.
    Bypass,
}

impl CacheStatus {
    /// Returns the status as printed in logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Hit => "HIT",
            Self::FutureHit => "FUTURE_HIT",
            Self::Miss => "MISS",
            Self::Bypass => "BYPASS",
        }
    }
}

/// Response resolved through the cache layer.
#[derive(Debug, Clone)]
pub struct Resolved {
    /// The shared response.
    pub response: Arc<RawResponse>,
    /// How it was obtained.
    pub status: CacheStatus,
}

#[derive(Debug, Default)]
struct CacheState {
    store: CacheStore,
    timers: EvictionTimers,
    running: RunningRequests<Waiter>,
}

#[derive(Debug, Default)]
struct Inner {
    state: Mutex<CacheState>,
    next_request: AtomicU64,
    closed: AtomicBool,
}

enum Admission {
    /// Wait for a response someone else delivers (HIT or FUTURE_HIT).
    Wait(oneshot::Receiver<Delivery>),
    /// Perform the network call, then wait for the slice delivery.
    Dispatch {
        id: RequestId,
        receiver: oneshot::Receiver<Delivery>,
    },
}

/// Per-client response cache with in-flight request coalescing.
///
/// Cloning is cheap and clones share the same state.
#[derive(Debug, Clone, Default)]
pub struct RequestCache {
    inner: Arc<Inner>,
}

impl RequestCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves one cacheable request.
    ///
    /// `fetch` is invoked at most once, and only when the request ends up on
    /// the MISS path (including evicting requests). Its future is spawned on
    /// the Tokio runtime.
    pub async fn execute<F, Fut>(
        &self,
        key: CacheKey,
        options: &RequestCacheOptions,
        fetch: F,
    ) -> Result<Resolved>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<RawResponse, TransportError>> + Send + 'static,
    {
        let (status, admission) = self.admit(key.clone(), options)?;

        let receiver = match admission {
            Admission::Wait(receiver) => {
                if status == CacheStatus::Hit {
                    // Cache hits are still delivered on a later turn of the scheduler.
                    tokio::task::yield_now().await;
                }
                receiver
            }
            Admission::Dispatch { id, receiver } => {
                let completion = Completion {
                    cache: self.clone(),
                    key,
                    id,
                    options: options.clone(),
                    finished: false,
                };
                let call = fetch();
                tokio::spawn(
                    async move {
                        let result = call.await;
                        completion.finish(result);
                    }
                    .in_current_span(),
                );
                receiver
            }
        };

        match receiver.await {
            Ok(Ok(response)) => Ok(Resolved { response, status }),
            Ok(Err(error)) => Err(Error::Transport(error)),
            Err(_) => Err(Error::Closed),
        }
    }

    fn admit(
        &self,
        key: CacheKey,
        options: &RequestCacheOptions,
    ) -> Result<(CacheStatus, Admission)> {
        let mut state = self.lock();
        if self.is_closed() {
            return Err(Error::Closed);
        }

        if options.evict_before {
            state.timers.cancel(&key);
            if state.store.remove(&key).is_some() {
                debug!(%key, "EVICTING entry from cache");
                #[cfg(feature = "metrics")]
                metrics::counter!(*CACHE_EVICTED_COUNTER, "reason" => "evict_before").increment(1);
            }
        }

        if options.evict_all_before {
            let evicted = state.store.clear();
            state.timers.cancel_all();
            debug!(evicted, "EVICTING all entries from cache");
            #[cfg(feature = "metrics")]
            metrics::counter!(*CACHE_EVICTED_COUNTER, "reason" => "evict_all_before")
                .increment(evicted as u64);
        }

        let id = self.next_request_id();
        let (sender, receiver) = oneshot::channel();

        if options.is_evicting() {
            debug!(%key, "Cache MISS. Evicting request bypasses cache lookup");
            state.running.register(key, id, true, sender);
            #[cfg(feature = "metrics")]
            metrics::counter!(*CACHE_MISS_COUNTER).increment(1);
            return Ok((CacheStatus::Miss, Admission::Dispatch { id, receiver }));
        }

        if let Some(entry) = state.store.get(&key) {
            debug!(%key, age_ms = entry.age().num_milliseconds(), "Cache HIT");
            let response = Arc::clone(entry.response());
            if let Some(ttl) = options.access_ttl() {
                self.arm_timer(&mut state, key, ttl);
            }
            // The receiver is still alive, so this cannot fail.
            let _ = sender.send(Ok(response));
            #[cfg(feature = "metrics")]
            metrics::counter!(*CACHE_HIT_COUNTER).increment(1);
            return Ok((CacheStatus::Hit, Admission::Wait(receiver)));
        }

        if state.running.has_pending(&key) {
            debug!(%key, pending = state.running.pending(&key), "Cache FUTURE HIT");
            state.running.register(key, id, false, sender);
            #[cfg(feature = "metrics")]
            metrics::counter!(*CACHE_FUTURE_HIT_COUNTER).increment(1);
            return Ok((CacheStatus::FutureHit, Admission::Wait(receiver)));
        }

        debug!(%key, "Cache MISS. Proceeding with request");
        state.running.register(key, id, false, sender);
        #[cfg(feature = "metrics")]
        metrics::counter!(*CACHE_MISS_COUNTER).increment(1);
        Ok((CacheStatus::Miss, Admission::Dispatch { id, receiver }))
    }

    /// Handles the network result of request `id` and notifies its slice.
    fn complete(
        &self,
        key: &CacheKey,
        id: RequestId,
        options: &RequestCacheOptions,
        result: std::result::Result<RawResponse, TransportError>,
    ) {
        let delivery: Delivery = result.map(Arc::new);

        let waiters = {
            let mut state = self.lock();
            let slice = state.running.compute_slice(key, id);

            if self.is_closed() {
                debug!(%key, "Request cache closed, dropping response");
                // Dropped waiters resolve with `Error::Closed`.
                drop(state.running.remove(key, &slice.waiters));
                return;
            }

            match &delivery {
                Ok(response) if slice.is_last_fired => {
                    let status = response.status.as_u16();
                    if options.is_cacheable(status) {
                        debug!(%key, status, "Caching entry");
                        state
                            .store
                            .put(key.clone(), CacheEntry::new(Arc::clone(response)));
                        self.arm_timer(&mut state, key.clone(), options.expires_after_write);
                    } else {
                        debug!(%key, status, "Response status is not cacheable");
                    }
                }
                Ok(_) => {
                    debug!(%key, "Superseded by a later evicting request, not caching");
                }
                Err(error) => {
                    debug!(%key, %error, waiters = slice.waiters.len(), "Failing coalesced requests");
                }
            }

            state.running.remove(key, &slice.waiters)
        };

        for pending in waiters {
            let waiter_id = pending.id();
            if pending.into_waiter().send(delivery.clone()).is_err() {
                debug!(%key, ?waiter_id, "Waiter went away before delivery");
            }
        }
    }

    fn arm_timer(&self, state: &mut CacheState, key: CacheKey, ttl: Duration) {
        let inner = Arc::downgrade(&self.inner);
        let timer_key = key.clone();
        state.timers.schedule(key, ttl, move |timer| {
            expire(&inner, &timer_key, timer);
        });
    }

    /// Cancels every eviction timer, clears the store and fails every
    /// pending request with [`Error::Closed`].
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::SeqCst);
        let pending = {
            let mut state = self.lock();
            let timers = state.timers.cancel_all();
            let entries = state.store.clear();
            let pending = state.running.drain();
            debug!(timers, entries, pending = pending.len(), "Closing request cache");
            pending
        };
        // Dropping the senders resolves every waiter with `Error::Closed`.
        drop(pending);
    }

    /// Returns `true` once [`close`](Self::close) was called.
    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::SeqCst)
    }

    /// Number of cached entries.
    pub fn len(&self) -> usize {
        self.lock().store.len()
    }

    /// Returns `true` when nothing is cached.
    pub fn is_empty(&self) -> bool {
        self.lock().store.is_empty()
    }

    /// Returns `true` when a response is cached under `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.lock().store.contains(key)
    }

    /// Returns when the response cached under `key` was written.
    pub fn stored_at(&self, key: &CacheKey) -> Option<DateTime<Utc>> {
        self.lock().store.get(key).map(CacheEntry::stored_at)
    }

    /// Number of requests currently waiting in the running-requests index.
    pub fn running_len(&self) -> usize {
        self.lock().running.len()
    }

    /// Number of armed eviction timers.
    pub fn timers_len(&self) -> usize {
        self.lock().timers.len()
    }

    fn next_request_id(&self) -> RequestId {
        RequestId(self.inner.next_request.fetch_add(1, Ordering::Relaxed))
    }

    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.inner.lock()
    }
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, CacheState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn expire(inner: &Weak<Inner>, key: &CacheKey, timer: TimerId) {
    let Some(inner) = inner.upgrade() else {
        return;
    };
    let mut state = inner.lock();
    if state.timers.expire(key, timer) && state.store.remove(key).is_some() {
        debug!(%key, "EVICTING expired entry from cache");
        #[cfg(feature = "metrics")]
        metrics::counter!(*CACHE_EVICTED_COUNTER, "reason" => "expired").increment(1);
    }
}

/// Completes a dispatched request exactly once.
///
/// If the network task ends without a result (panic or runtime shutdown)
/// the slice is failed with [`TransportError::Cancelled`] so no waiter is
/// left behind in the running-requests index.
struct Completion {
    cache: RequestCache,
    key: CacheKey,
    id: RequestId,
    options: RequestCacheOptions,
    finished: bool,
}

impl Completion {
    fn finish(mut self, result: std::result::Result<RawResponse, TransportError>) {
        self.finished = true;
        self.cache.complete(&self.key, self.id, &self.options, result);
    }
}

impl Drop for Completion {
    fn drop(&mut self) {
        if !self.finished {
            self.cache.complete(
                &self.key,
                self.id,
                &self.options,
                Err(TransportError::Cancelled),
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use http::StatusCode;

    fn key() -> CacheKey {
        CacheKey::from_parts("/users/1", Vec::<(&str, &str)>::new(), b"")
    }

    fn options() -> RequestCacheOptions {
        RequestCacheOptions::new().with_expires_after_write(Duration::from_secs(10))
    }

    fn ok() -> std::result::Result<RawResponse, TransportError> {
        Ok(RawResponse::new(StatusCode::OK).with_body("cached"))
    }

    #[tokio::test]
    async fn test_completed_miss_records_write_time() {
        let cache = RequestCache::new();
        let before = Utc::now();

        let resolved = cache
            .execute(key(), &options(), || async { ok() })
            .await
            .unwrap();

        assert_eq!(resolved.status, CacheStatus::Miss);
        let stored_at = cache.stored_at(&key()).unwrap();
        assert!(stored_at >= before && stored_at <= Utc::now());
        assert_eq!(cache.timers_len(), 1);
        let other = CacheKey::from_parts("/other", Vec::<(&str, &str)>::new(), b"");
        assert!(cache.stored_at(&other).is_none());
    }

    #[tokio::test]
    async fn test_admission_checks_closed_flag_under_lock() {
        let cache = RequestCache::new();
        cache.inner.closed.store(true, Ordering::SeqCst);

        assert!(matches!(cache.admit(key(), &options()), Err(Error::Closed)));
        assert_eq!(cache.running_len(), 0);
    }

    #[tokio::test]
    async fn test_response_after_close_is_not_cached() {
        let cache = RequestCache::new();
        let (status, admission) = cache.admit(key(), &options()).unwrap();
        assert_eq!(status, CacheStatus::Miss);
        let Admission::Dispatch { id, receiver } = admission else {
            panic!("a first request must be dispatched");
        };

        // The flag flips while the request is still registered.
        cache.inner.closed.store(true, Ordering::SeqCst);
        cache.complete(&key(), id, &options(), ok());

        assert!(cache.is_empty());
        assert_eq!(cache.timers_len(), 0);
        assert_eq!(cache.running_len(), 0);
        assert!(receiver.await.is_err());
    }
}
