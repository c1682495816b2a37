//! Eviction timer registry.
//!
//! Every cached entry has at most one armed timer. Scheduling a timer for a
//! key that already has one cancels the old timer first. When a timer fires
//! it hands its [`TimerId`] to the callback, and the callback asks the
//! registry (via [`EvictionTimers::expire`]) whether that id is still the
//! current one before evicting anything. A timer that already woke up but
//! lost the race against a cancel/reschedule therefore does nothing.

use std::collections::HashMap;
use std::time::Duration;

use restbox_core::CacheKey;
use tokio::task::JoinHandle;
use tracing::{Instrument, debug_span};

/// Identifier of one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerId(u64);

#[derive(Debug)]
struct TimerHandle {
    id: TimerId,
    handle: JoinHandle<()>,
}

/// Map from cache key to its single outstanding eviction timer.
#[derive(Debug, Default)]
pub struct EvictionTimers {
    timers: HashMap<CacheKey, TimerHandle>,
    next_id: u64,
}

impl EvictionTimers {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Arms a one-shot timer for `key`, replacing any existing one.
    ///
    /// `on_fire` runs on a Tokio task after `delay` unless the timer is
    /// cancelled first.
    ///
    /// # Panics
    ///
    /// Panics when called outside of a Tokio runtime.
    pub fn schedule<F>(&mut self, key: CacheKey, delay: Duration, on_fire: F) -> TimerId
    where
        F: FnOnce(TimerId) + Send + 'static,
    {
        self.cancel(&key);

        let id = TimerId(self.next_id);
        self.next_id = self.next_id.wrapping_add(1);

        let span = debug_span!(
            "eviction_timer",
            key = %key,
            ttl_ms = delay.as_millis() as u64,
        );
        let handle = tokio::spawn(
            async move {
                tokio::time::sleep(delay).await;
                on_fire(id);
            }
            .instrument(span),
        );

        self.timers.insert(key, TimerHandle { id, handle });
        id
    }

    /// Cancels and forgets the timer for `key`. No-op when none is armed.
    pub fn cancel(&mut self, key: &CacheKey) -> bool {
        match self.timers.remove(key) {
            Some(timer) => {
                timer.handle.abort();
                true
            }
            None => false,
        }
    }

    /// Forgets the timer for `key` if `id` is still the armed one.
    ///
    /// Returns `false` for a stale fire, in which case the caller must not
    /// evict.
    pub fn expire(&mut self, key: &CacheKey, id: TimerId) -> bool {
        match self.timers.get(key) {
            Some(timer) if timer.id == id => {
                self.timers.remove(key);
                true
            }
            _ => false,
        }
    }

    /// Cancels every timer, returning how many were armed.
    pub fn cancel_all(&mut self) -> usize {
        let count = self.timers.len();
        for (_, timer) in self.timers.drain() {
            timer.handle.abort();
        }
        count
    }

    /// Returns `true` when a timer is armed for `key`.
    pub fn contains(&self, key: &CacheKey) -> bool {
        self.timers.contains_key(key)
    }

    /// Number of armed timers.
    pub fn len(&self) -> usize {
        self.timers.len()
    }

    /// Returns `true` when no timer is armed.
    pub fn is_empty(&self) -> bool {
        self.timers.is_empty()
    }
}

impl Drop for EvictionTimers {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::sync::mpsc;

    fn key(uri: &str) -> CacheKey {
        CacheKey::from_parts(uri, Vec::<(&str, &str)>::new(), b"")
    }

    #[tokio::test(start_paused = true)]
    async fn test_timer_fires_after_delay() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = EvictionTimers::new();

        let id = timers.schedule(key("/a"), Duration::from_secs(5), move |fired| {
            let _ = tx.send(fired);
        });

        tokio::time::sleep(Duration::from_millis(4900)).await;
        assert!(rx.try_recv().is_err());

        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(rx.recv().await, Some(id));
        assert!(timers.expire(&key("/a"), id));
        assert!(timers.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_reschedule_cancels_previous_timer() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let mut timers = EvictionTimers::new();

        let first_tx = tx.clone();
        let first = timers.schedule(key("/a"), Duration::from_secs(1), move |fired| {
            let _ = first_tx.send(fired);
        });
        let second = timers.schedule(key("/a"), Duration::from_secs(3), move |fired| {
            let _ = tx.send(fired);
        });
        assert_eq!(timers.len(), 1);

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(rx.recv().await, Some(second));
        assert!(rx.try_recv().is_err());

        // A late fire of the first timer is ignored.
        assert!(!timers.expire(&key("/a"), first));
        assert!(timers.expire(&key("/a"), second));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_and_cancel_all() {
        let (tx, mut rx) = mpsc::unbounded_channel::<TimerId>();
        let mut timers = EvictionTimers::new();

        for uri in ["/a", "/b", "/c"] {
            let tx = tx.clone();
            timers.schedule(key(uri), Duration::from_secs(1), move |fired| {
                let _ = tx.send(fired);
            });
        }
        drop(tx);

        assert!(timers.cancel(&key("/a")));
        assert!(!timers.cancel(&key("/a")));
        assert_eq!(timers.cancel_all(), 2);

        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(rx.recv().await, None);
    }
}
