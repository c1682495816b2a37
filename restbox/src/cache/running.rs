//! Running-requests index used to coalesce identical in-flight requests.
//!
//! For every cache key the index keeps the requests that were issued but not
//! yet resolved, in the order they were registered. When the response of a
//! representative request arrives, [`RunningRequests::compute_slice`] walks
//! that sequence and decides which requests the response resolves:
//!
//! ```text
//!   key -> [ A   w1   w2   E!   w3 ]
//!            \_________/   \_____/
//!             slice of A   slice of E
//! ```
//!
//! The slice of a request starts at its own entry and runs until the next
//! evicting request (`E!`), which starts a slice of its own. A request whose
//! slice is not cut by a later evicting request is the *last fired* one and
//! may write its response into the cache.

use std::collections::HashMap;

use restbox_core::CacheKey;

/// Identifier of one request inside the running-requests index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RequestId(pub(crate) u64);

/// One request waiting for a response under some key.
#[derive(Debug)]
pub struct PendingRequest<W> {
    id: RequestId,
    evicting: bool,
    waiter: W,
}

impl<W> PendingRequest<W> {
    /// Returns the request id.
    pub fn id(&self) -> RequestId {
        self.id
    }

    /// Returns `true` when the request was configured to evict before running.
    pub fn is_evicting(&self) -> bool {
        self.evicting
    }

    /// Consumes the entry, returning the waiter to notify.
    pub fn into_waiter(self) -> W {
        self.waiter
    }
}

/// Result of [`RunningRequests::compute_slice`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Slice {
    /// Requests resolved by the response, in registration order.
    pub waiters: Vec<RequestId>,
    /// Whether the response may be written into the cache.
    pub is_last_fired: bool,
}

/// Multimap from cache key to the ordered requests pending under it.
#[derive(Debug)]
pub struct RunningRequests<W> {
    requests: HashMap<CacheKey, Vec<PendingRequest<W>>>,
}

impl<W> Default for RunningRequests<W> {
    fn default() -> Self {
        Self {
            requests: HashMap::new(),
        }
    }
}

impl<W> RunningRequests<W> {
    /// Creates an empty index.
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a request to the sequence for `key`.
    pub fn register(&mut self, key: CacheKey, id: RequestId, evicting: bool, waiter: W) {
        self.requests.entry(key).or_default().push(PendingRequest {
            id,
            evicting,
            waiter,
        });
    }

    /// Returns `true` when another request for `key` is still in flight.
    pub fn has_pending(&self, key: &CacheKey) -> bool {
        self.requests.get(key).is_some_and(|pending| !pending.is_empty())
    }

    /// Computes which pending requests the response of `id` resolves.
    pub fn compute_slice(&self, key: &CacheKey, id: RequestId) -> Slice {
        let mut waiters = Vec::new();
        let mut in_slice = false;

        for entry in self.requests.get(key).into_iter().flatten() {
            if entry.id == id {
                in_slice = true;
            } else if entry.evicting {
                in_slice = false;
            }

            if in_slice {
                waiters.push(entry.id);
            }
        }

        Slice {
            waiters,
            is_last_fired: in_slice,
        }
    }

    /// Removes the given requests from the sequence for `key`.
    ///
    /// The removed entries are returned in registration order and the
    /// remaining entries keep their relative order.
    pub fn remove(&mut self, key: &CacheKey, ids: &[RequestId]) -> Vec<PendingRequest<W>> {
        let Some(pending) = self.requests.get_mut(key) else {
            return Vec::new();
        };

        let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(pending)
            .into_iter()
            .partition(|entry| ids.contains(&entry.id));
        *pending = kept;

        if pending.is_empty() {
            self.requests.remove(key);
        }
        removed
    }

    /// Removes every pending request under every key.
    pub fn drain(&mut self) -> Vec<PendingRequest<W>> {
        self.requests
            .drain()
            .flat_map(|(_, pending)| pending)
            .collect()
    }

    /// Number of requests pending under `key`.
    pub fn pending(&self, key: &CacheKey) -> usize {
        self.requests.get(key).map_or(0, Vec::len)
    }

    /// Total number of pending requests.
    pub fn len(&self) -> usize {
        self.requests.values().map(Vec::len).sum()
    }

    /// Returns `true` when no request is pending.
    pub fn is_empty(&self) -> bool {
        self.requests.is_empty()
    }
}
