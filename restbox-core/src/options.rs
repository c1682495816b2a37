//! Per-request cache configuration.
//!
//! [`RequestCacheOptions`] switches a GET request into the caching and
//! coalescing path and tells the lifecycle controller how to treat it:
//!
//! - **Cacheable status codes** - only responses with these codes are stored
//! - **Evict before** - drop this request's entry before issuing it
//! - **Evict all before** - flush the whole cache before issuing it
//! - **Expires after write** - TTL armed when an entry is stored
//! - **Expires after access** - sliding TTL re-armed on every cache hit
//!
//! Options deserialize from configuration files with human readable
//! durations:
//!
//! ```
//! use std::time::Duration;
//! use restbox_core::RequestCacheOptions;
//!
//! let options: RequestCacheOptions = serde_json::from_str(r#"{
//!     "expires_after_write": "4s",
//!     "expires_after_access": "500ms",
//!     "cached_status_codes": [200, 203]
//! }"#).unwrap();
//!
//! assert_eq!(options.expires_after_write, Duration::from_secs(4));
//! assert_eq!(options.expires_after_access, Some(Duration::from_millis(500)));
//! assert!(options.is_cacheable(203));
//! assert!(!options.evict_before);
//! ```

use std::collections::BTreeSet;
use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Default time-to-live after an entry is written.
pub const DEFAULT_EXPIRES_AFTER_WRITE: Duration = Duration::from_millis(3000);

/// Status code cached when no explicit set is configured.
pub const DEFAULT_CACHED_STATUS_CODE: u16 = 200;

/// Error returned by [`RequestCacheOptions::validate`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum InvalidOptions {
    /// The write TTL must be positive.
    #[error("expires_after_write must be greater than zero")]
    ZeroWriteTtl,
    /// The access TTL, when present, must be positive.
    #[error("expires_after_access must be greater than zero when set")]
    ZeroAccessTtl,
    /// At least one status code must be cacheable.
    #[error("cached_status_codes must not be empty")]
    NoCacheableStatus,
}

/// Cache behaviour for a single request or the client-wide default.
///
/// Immutable once attached to a request; the lifecycle controller reads it
/// when the request starts and again when its response arrives.
#[derive(Debug, Clone, Serialize, Deserialize, Eq, PartialEq)]
pub struct RequestCacheOptions {
    /// Status codes whose responses are stored.
    #[serde(default = "default_cached_status_codes")]
    pub cached_status_codes: BTreeSet<u16>,
    /// Evict this request's entry before issuing it.
    #[serde(default)]
    pub evict_before: bool,
    /// Flush the entire cache before issuing the request.
    #[serde(default)]
    pub evict_all_before: bool,
    /// Time-to-live armed when an entry is written (e.g. "3s", "500ms").
    #[serde(default = "default_expires_after_write", with = "humantime_serde")]
    pub expires_after_write: Duration,
    /// Sliding time-to-live re-armed on each cache hit.
    #[serde(default, with = "humantime_serde")]
    pub expires_after_access: Option<Duration>,
}

fn default_cached_status_codes() -> BTreeSet<u16> {
    BTreeSet::from([DEFAULT_CACHED_STATUS_CODE])
}

fn default_expires_after_write() -> Duration {
    DEFAULT_EXPIRES_AFTER_WRITE
}

impl Default for RequestCacheOptions {
    fn default() -> Self {
        Self {
            cached_status_codes: default_cached_status_codes(),
            evict_before: false,
            evict_all_before: false,
            expires_after_write: DEFAULT_EXPIRES_AFTER_WRITE,
            expires_after_access: None,
        }
    }
}

impl RequestCacheOptions {
    /// Creates options with the defaults: cache `200` for three seconds.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the time-to-live after write.
    pub fn with_expires_after_write(self, ttl: Duration) -> Self {
        Self {
            expires_after_write: ttl,
            ..self
        }
    }

    /// Sets the sliding time-to-live after access.
    pub fn with_expires_after_access(self, ttl: Duration) -> Self {
        Self {
            expires_after_access: Some(ttl),
            ..self
        }
    }

    /// Evicts this request's own entry before issuing it.
    pub fn with_evict_before(self, evict_before: bool) -> Self {
        Self {
            evict_before,
            ..self
        }
    }

    /// Flushes the whole cache before issuing the request.
    pub fn with_evict_all_before(self, evict_all_before: bool) -> Self {
        Self {
            evict_all_before,
            ..self
        }
    }

    /// Replaces the set of cacheable status codes.
    pub fn with_cached_status_codes<I>(self, codes: I) -> Self
    where
        I: IntoIterator<Item = u16>,
    {
        Self {
            cached_status_codes: codes.into_iter().collect(),
            ..self
        }
    }

    /// Returns `true` when the request bypasses cache reads.
    pub fn is_evicting(&self) -> bool {
        self.evict_before || self.evict_all_before
    }

    /// Returns `true` when a response with `status` may be stored.
    pub fn is_cacheable(&self, status: u16) -> bool {
        self.cached_status_codes.contains(&status)
    }

    /// Returns the sliding TTL if one is configured and non-zero.
    pub fn access_ttl(&self) -> Option<Duration> {
        self.expires_after_access.filter(|ttl| !ttl.is_zero())
    }

    /// Checks the options for values the cache cannot honour.
    pub fn validate(&self) -> Result<(), InvalidOptions> {
        if self.expires_after_write.is_zero() {
            return Err(InvalidOptions::ZeroWriteTtl);
        }
        if self.expires_after_access.is_some_and(|ttl| ttl.is_zero()) {
            return Err(InvalidOptions::ZeroAccessTtl);
        }
        if self.cached_status_codes.is_empty() {
            return Err(InvalidOptions::NoCacheableStatus);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let options = RequestCacheOptions::default();
        assert!(options.is_cacheable(200));
        assert!(!options.is_cacheable(404));
        assert!(!options.is_evicting());
        assert_eq!(options.expires_after_write, Duration::from_secs(3));
        assert_eq!(options.access_ttl(), None);
        assert_eq!(options.validate(), Ok(()));
    }

    #[test]
    fn test_builder_methods() {
        let options = RequestCacheOptions::new()
            .with_expires_after_write(Duration::from_secs(10))
            .with_expires_after_access(Duration::from_millis(500))
            .with_evict_all_before(true)
            .with_cached_status_codes([200, 404]);

        assert!(options.is_evicting());
        assert!(options.evict_all_before);
        assert!(!options.evict_before);
        assert!(options.is_cacheable(404));
        assert_eq!(options.access_ttl(), Some(Duration::from_millis(500)));
    }

    #[test]
    fn test_validation_rejects_unusable_values() {
        let zero = RequestCacheOptions::new().with_expires_after_write(Duration::ZERO);
        assert_eq!(zero.validate(), Err(InvalidOptions::ZeroWriteTtl));

        let zero_access = RequestCacheOptions::new().with_expires_after_access(Duration::ZERO);
        assert_eq!(zero_access.validate(), Err(InvalidOptions::ZeroAccessTtl));

        let empty = RequestCacheOptions::new().with_cached_status_codes([]);
        assert_eq!(empty.validate(), Err(InvalidOptions::NoCacheableStatus));
    }

    #[test]
    fn test_deserialize_from_yaml() {
        let yaml = r#"
        evict_before: true
        expires_after_write: 10s
        "#;
        let options: RequestCacheOptions = serde_saphyr::from_str(yaml).unwrap();

        assert!(options.evict_before);
        assert_eq!(options.expires_after_write, Duration::from_secs(10));
        assert!(options.is_cacheable(200));
    }
}
