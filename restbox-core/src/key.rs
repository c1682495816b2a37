//! Cache key types and derivation.
//!
//! A [`CacheKey`] identifies a GET request for caching and in-flight
//! coalescing. It is derived from three parts of the request exactly as it
//! goes on the wire:
//!
//! 1. **URI** - compared as the exact string
//! 2. **Headers** - every `name: value` entry, sorted, so insertion order
//!    does not matter
//! 3. **Body digest** - SHA256 of the serialized body bytes
//!
//! ```
//! use http::{HeaderMap, HeaderValue, header};
//! use restbox_core::CacheKey;
//!
//! let mut first = HeaderMap::new();
//! first.append(header::ACCEPT, HeaderValue::from_static("application/json"));
//! first.append("x-tenant", HeaderValue::from_static("acme"));
//!
//! let mut second = HeaderMap::new();
//! second.append("x-tenant", HeaderValue::from_static("acme"));
//! second.append(header::ACCEPT, HeaderValue::from_static("application/json"));
//!
//! assert_eq!(
//!     CacheKey::derive("/users/42", &first, b""),
//!     CacheKey::derive("/users/42", &second, b""),
//! );
//! ```
//!
//! ## Performance
//!
//! [`CacheKey`] uses `Arc` internally, so cloning a key only bumps a
//! reference count. Keys are cloned into the store, the eviction timer
//! registry and the running-requests index.

use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use http::HeaderMap;
use sha2::{Digest, Sha256};

#[derive(Debug, Eq, PartialEq, Hash)]
struct CacheKeyInner {
    uri: String,
    headers: Vec<String>,
    body_digest: String,
}

/// Identity of a request used to index cached responses and in-flight requests.
///
/// Two keys are equal when the URI, the header multiset and the body digest
/// are equal. Keys are immutable once constructed.
#[derive(Clone, Debug)]
pub struct CacheKey {
    inner: Arc<CacheKeyInner>,
}

impl PartialEq for CacheKey {
    fn eq(&self, other: &Self) -> bool {
        // Fast path: same Arc pointer
        Arc::ptr_eq(&self.inner, &other.inner) || self.inner == other.inner
    }
}

impl Eq for CacheKey {}

impl Hash for CacheKey {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.inner.hash(state);
    }
}

impl CacheKey {
    /// Derives a key from the final URI, header set and serialized body.
    ///
    /// Header names are taken in their canonical lowercase form. Values that
    /// are not valid UTF-8 are included lossily.
    pub fn derive(uri: &str, headers: &HeaderMap, body: &[u8]) -> Self {
        Self::from_parts(
            uri,
            headers
                .iter()
                .map(|(name, value)| (name.as_str(), String::from_utf8_lossy(value.as_bytes()))),
            body,
        )
    }

    /// Derives a key from raw `(name, value)` header pairs.
    pub fn from_parts<I, N, V>(uri: &str, headers: I, body: &[u8]) -> Self
    where
        I: IntoIterator<Item = (N, V)>,
        N: AsRef<str>,
        V: AsRef<str>,
    {
        let mut headers: Vec<String> = headers
            .into_iter()
            .map(|(name, value)| format!("{}: {}", name.as_ref(), value.as_ref()))
            .collect();
        headers.sort();

        CacheKey {
            inner: Arc::new(CacheKeyInner {
                uri: uri.to_owned(),
                headers,
                body_digest: body_digest(body),
            }),
        }
    }

    /// Returns the request URI this key was derived from.
    pub fn uri(&self) -> &str {
        &self.inner.uri
    }

    /// Returns the sorted `name: value` header entries.
    pub fn headers(&self) -> &[String] {
        &self.inner.headers
    }

    /// Returns the hex encoded SHA256 digest of the request body.
    pub fn body_digest(&self) -> &str {
        &self.inner.body_digest
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Compact format: uri|header1|header2#digest-prefix
        write!(f, "{}", self.inner.uri)?;
        for header in &self.inner.headers {
            write!(f, "|{}", header)?;
        }
        write!(f, "#{}", &self.inner.body_digest[..16])
    }
}

fn body_digest(body: &[u8]) -> String {
    hex::encode(Sha256::digest(body))
}
