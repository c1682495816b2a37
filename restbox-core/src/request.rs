//! Outgoing request as handed to a [`Transport`](crate::Transport).

use bytes::Bytes;
use http::{HeaderMap, Method};

use crate::CacheKey;

/// A fully populated request: global headers merged, body serialized.
///
/// This is the exact request the transport puts on the wire and the input
/// the cache key is derived from.
#[derive(Debug, Clone)]
pub struct OutgoingRequest {
    /// HTTP method.
    pub method: Method,
    /// Absolute or client-relative URI.
    pub uri: String,
    /// Final header set.
    pub headers: HeaderMap,
    /// Serialized body (empty when the request has none).
    pub body: Bytes,
}

impl OutgoingRequest {
    /// Creates a request without headers or body.
    pub fn new(method: Method, uri: impl Into<String>) -> Self {
        Self {
            method,
            uri: uri.into(),
            headers: HeaderMap::new(),
            body: Bytes::new(),
        }
    }

    /// Derives the cache key of this request.
    pub fn cache_key(&self) -> CacheKey {
        CacheKey::derive(&self.uri, &self.headers, &self.body)
    }
}
