#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

/// Response cache and in-flight request coalescing.
///
/// The [`RequestCache`](cache::RequestCache) controller decides for every
/// cacheable GET whether it is a cache hit, joins an identical in-flight
/// request (future hit), or goes to the network (miss), and arms the
/// eviction timers of stored entries.
pub mod cache;

/// The [`RestClient`] and its request pipeline.
pub mod client;

/// Client-wide options and the typestate [`RestClientBuilder`].
pub mod config;

/// Message converters used for content negotiation.
///
/// Bodies are written and read through an ordered chain of
/// [`MessageConverter`](converter::MessageConverter)s selected by body kind
/// and media type.
pub mod converter;

/// Error types for REST client operations.
///
/// Defines [`Error`] which covers:
/// - Transport failures (timeouts, connection errors)
/// - `4xx` and `5xx` responses
/// - Body conversion failures
/// - Invalid configuration
pub mod error;

/// Metrics collection for cache observability.
///
/// When the `metrics` feature is enabled, this module provides counters
/// and histograms for:
/// - Cache hits, future hits, misses and evictions
/// - Upstream request counts and timings
pub mod metrics;

/// The request builder.
pub mod request;

/// The response wrapper.
pub mod response;

pub use cache::{CacheStatus, RequestCache};
pub use client::RestClient;
pub use config::{NotSet, RestClientBuilder, RestClientOptions};
pub use converter::{
    BodyKind, BytesConverter, ConversionError, Converters, FormConverter, JsonConverter,
    MessageConverter, MultipartConverter, Part, RequestBody, StringConverter,
};
pub use error::{Error, Result};
pub use request::RestClientRequest;
pub use response::RestClientResponse;

pub use restbox_core::{
    CacheKey, MediaType, OutgoingRequest, RawResponse, RequestCacheOptions, Transport,
    TransportError,
};
