#![warn(missing_docs)]
//! # restbox-core
//!
//! Core types and traits for the restbox REST client.
//!
//! This crate holds the pieces that are shared between the client/cache
//! engine (`restbox`) and the transport adapters (`restbox-reqwest`):
//!
//! - **Identify** requests for caching ([`CacheKey`])
//! - **Configure** per-request caching ([`RequestCacheOptions`])
//! - **Describe** what goes on the wire and what comes back
//!   ([`OutgoingRequest`], [`RawResponse`])
//! - **Send** requests through a host HTTP client ([`Transport`])
//! - **Negotiate** content types ([`MediaType`])

pub mod key;
pub mod media;
pub mod options;
pub mod request;
pub mod response;
/// Transport seam to the host HTTP client.
pub mod transport;

pub use key::CacheKey;
pub use media::{MediaType, MediaTypeError};
pub use options::{InvalidOptions, RequestCacheOptions};
pub use request::OutgoingRequest;
pub use response::RawResponse;
pub use transport::{BoxError, Transport, TransportError};
