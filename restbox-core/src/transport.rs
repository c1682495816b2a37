use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::{OutgoingRequest, RawResponse};

/// Shared, cloneable error source.
pub type BoxError = Arc<dyn std::error::Error + Send + Sync>;

/// Errors raised by a [`Transport`] while sending a request.
///
/// The type is `Clone` because one failure of an in-flight request is
/// delivered to every request coalesced onto it.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    /// The request did not complete within its timeout.
    ///
    /// Carries the limit when the transport knows it.
    #[error("request timed out{}", describe_limit(.0))]
    Timeout(Option<Duration>),
    /// Connecting to the remote host failed (DNS, refused, TLS).
    #[error("connection failed: {0}")]
    Connect(BoxError),
    /// The request could not be built or sent.
    #[error("request failed: {0}")]
    Request(BoxError),
    /// The response body could not be read.
    #[error("failed to read response body: {0}")]
    Body(BoxError),
    /// The in-flight request was abandoned before a response arrived.
    #[error("request was cancelled before a response arrived")]
    Cancelled,
}

impl TransportError {
    /// Wraps a connection error.
    pub fn connect<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Connect(Arc::new(error))
    }

    /// Wraps a request error.
    pub fn request<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Request(Arc::new(error))
    }

    /// Wraps a body read error.
    pub fn body<E>(error: E) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        Self::Body(Arc::new(error))
    }

    /// Returns `true` for [`TransportError::Timeout`].
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }
}

fn describe_limit(limit: &Option<Duration>) -> String {
    limit.map_or_else(String::new, |limit| format!(" after {limit:?}"))
}

/// Host HTTP client used to put requests on the wire.
///
/// This trait is transport-agnostic: it can be implemented over `reqwest`,
/// `hyper` or an in-memory mock. Implementations must buffer the whole
/// response body, since cached responses are replayed to many callers.
///
/// # Examples
///
/// ```rust
/// use async_trait::async_trait;
/// use http::StatusCode;
/// use restbox_core::{OutgoingRequest, RawResponse, Transport, TransportError};
///
/// struct Static;
///
/// #[async_trait]
/// impl Transport for Static {
///     async fn send(&self, _req: OutgoingRequest) -> Result<RawResponse, TransportError> {
///         Ok(RawResponse::new(StatusCode::OK).with_body("hello"))
///     }
/// }
/// ```
#[async_trait]
pub trait Transport: Send + Sync {
    /// Sends the request and returns the buffered response.
    async fn send(&self, request: OutgoingRequest) -> Result<RawResponse, TransportError>;
}

#[async_trait]
impl<T> Transport for Arc<T>
where
    T: Transport + ?Sized,
{
    async fn send(&self, request: OutgoingRequest) -> Result<RawResponse, TransportError> {
        self.as_ref().send(request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_timeout_display() {
        let known = TransportError::Timeout(Some(Duration::from_millis(250)));
        assert_eq!(known.to_string(), "request timed out after 250ms");
        assert!(known.is_timeout());

        let unknown = TransportError::Timeout(None);
        assert_eq!(unknown.to_string(), "request timed out");
        assert!(!TransportError::Cancelled.is_timeout());
    }
}
