//! The REST client.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use http::{HeaderMap, Method};
use restbox_core::{OutgoingRequest, RawResponse, RequestCacheOptions, Transport, TransportError};
use tracing::{Instrument, debug_span, warn};

use crate::cache::{CacheStatus, RequestCache};
use crate::config::{NotSet, RestClientBuilder, RestClientOptions};
use crate::converter::Converters;
use crate::error::{Error, Result};
use crate::request::RestClientRequest;
use crate::response::RestClientResponse;

struct ClientInner {
    transport: Arc<dyn Transport>,
    options: RestClientOptions,
    global_headers: HeaderMap,
    converters: Arc<Converters>,
    cache: RequestCache,
}

/// Asynchronous REST client with GET response caching.
///
/// Cloning is cheap: clones share the transport, the converter chain and
/// the response cache.
///
/// # Example
///
/// ```no_run
/// use std::time::Duration;
/// use restbox::{RequestCacheOptions, RestClient};
/// # async fn run(client: RestClient) -> restbox::Result<()> {
/// let user: serde_json::Value = client
///     .get("/users/42")
///     .cache(RequestCacheOptions::new().with_expires_after_write(Duration::from_secs(10)))
///     .send()
///     .await?
///     .json()?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RestClient {
    inner: Arc<ClientInner>,
}

impl fmt::Debug for RestClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClient")
            .field("transport", &"...")
            .field("options", &self.inner.options)
            .field("converters", &self.inner.converters)
            .field("cache", &self.inner.cache)
            .finish()
    }
}

impl RestClient {
    /// Creates a new [`RestClientBuilder`].
    pub fn builder() -> RestClientBuilder<NotSet> {
        RestClientBuilder::new()
    }

    pub(crate) fn from_parts(
        transport: Arc<dyn Transport>,
        options: RestClientOptions,
        global_headers: HeaderMap,
        converters: Converters,
    ) -> Self {
        Self {
            inner: Arc::new(ClientInner {
                transport,
                options,
                global_headers,
                converters: Arc::new(converters),
                cache: RequestCache::new(),
            }),
        }
    }

    /// Starts a request with an arbitrary method.
    pub fn request(&self, method: Method, uri: impl Into<String>) -> RestClientRequest {
        RestClientRequest::new(self.clone(), method, uri.into())
    }

    /// Starts a GET request.
    pub fn get(&self, uri: impl Into<String>) -> RestClientRequest {
        self.request(Method::GET, uri)
    }

    /// Starts a HEAD request.
    pub fn head(&self, uri: impl Into<String>) -> RestClientRequest {
        self.request(Method::HEAD, uri)
    }

    /// Starts a POST request.
    pub fn post(&self, uri: impl Into<String>) -> RestClientRequest {
        self.request(Method::POST, uri)
    }

    /// Starts a PUT request.
    pub fn put(&self, uri: impl Into<String>) -> RestClientRequest {
        self.request(Method::PUT, uri)
    }

    /// Starts a PATCH request.
    pub fn patch(&self, uri: impl Into<String>) -> RestClientRequest {
        self.request(Method::PATCH, uri)
    }

    /// Starts a DELETE request.
    pub fn delete(&self, uri: impl Into<String>) -> RestClientRequest {
        self.request(Method::DELETE, uri)
    }

    /// Client-wide options.
    pub fn options(&self) -> &RestClientOptions {
        &self.inner.options
    }

    /// The response cache shared by all clones of this client.
    pub fn cache(&self) -> &RequestCache {
        &self.inner.cache
    }

    /// Closes the client.
    ///
    /// Cancels every eviction timer, empties the cache and fails pending
    /// requests with [`Error::Closed`]. Later requests fail the same way.
    pub fn close(&self) {
        self.inner.cache.close();
    }

    /// Returns `true` once the client was closed.
    pub fn is_closed(&self) -> bool {
        self.inner.cache.is_closed()
    }

    pub(crate) fn converters(&self) -> &Arc<Converters> {
        &self.inner.converters
    }

    pub(crate) fn global_cache_options(&self) -> Option<&RequestCacheOptions> {
        self.inner.options.global_request_cache_options.as_ref()
    }

    pub(crate) fn global_timeout(&self) -> Option<Duration> {
        self.inner.options.global_request_timeout
    }

    /// Adds every global header the request did not set itself.
    pub(crate) fn merge_global_headers(&self, headers: &mut HeaderMap) {
        for name in self.inner.global_headers.keys() {
            if headers.contains_key(name) {
                continue;
            }
            for value in self.inner.global_headers.get_all(name) {
                headers.append(name.clone(), value.clone());
            }
        }
    }

    /// Joins client-relative URIs onto the base URL.
    pub(crate) fn resolve_uri(&self, uri: &str) -> String {
        match &self.inner.options.base_url {
            Some(base) if uri.starts_with('/') => {
                format!("{}{}", base.trim_end_matches('/'), uri)
            }
            _ => uri.to_owned(),
        }
    }

    /// Runs a prepared request, through the cache when it is a GET with
    /// cache options.
    pub(crate) async fn execute(
        &self,
        request: OutgoingRequest,
        cache_options: Option<RequestCacheOptions>,
        timeout: Option<Duration>,
    ) -> Result<RestClientResponse> {
        let span = debug_span!(
            "rest_request",
            method = %request.method,
            uri = %request.uri,
        );

        async move {
            if self.is_closed() {
                return Err(Error::Closed);
            }

            let uri = request.uri.clone();
            let cache_options = cache_options.filter(|_| request.method == Method::GET);
            let transport = Arc::clone(&self.inner.transport);

            let (response, status) = match cache_options {
                Some(options) => {
                    let key = request.cache_key();
                    let resolved = self
                        .inner
                        .cache
                        .execute(key, &options, move || dispatch(transport, request, timeout))
                        .await?;
                    (resolved.response, resolved.status)
                }
                None => {
                    let response = dispatch(transport, request, timeout).await?;
                    (Arc::new(response), CacheStatus::Bypass)
                }
            };

            self.finish_response(uri, response, status)
        }
        .instrument(span)
        .await
    }

    /// Wraps the shared response and maps error statuses for this caller.
    fn finish_response(
        &self,
        uri: String,
        raw: Arc<RawResponse>,
        cache_status: CacheStatus,
    ) -> Result<RestClientResponse> {
        let status = raw.status;
        let response = RestClientResponse::new(raw, Arc::clone(&self.inner.converters), cache_status);

        if status.is_client_error() {
            warn!(status = status.as_u16(), cache_status = cache_status.as_str(), "Client error response");
            return Err(Error::ClientStatus {
                status,
                uri,
                response: Box::new(response),
            });
        }
        if status.is_server_error() {
            warn!(status = status.as_u16(), cache_status = cache_status.as_str(), "Server error response");
            return Err(Error::ServerStatus {
                status,
                uri,
                response: Box::new(response),
            });
        }
        Ok(response)
    }
}

/// Sends one request through the transport, applying the timeout.
async fn dispatch(
    transport: Arc<dyn Transport>,
    request: OutgoingRequest,
    timeout: Option<Duration>,
) -> std::result::Result<RawResponse, TransportError> {
    let method = request.method.clone();
    let started = Instant::now();

    let result = match timeout {
        Some(limit) => tokio::time::timeout(limit, transport.send(request))
            .await
            .unwrap_or_else(|_| Err(TransportError::Timeout(Some(limit)))),
        None => transport.send(request).await,
    };

    let outcome = match &result {
        Ok(response) => response.status.as_str().to_owned(),
        Err(error) => {
            warn!(%error, "Transport failed");
            "error".to_owned()
        }
    };
    crate::metrics::record_upstream(&method, &outcome, started.elapsed());

    result
}
