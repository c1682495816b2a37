//! Request builder.

use std::fmt;
use std::time::Duration;

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use http::header::{self, HeaderName, HeaderValue};
use http::{HeaderMap, Method};
use restbox_core::{MediaType, OutgoingRequest, RequestCacheOptions};
use serde::Serialize;

use crate::client::RestClient;
use crate::converter::{ConversionError, Part, RequestBody};
use crate::error::{Error, Result};
use crate::response::RestClientResponse;

#[derive(Debug, Clone)]
enum CacheSetting {
    /// Use the client-wide cache options, if any.
    Inherit,
    Enabled(RequestCacheOptions),
    Disabled,
}

/// A request being built.
///
/// Created by [`RestClient::get`] and friends, sent with
/// [`send`](Self::send). Builder errors (invalid header, body that cannot be
/// serialized) are reported by `send`.
pub struct RestClientRequest {
    client: RestClient,
    method: Method,
    uri: String,
    headers: HeaderMap,
    content_type: Option<MediaType>,
    timeout: Option<Duration>,
    cache: CacheSetting,
    body: Option<RequestBody>,
    error: Option<Error>,
}

impl fmt::Debug for RestClientRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RestClientRequest")
            .field("method", &self.method)
            .field("uri", &self.uri)
            .field("headers", &self.headers)
            .field("content_type", &self.content_type)
            .field("timeout", &self.timeout)
            .field("cache", &self.cache)
            .field("body", &self.body)
            .finish()
    }
}

impl RestClientRequest {
    pub(crate) fn new(client: RestClient, method: Method, uri: String) -> Self {
        Self {
            client,
            method,
            uri,
            headers: HeaderMap::new(),
            content_type: None,
            timeout: None,
            cache: CacheSetting::Inherit,
            body: None,
            error: None,
        }
    }

    /// Request method.
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Request URI as given, before the base URL is applied.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Headers set on this request so far (global headers are merged at send).
    pub fn header_map(&self) -> &HeaderMap {
        &self.headers
    }

    /// Appends a header.
    pub fn header<K, V>(mut self, name: K, value: V) -> Self
    where
        HeaderName: TryFrom<K>,
        <HeaderName as TryFrom<K>>::Error: Into<http::Error>,
        HeaderValue: TryFrom<V>,
        <HeaderValue as TryFrom<V>>::Error: Into<http::Error>,
    {
        if self.error.is_some() {
            return self;
        }
        let name: std::result::Result<HeaderName, http::Error> =
            HeaderName::try_from(name).map_err(Into::into);
        let value: std::result::Result<HeaderValue, http::Error> =
            HeaderValue::try_from(value).map_err(Into::into);
        match (name, value) {
            (Ok(name), Ok(value)) => {
                self.headers.append(name, value);
            }
            (Err(error), _) | (_, Err(error)) => {
                self.error = Some(Error::InvalidConfiguration(format!("invalid header: {error}")));
            }
        }
        self
    }

    /// Appends every header of `headers`.
    pub fn headers(mut self, headers: HeaderMap) -> Self {
        let mut last = None;
        for (name, value) in headers {
            // The iterator only yields a name for the first value of a header.
            if let Some(name) = name {
                last = Some(name);
            }
            if let Some(name) = &last {
                self.headers.append(name.clone(), value);
            }
        }
        self
    }

    /// Sets the content type the body is written as.
    pub fn content_type(mut self, content_type: MediaType) -> Self {
        self.content_type = Some(content_type);
        self
    }

    /// Sets the `Accept` header.
    pub fn accept(mut self, media_types: Vec<MediaType>) -> Self {
        let value = media_types
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",");
        match HeaderValue::from_str(&value) {
            Ok(value) => {
                self.headers.insert(header::ACCEPT, value);
            }
            Err(error) => {
                self.error = Some(Error::InvalidConfiguration(format!("invalid Accept header: {error}")));
            }
        }
        self
    }

    /// Sets `Authorization: Basic base64(user:password)`.
    pub fn basic_auth(mut self, user: &str, password: &str) -> Self {
        let encoded = STANDARD.encode(format!("{user}:{password}"));
        match HeaderValue::from_str(&format!("Basic {encoded}")) {
            Ok(mut value) => {
                value.set_sensitive(true);
                self.headers.insert(header::AUTHORIZATION, value);
            }
            Err(error) => {
                self.error = Some(Error::InvalidConfiguration(format!(
                    "invalid basic credentials: {error}"
                )));
            }
        }
        self
    }

    /// Decodes the basic credentials set on this request.
    ///
    /// Returns `None` when there is no `Authorization` header or it does not
    /// hold valid basic credentials.
    pub fn basic_auth_credentials(&self) -> Option<(String, String)> {
        let value = self.headers.get(header::AUTHORIZATION)?.to_str().ok()?;
        let encoded = value.strip_prefix("Basic ")?;
        let decoded = String::from_utf8(STANDARD.decode(encoded.trim()).ok()?).ok()?;
        let (user, password) = decoded.split_once(':')?;
        Some((user.to_owned(), password.to_owned()))
    }

    /// Sets the timeout of this request, overriding the client default.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Caches the response of this request (GET only).
    pub fn cache(mut self, options: RequestCacheOptions) -> Self {
        self.cache = CacheSetting::Enabled(options);
        self
    }

    /// Sends this request straight to the transport even when the client
    /// has global cache options.
    pub fn no_cache(mut self) -> Self {
        self.cache = CacheSetting::Disabled;
        self
    }

    /// Sets the body.
    pub fn body(mut self, body: impl Into<RequestBody>) -> Self {
        self.body = Some(body.into());
        self
    }

    /// Sets a JSON body.
    pub fn json<T>(mut self, value: &T) -> Self
    where
        T: Serialize + ?Sized,
    {
        match serde_json::to_value(value) {
            Ok(value) => self.body = Some(RequestBody::Json(value)),
            Err(error) => self.error = Some(ConversionError::from(error).into()),
        }
        self
    }

    /// Sets a URL-encoded form body.
    pub fn form<T>(mut self, value: &T) -> Self
    where
        T: Serialize + ?Sized,
    {
        let fields = serde_urlencoded::to_string(value)
            .map_err(ConversionError::from)
            .and_then(|encoded| {
                serde_urlencoded::from_str::<Vec<(String, String)>>(&encoded)
                    .map_err(ConversionError::from)
            });
        match fields {
            Ok(fields) => self.body = Some(RequestBody::Form(fields)),
            Err(error) => self.error = Some(error.into()),
        }
        self
    }

    /// Sets a `multipart/form-data` body.
    pub fn multipart(self, parts: Vec<Part>) -> Self {
        self.body(RequestBody::Multipart(parts))
    }

    /// Sends the request with `body`.
    pub async fn send_with(self, body: impl Into<RequestBody>) -> Result<RestClientResponse> {
        self.body(body).send().await
    }

    /// Sends the request.
    ///
    /// In order: validates the cache options, serializes the body through the
    /// converter chain, merges the global headers, fills in `Accept`, then
    /// hands the request to the cache (GET with cache options) or straight to
    /// the transport.
    pub async fn send(self) -> Result<RestClientResponse> {
        let Self {
            client,
            method,
            uri,
            mut headers,
            content_type,
            timeout,
            cache,
            body,
            error,
        } = self;

        if let Some(error) = error {
            return Err(error);
        }

        let cache_options = match cache {
            CacheSetting::Inherit => client.global_cache_options().cloned(),
            CacheSetting::Enabled(options) => Some(options),
            CacheSetting::Disabled => None,
        };
        if let Some(options) = &cache_options {
            options.validate()?;
        }
        if timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidConfiguration(
                "request timeout must be greater than zero".to_owned(),
            ));
        }

        let body = match body {
            Some(body) => client
                .converters()
                .write(body, content_type.as_ref(), &mut headers)?,
            None => {
                if let Some(content_type) = &content_type {
                    if !headers.contains_key(header::CONTENT_TYPE) {
                        let value = HeaderValue::from_str(&content_type.to_string())
                            .map_err(ConversionError::from)?;
                        headers.insert(header::CONTENT_TYPE, value);
                    }
                }
                Bytes::new()
            }
        };

        client.merge_global_headers(&mut headers);

        if !headers.contains_key(header::ACCEPT) {
            let accept = client.converters().accept_header();
            if !accept.is_empty() {
                let value = HeaderValue::from_str(&accept).map_err(ConversionError::from)?;
                headers.insert(header::ACCEPT, value);
            }
        }

        let request = OutgoingRequest {
            method,
            uri: client.resolve_uri(&uri),
            headers,
            body,
        };
        let timeout = timeout.or_else(|| client.global_timeout());

        client.execute(request, cache_options, timeout).await
    }
}
