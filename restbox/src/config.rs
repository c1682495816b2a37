//! Client-wide configuration and the [`RestClient`] builder.
//!
//! [`RestClientOptions`] carries the settings shared by every request of a
//! client. It deserializes from configuration files with human readable
//! durations:
//!
//! ```yaml
//! base_url: "http://localhost:8080"
//! global_headers:
//!   x-api-key: secret
//!   x-tag: [blue, green]
//! global_request_timeout: 5s
//! global_request_cache_options:
//!   expires_after_write: 10s
//! ```

use std::sync::Arc;
use std::time::Duration;

use http::{HeaderMap, HeaderName, HeaderValue};
use restbox_core::{RequestCacheOptions, Transport};
use serde::{Deserialize, Serialize};

use crate::client::RestClient;
use crate::converter::{Converters, MessageConverter};
use crate::error::{Error, Result};

/// Settings applied to every request of a client.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct RestClientOptions {
    /// Prefix for request URIs that start with `/`.
    #[serde(default)]
    pub base_url: Option<String>,
    /// Headers added to every request that does not set them itself.
    ///
    /// A name may repeat; every value is sent. Names are matched
    /// case-insensitively.
    #[serde(default, with = "header_pairs")]
    pub global_headers: Vec<(String, String)>,
    /// Timeout for requests that do not set their own.
    #[serde(default, with = "humantime_serde")]
    pub global_request_timeout: Option<Duration>,
    /// Cache options for requests that do not set their own.
    #[serde(default)]
    pub global_request_cache_options: Option<RequestCacheOptions>,
}

impl RestClientOptions {
    /// Creates options with all defaults.
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the base URL.
    pub fn with_base_url(self, base_url: impl Into<String>) -> Self {
        Self {
            base_url: Some(base_url.into()),
            ..self
        }
    }

    /// Adds a global header value, keeping earlier values of the same name.
    pub fn with_global_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.global_headers.push((name.into(), value.into()));
        self
    }

    /// Sets the default request timeout.
    pub fn with_global_request_timeout(self, timeout: Duration) -> Self {
        Self {
            global_request_timeout: Some(timeout),
            ..self
        }
    }

    /// Sets the default cache options.
    pub fn with_global_request_cache_options(self, options: RequestCacheOptions) -> Self {
        Self {
            global_request_cache_options: Some(options),
            ..self
        }
    }

    /// Checks the options and converts the global headers.
    pub(crate) fn header_map(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::with_capacity(self.global_headers.len());
        for (name, value) in &self.global_headers {
            let name = HeaderName::from_bytes(name.as_bytes()).map_err(|error| {
                Error::InvalidConfiguration(format!("invalid global header name '{name}': {error}"))
            })?;
            let value = HeaderValue::from_str(value).map_err(|error| {
                Error::InvalidConfiguration(format!("invalid value for global header '{name}': {error}"))
            })?;
            headers.append(name, value);
        }
        Ok(headers)
    }

    pub(crate) fn validate(&self) -> Result<()> {
        if let Some(options) = &self.global_request_cache_options {
            options.validate()?;
        }
        if self.global_request_timeout == Some(Duration::ZERO) {
            return Err(Error::InvalidConfiguration(
                "global_request_timeout must be greater than zero".to_owned(),
            ));
        }
        Ok(())
    }
}

/// Serde representation of the global headers: a map from header name to
/// one value or a list of values.
mod header_pairs {
    use std::collections::BTreeMap;

    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Values {
        One(String),
        Many(Vec<String>),
    }

    pub(super) fn serialize<S>(pairs: &[(String, String)], serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut grouped: Vec<(&str, Vec<String>)> = Vec::new();
        for (name, value) in pairs {
            match grouped
                .iter_mut()
                .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            {
                Some((_, values)) => values.push(value.clone()),
                None => grouped.push((name.as_str(), vec![value.clone()])),
            }
        }
        serializer.collect_map(grouped.into_iter().map(|(name, mut values)| {
            let values = if values.len() == 1 {
                Values::One(values.remove(0))
            } else {
                Values::Many(values)
            };
            (name, values)
        }))
    }

    pub(super) fn deserialize<'de, D>(deserializer: D) -> Result<Vec<(String, String)>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let map = BTreeMap::<String, Values>::deserialize(deserializer)?;
        Ok(map
            .into_iter()
            .flat_map(|(name, values)| {
                let values = match values {
                    Values::One(value) => vec![value],
                    Values::Many(values) => values,
                };
                values.into_iter().map(move |value| (name.clone(), value))
            })
            .collect())
    }
}

/// Marker type for unset builder fields.
///
/// When you see `NotSet` in a compiler error, it means you haven't called
/// [`RestClientBuilder::transport`] yet.
#[derive(Debug)]
pub struct NotSet;

/// Builder for [`RestClient`].
///
/// Use [`RestClient::builder()`] to create a new builder.
///
/// # Example
///
/// ```
/// use std::time::Duration;
/// use restbox::{RestClient, RestClientOptions};
/// # use restbox_core::{OutgoingRequest, RawResponse, Transport, TransportError};
/// # struct Noop;
/// # #[async_trait::async_trait]
/// # impl Transport for Noop {
/// #     async fn send(&self, _: OutgoingRequest) -> Result<RawResponse, TransportError> {
/// #         Ok(RawResponse::new(http::StatusCode::NO_CONTENT))
/// #     }
/// # }
///
/// let client = RestClient::builder()
///     .transport(Noop)
///     .options(
///         RestClientOptions::new()
///             .with_base_url("http://localhost:8080")
///             .with_global_request_timeout(Duration::from_secs(5)),
///     )
///     .build()
///     .unwrap();
/// # drop(client);
/// ```
#[derive(Debug)]
pub struct RestClientBuilder<T> {
    transport: T,
    options: RestClientOptions,
    converters: Converters,
}

impl RestClientBuilder<NotSet> {
    /// Creates a builder with default options and converters.
    pub fn new() -> Self {
        Self {
            transport: NotSet,
            options: RestClientOptions::default(),
            converters: Converters::default(),
        }
    }
}

impl Default for RestClientBuilder<NotSet> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> RestClientBuilder<T> {
    /// Sets the transport used to put requests on the wire.
    pub fn transport<U>(self, transport: U) -> RestClientBuilder<U>
    where
        U: Transport + 'static,
    {
        RestClientBuilder {
            transport,
            options: self.options,
            converters: self.converters,
        }
    }

    /// Sets the client-wide options.
    pub fn options(self, options: RestClientOptions) -> Self {
        Self { options, ..self }
    }

    /// Appends a converter to the chain.
    pub fn converter<C>(mut self, converter: C) -> Self
    where
        C: MessageConverter + 'static,
    {
        self.converters.push(Arc::new(converter));
        self
    }

    /// Replaces the whole converter chain.
    pub fn converters(self, converters: Converters) -> Self {
        Self { converters, ..self }
    }
}

impl<T> RestClientBuilder<T>
where
    T: Transport + 'static,
{
    /// Builds the client.
    ///
    /// Fails with [`Error::InvalidConfiguration`] for malformed global
    /// headers, a zero timeout or invalid global cache options.
    pub fn build(self) -> Result<RestClient> {
        self.options.validate()?;
        let global_headers = self.options.header_map()?;
        Ok(RestClient::from_parts(
            Arc::new(self.transport),
            self.options,
            global_headers,
            self.converters,
        ))
    }
}
