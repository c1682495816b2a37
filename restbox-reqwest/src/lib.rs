#![doc = include_str!("../README.md")]
#![warn(missing_docs)]
#![cfg_attr(docsrs, feature(doc_cfg))]

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use restbox_core::{OutgoingRequest, RawResponse, Transport, TransportError};
use tracing::debug;

/// [`Transport`] that sends requests with a [`reqwest::Client`].
///
/// The response body is read completely before it is returned, so it can be
/// cached and replayed to every coalesced caller.
#[derive(Clone, Default)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    timeout: Option<Duration>,
}

impl fmt::Debug for ReqwestTransport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ReqwestTransport")
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}

impl ReqwestTransport {
    /// Creates a transport with a default [`reqwest::Client`].
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport over an already configured client.
    pub fn with_client(client: reqwest::Client) -> Self {
        Self {
            client,
            timeout: None,
        }
    }

    /// Applies `timeout` to every request sent by this transport.
    ///
    /// A request that runs out of time fails with
    /// [`TransportError::Timeout`] carrying this limit. Timeouts configured
    /// on the [`reqwest::Client`] itself are reported without a limit.
    pub fn with_timeout(self, timeout: Duration) -> Self {
        Self {
            timeout: Some(timeout),
            ..self
        }
    }

    /// The underlying client.
    pub fn client(&self) -> &reqwest::Client {
        &self.client
    }
}

impl From<reqwest::Client> for ReqwestTransport {
    fn from(client: reqwest::Client) -> Self {
        Self::with_client(client)
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, request: OutgoingRequest) -> Result<RawResponse, TransportError> {
        let OutgoingRequest {
            method,
            uri,
            headers,
            body,
        } = request;

        let url = reqwest::Url::parse(&uri).map_err(TransportError::request)?;
        let mut builder = self.client.request(method, url).headers(headers);
        if !body.is_empty() {
            builder = builder.body(body);
        }
        if let Some(timeout) = self.timeout {
            builder = builder.timeout(timeout);
        }

        let response = builder
            .send()
            .await
            .map_err(|error| self.map_send_error(error))?;
        let status = response.status();
        let headers = response.headers().clone();
        let body: Bytes = response.bytes().await.map_err(|error| {
            if error.is_timeout() {
                TransportError::Timeout(self.timeout)
            } else {
                TransportError::body(error)
            }
        })?;

        debug!(%uri, status = status.as_u16(), body_len = body.len(), "Received response");
        Ok(RawResponse::from_parts(status, headers, body))
    }
}

impl ReqwestTransport {
    fn map_send_error(&self, error: reqwest::Error) -> TransportError {
        if error.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else if error.is_connect() {
            TransportError::connect(error)
        } else if error.is_body() || error.is_decode() {
            TransportError::body(error)
        } else {
            TransportError::request(error)
        }
    }
}
