//! Response handed to callers.

use std::sync::Arc;

use bytes::Bytes;
use http::{HeaderMap, StatusCode, header};
use restbox_core::{MediaType, RawResponse};
use serde::de::DeserializeOwned;

use crate::cache::CacheStatus;
use crate::converter::{BodyKind, ConversionError, Converters, RequestBody};
use crate::error::Result;

/// Response of a REST call.
///
/// The buffered response may be shared with other callers (cache hits and
/// coalesced requests). Body conversion happens lazily, per call.
#[derive(Debug, Clone)]
pub struct RestClientResponse {
    raw: Arc<RawResponse>,
    converters: Arc<Converters>,
    cache_status: CacheStatus,
}

impl RestClientResponse {
    pub(crate) fn new(
        raw: Arc<RawResponse>,
        converters: Arc<Converters>,
        cache_status: CacheStatus,
    ) -> Self {
        Self {
            raw,
            converters,
            cache_status,
        }
    }

    /// Response status.
    pub fn status(&self) -> StatusCode {
        self.raw.status
    }

    /// Reason phrase of the status, empty for unknown codes.
    pub fn status_message(&self) -> &'static str {
        self.raw.status_message()
    }

    /// Response headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.raw.headers
    }

    /// Response trailers.
    pub fn trailers(&self) -> &HeaderMap {
        &self.raw.trailers
    }

    /// Raw `Set-Cookie` values.
    pub fn cookies(&self) -> &[String] {
        &self.raw.cookies
    }

    /// How the response was obtained.
    pub fn cache_status(&self) -> CacheStatus {
        self.cache_status
    }

    /// The parsed `Content-Type`, if present.
    pub fn content_type(&self) -> Result<Option<MediaType>> {
        let Some(value) = self.raw.headers.get(header::CONTENT_TYPE) else {
            return Ok(None);
        };
        let value = String::from_utf8_lossy(value.as_bytes());
        Ok(Some(MediaType::parse(&value).map_err(ConversionError::from)?))
    }

    /// The shared buffered response.
    pub fn raw(&self) -> &Arc<RawResponse> {
        &self.raw
    }

    /// The body as raw bytes.
    pub fn bytes(&self) -> Bytes {
        self.raw.body.clone()
    }

    /// The body decoded as UTF-8 text.
    pub fn text(&self) -> Result<String> {
        match self.read(BodyKind::Text)? {
            RequestBody::Text(text) => Ok(text),
            _ => Err(no_reader(BodyKind::Text)),
        }
    }

    /// The body deserialized from JSON (or a form) into `T`.
    pub fn json<T>(&self) -> Result<T>
    where
        T: DeserializeOwned,
    {
        match self.read(BodyKind::Json)? {
            RequestBody::Json(value) => {
                Ok(serde_json::from_value(value).map_err(ConversionError::from)?)
            }
            _ => Err(no_reader(BodyKind::Json)),
        }
    }

    /// The body decoded as URL-encoded form fields.
    pub fn form(&self) -> Result<Vec<(String, String)>> {
        match self.read(BodyKind::Form)? {
            RequestBody::Form(fields) => Ok(fields),
            _ => Err(no_reader(BodyKind::Form)),
        }
    }

    fn read(&self, kind: BodyKind) -> Result<RequestBody> {
        let media_type = self.content_type()?;
        Ok(self
            .converters
            .read(kind, &self.raw.body, media_type.as_ref())?)
    }
}

fn no_reader(kind: BodyKind) -> crate::Error {
    ConversionError::NoReader {
        kind,
        content_type: "<converter returned another representation>".to_owned(),
    }
    .into()
}
