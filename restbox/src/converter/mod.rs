//! Message converters for request and response bodies.
//!
//! A [`MessageConverter`] turns a typed body into bytes for a given
//! `Content-Type`, and bytes back into a typed body. The client keeps an
//! ordered [`Converters`] chain and uses the first converter that accepts a
//! body/media type pair:
//!
//! | Converter          | Body kinds      | Media types                                 |
//! |--------------------|-----------------|---------------------------------------------|
//! | [`BytesConverter`] | `Bytes`         | `application/octet-stream`, `*/*`           |
//! | [`StringConverter`]| `Text`          | `text/plain`, `*/*`                         |
//! | [`JsonConverter`]  | `Json`          | `application/json`, `application/*+json`    |
//! | [`FormConverter`]  | `Form`, `Json`  | `application/x-www-form-urlencoded`         |
//! | [`MultipartConverter`] | `Multipart` (write only) | `multipart/form-data`          |
//!
//! The union of every converter's media types also provides the default
//! `Accept` header of a request.

mod bytes;
mod form;
mod json;
mod multipart;
mod string;

use std::fmt::Debug;
use std::sync::Arc;

use ::bytes::Bytes;
use http::{HeaderMap, HeaderValue, header};
use restbox_core::{MediaType, MediaTypeError};

pub use self::bytes::BytesConverter;
pub use form::FormConverter;
pub use json::JsonConverter;
pub use multipart::{MultipartConverter, Part};
pub use string::StringConverter;

/// Representation a body is written from or read into.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BodyKind {
    /// Raw bytes.
    Bytes,
    /// UTF-8 text.
    Text,
    /// A JSON document.
    Json,
    /// URL-encoded name/value pairs.
    Form,
    /// `multipart/form-data` parts.
    Multipart,
}

/// A message body in one of the supported representations.
///
/// Used for request bodies before serialization and for response bodies after
/// conversion.
#[derive(Debug, Clone, PartialEq)]
pub enum RequestBody {
    /// Raw bytes, sent as-is.
    Bytes(Bytes),
    /// Text, sent UTF-8 encoded.
    Text(String),
    /// A JSON document.
    Json(serde_json::Value),
    /// URL-encoded form fields, in order.
    Form(Vec<(String, String)>),
    /// Named parts of a `multipart/form-data` body, in order.
    Multipart(Vec<Part>),
}

impl RequestBody {
    /// Returns the representation of this body.
    pub fn kind(&self) -> BodyKind {
        match self {
            Self::Bytes(_) => BodyKind::Bytes,
            Self::Text(_) => BodyKind::Text,
            Self::Json(_) => BodyKind::Json,
            Self::Form(_) => BodyKind::Form,
            Self::Multipart(_) => BodyKind::Multipart,
        }
    }
}

impl From<Bytes> for RequestBody {
    fn from(bytes: Bytes) -> Self {
        Self::Bytes(bytes)
    }
}

impl From<Vec<u8>> for RequestBody {
    fn from(bytes: Vec<u8>) -> Self {
        Self::Bytes(Bytes::from(bytes))
    }
}

impl From<String> for RequestBody {
    fn from(text: String) -> Self {
        Self::Text(text)
    }
}

impl From<&str> for RequestBody {
    fn from(text: &str) -> Self {
        Self::Text(text.to_owned())
    }
}

impl From<Vec<Part>> for RequestBody {
    fn from(parts: Vec<Part>) -> Self {
        Self::Multipart(parts)
    }
}

impl From<serde_json::Value> for RequestBody {
    fn from(value: serde_json::Value) -> Self {
        Self::Json(value)
    }
}

/// Errors raised while converting message bodies.
#[derive(Debug, thiserror::Error)]
pub enum ConversionError {
    /// No converter accepts the body for the requested content type.
    #[error("no converter can write a {kind:?} body as '{content_type}'")]
    NoWriter {
        /// Representation of the body.
        kind: BodyKind,
        /// Requested content type, or `<none>`.
        content_type: String,
    },
    /// No converter can produce the requested representation.
    #[error("no converter can read {kind:?} from '{content_type}'")]
    NoReader {
        /// Requested representation.
        kind: BodyKind,
        /// Content type of the response, or `<none>`.
        content_type: String,
    },
    /// The body is not valid JSON or does not match the target type.
    #[error("JSON conversion failed: {0}")]
    Json(#[from] serde_json::Error),
    /// The value cannot be URL-encoded.
    #[error("form encoding failed: {0}")]
    FormEncode(#[from] serde_urlencoded::ser::Error),
    /// The body is not a valid URL-encoded form.
    #[error("form decoding failed: {0}")]
    FormDecode(#[from] serde_urlencoded::de::Error),
    /// The body is not valid UTF-8.
    #[error("body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),
    /// The `Content-Type` header could not be parsed.
    #[error("invalid content type: {0}")]
    MediaType(#[from] MediaTypeError),
    /// A multipart body cannot be encoded.
    #[error("invalid multipart body: {0}")]
    Multipart(String),
    /// The content type cannot be used as a header value.
    #[error("invalid content type header: {0}")]
    HeaderValue(#[from] http::header::InvalidHeaderValue),
}

/// Converts bodies from and to their wire representation.
pub trait MessageConverter: Debug + Send + Sync {
    /// Media types this converter handles, in order of preference.
    fn supported_media_types(&self) -> &[MediaType];

    /// Returns `true` when the converter writes bodies of `kind`.
    fn writes(&self, kind: BodyKind) -> bool;

    /// Returns `true` when the converter reads bodies into `kind`.
    fn reads(&self, kind: BodyKind) -> bool;

    /// Serializes a body. Only called after [`can_write`](Self::can_write).
    fn encode(&self, body: RequestBody) -> Result<Bytes, ConversionError>;

    /// Deserializes a body. Only called after [`can_read`](Self::can_read).
    fn decode(
        &self,
        kind: BodyKind,
        body: &Bytes,
        media_type: Option<&MediaType>,
    ) -> Result<RequestBody, ConversionError>;

    /// Content type used when the request did not set one.
    fn default_content_type(&self) -> MediaType {
        self.supported_media_types()
            .iter()
            .find(|media_type| media_type.is_concrete())
            .cloned()
            .unwrap_or_else(MediaType::application_octet_stream)
    }

    /// Returns `true` when the converter can write `body` as `content_type`.
    fn can_write(&self, body: &RequestBody, content_type: Option<&MediaType>) -> bool {
        self.writes(body.kind()) && supports(self.supported_media_types(), content_type)
    }

    /// Returns `true` when the converter can read `kind` from `media_type`.
    ///
    /// A missing media type is only readable by converters that accept
    /// `*/*`.
    fn can_read(&self, kind: BodyKind, media_type: Option<&MediaType>) -> bool {
        if !self.reads(kind) {
            return false;
        }
        match media_type {
            Some(media_type) => supports(self.supported_media_types(), Some(media_type)),
            None => self
                .supported_media_types()
                .iter()
                .any(MediaType::is_wildcard_type),
        }
    }

    /// Serializes `body`, setting `Content-Type` when the headers have none.
    fn write(
        &self,
        body: RequestBody,
        content_type: Option<&MediaType>,
        headers: &mut HeaderMap,
    ) -> Result<Bytes, ConversionError> {
        if !headers.contains_key(header::CONTENT_TYPE) {
            let content_type = match content_type {
                Some(content_type) if content_type.is_concrete() => content_type.clone(),
                _ => self.default_content_type(),
            };
            headers.insert(
                header::CONTENT_TYPE,
                HeaderValue::from_str(&content_type.to_string())?,
            );
        }
        self.encode(body)
    }
}

fn supports(supported: &[MediaType], content_type: Option<&MediaType>) -> bool {
    match content_type {
        None => true,
        Some(content_type) => supported
            .iter()
            .any(|media_type| media_type.is_compatible_with(content_type)),
    }
}

fn describe(media_type: Option<&MediaType>) -> String {
    media_type.map_or_else(|| "<none>".to_owned(), ToString::to_string)
}

/// Ordered chain of converters owned by a client.
#[derive(Debug, Clone)]
pub struct Converters {
    converters: Vec<Arc<dyn MessageConverter>>,
}

impl Default for Converters {
    /// Bytes, String, Json, Form, Multipart.
    fn default() -> Self {
        Self::empty()
            .with(BytesConverter::new())
            .with(StringConverter::new())
            .with(JsonConverter::new())
            .with(FormConverter::new())
            .with(MultipartConverter::new())
    }
}

impl Converters {
    /// Creates a chain without converters.
    pub fn empty() -> Self {
        Self {
            converters: Vec::new(),
        }
    }

    /// Appends a converter to the end of the chain.
    pub fn with<C>(mut self, converter: C) -> Self
    where
        C: MessageConverter + 'static,
    {
        self.push(Arc::new(converter));
        self
    }

    /// Appends a shared converter to the end of the chain.
    pub fn push(&mut self, converter: Arc<dyn MessageConverter>) {
        self.converters.push(converter);
    }

    /// Number of converters in the chain.
    pub fn len(&self) -> usize {
        self.converters.len()
    }

    /// Returns `true` when the chain has no converters.
    pub fn is_empty(&self) -> bool {
        self.converters.is_empty()
    }

    /// Serializes `body` with the first converter that accepts it.
    pub fn write(
        &self,
        body: RequestBody,
        content_type: Option<&MediaType>,
        headers: &mut HeaderMap,
    ) -> Result<Bytes, ConversionError> {
        let converter = self
            .converters
            .iter()
            .find(|converter| converter.can_write(&body, content_type))
            .ok_or_else(|| ConversionError::NoWriter {
                kind: body.kind(),
                content_type: describe(content_type),
            })?;
        converter.write(body, content_type, headers)
    }

    /// Converts a response body into `kind` with the first converter that
    /// can read it.
    pub fn read(
        &self,
        kind: BodyKind,
        body: &Bytes,
        media_type: Option<&MediaType>,
    ) -> Result<RequestBody, ConversionError> {
        let converter = self
            .converters
            .iter()
            .find(|converter| converter.can_read(kind, media_type))
            .ok_or_else(|| ConversionError::NoReader {
                kind,
                content_type: describe(media_type),
            })?;
        converter.decode(kind, body, media_type)
    }

    /// Every media type supported by the chain, in chain order.
    pub fn supported_media_types(&self) -> Vec<MediaType> {
        self.converters
            .iter()
            .flat_map(|converter| converter.supported_media_types().iter().cloned())
            .collect()
    }

    /// Default `Accept` header value built from all supported media types.
    pub fn accept_header(&self) -> String {
        MediaType::to_accept_header(&self.supported_media_types())
    }
}
