use bytes::Bytes;
use restbox_core::MediaType;

use super::{BodyKind, ConversionError, MessageConverter, RequestBody};

/// Passes raw bytes through untouched, for any media type.
#[derive(Debug, Clone)]
pub struct BytesConverter {
    media_types: Vec<MediaType>,
}

impl BytesConverter {
    /// Creates the converter for `application/octet-stream` and `*/*`.
    pub fn new() -> Self {
        Self {
            media_types: vec![MediaType::application_octet_stream(), MediaType::all()],
        }
    }
}

impl Default for BytesConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageConverter for BytesConverter {
    fn supported_media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    fn writes(&self, kind: BodyKind) -> bool {
        kind == BodyKind::Bytes
    }

    fn reads(&self, kind: BodyKind) -> bool {
        kind == BodyKind::Bytes
    }

    fn encode(&self, body: RequestBody) -> Result<Bytes, ConversionError> {
        match body {
            RequestBody::Bytes(bytes) => Ok(bytes),
            other => Err(ConversionError::NoWriter {
                kind: other.kind(),
                content_type: MediaType::application_octet_stream().to_string(),
            }),
        }
    }

    fn decode(
        &self,
        _kind: BodyKind,
        body: &Bytes,
        _media_type: Option<&MediaType>,
    ) -> Result<RequestBody, ConversionError> {
        Ok(RequestBody::Bytes(body.clone()))
    }
}
