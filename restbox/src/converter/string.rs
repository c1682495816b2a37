use bytes::Bytes;
use restbox_core::MediaType;

use super::{BodyKind, ConversionError, MessageConverter, RequestBody};

/// Reads and writes UTF-8 text for any media type.
#[derive(Debug, Clone)]
pub struct StringConverter {
    media_types: Vec<MediaType>,
}

impl StringConverter {
    /// Creates the converter for `text/plain;charset=UTF-8` and `*/*`.
    pub fn new() -> Self {
        Self {
            media_types: vec![
                MediaType::text_plain().with_parameter("charset", "UTF-8"),
                MediaType::all(),
            ],
        }
    }
}

impl Default for StringConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageConverter for StringConverter {
    fn supported_media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    fn writes(&self, kind: BodyKind) -> bool {
        kind == BodyKind::Text
    }

    fn reads(&self, kind: BodyKind) -> bool {
        kind == BodyKind::Text
    }

    fn encode(&self, body: RequestBody) -> Result<Bytes, ConversionError> {
        match body {
            RequestBody::Text(text) => Ok(Bytes::from(text)),
            other => Err(ConversionError::NoWriter {
                kind: other.kind(),
                content_type: MediaType::text_plain().to_string(),
            }),
        }
    }

    fn decode(
        &self,
        _kind: BodyKind,
        body: &Bytes,
        _media_type: Option<&MediaType>,
    ) -> Result<RequestBody, ConversionError> {
        let text = std::str::from_utf8(body)?;
        Ok(RequestBody::Text(text.to_owned()))
    }
}
