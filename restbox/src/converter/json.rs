use bytes::Bytes;
use restbox_core::MediaType;

use super::{BodyKind, ConversionError, MessageConverter, RequestBody};

/// JSON bodies through `serde_json`.
#[derive(Debug, Clone)]
pub struct JsonConverter {
    media_types: Vec<MediaType>,
}

impl JsonConverter {
    /// Creates the converter for `application/json` and `application/*+json`.
    pub fn new() -> Self {
        Self {
            media_types: vec![
                MediaType::application_json(),
                MediaType::new("application", "*+json"),
            ],
        }
    }
}

impl Default for JsonConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageConverter for JsonConverter {
    fn supported_media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    fn writes(&self, kind: BodyKind) -> bool {
        kind == BodyKind::Json
    }

    fn reads(&self, kind: BodyKind) -> bool {
        kind == BodyKind::Json
    }

    fn encode(&self, body: RequestBody) -> Result<Bytes, ConversionError> {
        match body {
            RequestBody::Json(value) => Ok(Bytes::from(serde_json::to_vec(&value)?)),
            other => Err(ConversionError::NoWriter {
                kind: other.kind(),
                content_type: MediaType::application_json().to_string(),
            }),
        }
    }

    fn decode(
        &self,
        _kind: BodyKind,
        body: &Bytes,
        _media_type: Option<&MediaType>,
    ) -> Result<RequestBody, ConversionError> {
        Ok(RequestBody::Json(serde_json::from_slice(body)?))
    }
}
