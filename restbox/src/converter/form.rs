use bytes::Bytes;
use restbox_core::MediaType;
use serde_json::{Map, Value};

use super::{BodyKind, ConversionError, MessageConverter, RequestBody};

/// URL-encoded forms through `serde_urlencoded`.
///
/// Besides plain field lists, a form response can be read as a JSON object of
/// strings, so `json::<T>()` works for form-encoded responses as well.
#[derive(Debug, Clone)]
pub struct FormConverter {
    media_types: Vec<MediaType>,
}

impl FormConverter {
    /// Creates the converter for `application/x-www-form-urlencoded`.
    pub fn new() -> Self {
        Self {
            media_types: vec![MediaType::application_form_urlencoded()],
        }
    }
}

impl Default for FormConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageConverter for FormConverter {
    fn supported_media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    fn writes(&self, kind: BodyKind) -> bool {
        kind == BodyKind::Form
    }

    fn reads(&self, kind: BodyKind) -> bool {
        matches!(kind, BodyKind::Form | BodyKind::Json)
    }

    fn encode(&self, body: RequestBody) -> Result<Bytes, ConversionError> {
        match body {
            RequestBody::Form(fields) => Ok(Bytes::from(serde_urlencoded::to_string(&fields)?)),
            other => Err(ConversionError::NoWriter {
                kind: other.kind(),
                content_type: MediaType::application_form_urlencoded().to_string(),
            }),
        }
    }

    fn decode(
        &self,
        kind: BodyKind,
        body: &Bytes,
        _media_type: Option<&MediaType>,
    ) -> Result<RequestBody, ConversionError> {
        let fields: Vec<(String, String)> = serde_urlencoded::from_bytes(body)?;
        if kind == BodyKind::Json {
            let object: Map<String, Value> = fields
                .into_iter()
                .map(|(name, value)| (name, Value::String(value)))
                .collect();
            return Ok(RequestBody::Json(Value::Object(object)));
        }
        Ok(RequestBody::Form(fields))
    }
}
