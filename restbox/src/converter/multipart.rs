use bytes::{BufMut, Bytes, BytesMut};
use http::header::{self, HeaderMap, HeaderName, HeaderValue};
use restbox_core::MediaType;
use sha2::{Digest, Sha256};

use super::{
    BodyKind, BytesConverter, ConversionError, Converters, MessageConverter, RequestBody,
    StringConverter, describe,
};

const CRLF: &[u8] = b"\r\n";
const DASHES: &[u8] = b"--";

/// One named part of a `multipart/form-data` body.
#[derive(Debug, Clone, PartialEq)]
pub struct Part {
    name: String,
    body: RequestBody,
    file_name: Option<String>,
    content_type: Option<MediaType>,
    headers: HeaderMap,
}

impl Part {
    /// Creates a part named `name`.
    pub fn new(name: impl Into<String>, body: impl Into<RequestBody>) -> Self {
        Self {
            name: name.into(),
            body: body.into(),
            file_name: None,
            content_type: None,
            headers: HeaderMap::new(),
        }
    }

    /// Sends the part as a file upload named `file_name`.
    pub fn with_file_name(self, file_name: impl Into<String>) -> Self {
        Self {
            file_name: Some(file_name.into()),
            ..self
        }
    }

    /// Sets the content type the part body is written as.
    pub fn with_content_type(self, content_type: MediaType) -> Self {
        Self {
            content_type: Some(content_type),
            ..self
        }
    }

    /// Appends a header to the part.
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.append(name, value);
        self
    }

    /// Form field name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Part body.
    pub fn body(&self) -> &RequestBody {
        &self.body
    }

    /// File name sent in `Content-Disposition`, if any.
    pub fn file_name(&self) -> Option<&str> {
        self.file_name.as_deref()
    }

    /// Declared content type, if any.
    pub fn content_type(&self) -> Option<&MediaType> {
        self.content_type.as_ref()
    }

    /// Extra part headers.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }
}

/// Writes `multipart/form-data` bodies.
///
/// Every part body goes through its own converter chain (bytes and text by
/// default). Unless the request declares a `boundary` parameter, the boundary
/// is derived from a SHA-256 of the encoded parts, so identical bodies encode
/// to identical bytes and share a cache key. Multipart responses are not read.
#[derive(Debug, Clone)]
pub struct MultipartConverter {
    media_types: Vec<MediaType>,
    part_converters: Converters,
}

impl MultipartConverter {
    /// Creates the converter with bytes and text part converters.
    pub fn new() -> Self {
        Self {
            media_types: vec![MediaType::multipart_form_data()],
            part_converters: Converters::empty()
                .with(BytesConverter::new())
                .with(StringConverter::new()),
        }
    }

    /// Appends a converter used for part bodies.
    pub fn with_part_converter<C>(mut self, converter: C) -> Self
    where
        C: MessageConverter + 'static,
    {
        self.part_converters = self.part_converters.with(converter);
        self
    }

    fn encode_parts(&self, body: RequestBody) -> Result<Vec<Bytes>, ConversionError> {
        match body {
            RequestBody::Multipart(parts) => parts
                .into_iter()
                .map(|part| self.encode_part(part))
                .collect(),
            other => Err(ConversionError::NoWriter {
                kind: other.kind(),
                content_type: MediaType::multipart_form_data().to_string(),
            }),
        }
    }

    /// Encodes the headers, blank line and body of one part.
    fn encode_part(&self, part: Part) -> Result<Bytes, ConversionError> {
        let Part {
            name,
            body,
            file_name,
            content_type,
            headers: extra,
        } = part;
        if name.is_empty() {
            return Err(ConversionError::Multipart(
                "part name must not be empty".to_owned(),
            ));
        }

        let mut headers = HeaderMap::with_capacity(extra.len() + 2);
        if !extra.contains_key(header::CONTENT_DISPOSITION) {
            let disposition = content_disposition(&name, file_name.as_deref());
            headers.insert(
                header::CONTENT_DISPOSITION,
                HeaderValue::from_bytes(disposition.as_bytes())?,
            );
        }
        headers.extend(extra);
        let body = self
            .part_converters
            .write(body, content_type.as_ref(), &mut headers)?;

        let mut block = BytesMut::with_capacity(body.len() + 128);
        for (name, value) in &headers {
            block.put_slice(name.as_str().as_bytes());
            block.put_slice(b": ");
            block.put_slice(value.as_bytes());
            block.put_slice(CRLF);
        }
        block.put_slice(CRLF);
        block.put_slice(&body);
        Ok(block.freeze())
    }
}

impl Default for MultipartConverter {
    fn default() -> Self {
        Self::new()
    }
}

impl MessageConverter for MultipartConverter {
    fn supported_media_types(&self) -> &[MediaType] {
        &self.media_types
    }

    fn writes(&self, kind: BodyKind) -> bool {
        kind == BodyKind::Multipart
    }

    fn reads(&self, _kind: BodyKind) -> bool {
        false
    }

    fn encode(&self, body: RequestBody) -> Result<Bytes, ConversionError> {
        let parts = self.encode_parts(body)?;
        Ok(assemble(&parts, &boundary_for(&parts)))
    }

    fn decode(
        &self,
        kind: BodyKind,
        _body: &Bytes,
        media_type: Option<&MediaType>,
    ) -> Result<RequestBody, ConversionError> {
        Err(ConversionError::NoReader {
            kind,
            content_type: describe(media_type),
        })
    }

    /// Always sets `Content-Type`, since it has to carry the boundary.
    fn write(
        &self,
        body: RequestBody,
        content_type: Option<&MediaType>,
        headers: &mut HeaderMap,
    ) -> Result<Bytes, ConversionError> {
        let parts = self.encode_parts(body)?;
        let boundary = content_type
            .and_then(|content_type| content_type.parameter("boundary"))
            .filter(|boundary| !boundary.is_empty())
            .map_or_else(|| boundary_for(&parts), str::to_owned);

        let content_type = MediaType::multipart_form_data().with_parameter("boundary", &boundary);
        headers.insert(
            header::CONTENT_TYPE,
            HeaderValue::from_str(&content_type.to_string())?,
        );
        Ok(assemble(&parts, &boundary))
    }
}

fn content_disposition(name: &str, file_name: Option<&str>) -> String {
    let mut disposition = format!("form-data; name=\"{}\"", escape(name));
    if let Some(file_name) = file_name {
        disposition.push_str(&format!("; filename=\"{}\"", escape(file_name)));
    }
    disposition
}

fn escape(value: &str) -> String {
    value
        .replace('"', "%22")
        .replace('\r', "%0D")
        .replace('\n', "%0A")
}

fn boundary_for(parts: &[Bytes]) -> String {
    let mut hasher = Sha256::new();
    for part in parts {
        hasher.update(part);
    }
    let digest = hex::encode(hasher.finalize());
    format!("----restbox{}", &digest[..32])
}

fn assemble(parts: &[Bytes], boundary: &str) -> Bytes {
    let size = parts.iter().map(|part| part.len() + boundary.len() + 8).sum::<usize>();
    let mut body = BytesMut::with_capacity(size + boundary.len() + 6);
    for part in parts {
        body.put_slice(DASHES);
        body.put_slice(boundary.as_bytes());
        body.put_slice(CRLF);
        body.put_slice(part);
        body.put_slice(CRLF);
    }
    body.put_slice(DASHES);
    body.put_slice(boundary.as_bytes());
    body.put_slice(DASHES);
    body.put_slice(CRLF);
    body.freeze()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::converter::JsonConverter;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    fn upload() -> RequestBody {
        RequestBody::Multipart(vec![
            Part::new("title", "restbox"),
            Part::new("file", Bytes::from_static(b"\x00\x01"))
                .with_file_name("logo.png")
                .with_content_type(MediaType::new("image", "png")),
        ])
    }

    #[test]
    fn test_write_with_declared_boundary() {
        let converter = MultipartConverter::new();
        let mut headers = HeaderMap::new();
        let content_type = MediaType::multipart_form_data().with_parameter("boundary", "XyZ");

        let written = converter
            .write(upload(), Some(&content_type), &mut headers)
            .unwrap();

        let expected: &[u8] = b"--XyZ\r\n\
            content-disposition: form-data; name=\"title\"\r\n\
            content-type: text/plain;charset=UTF-8\r\n\
            \r\n\
            restbox\r\n\
            --XyZ\r\n\
            content-disposition: form-data; name=\"file\"; filename=\"logo.png\"\r\n\
            content-type: image/png\r\n\
            \r\n\
            \x00\x01\r\n\
            --XyZ--\r\n";
        assert_eq!(written, Bytes::from_static(expected));
        assert_eq!(
            headers[header::CONTENT_TYPE],
            "multipart/form-data;boundary=XyZ"
        );
    }

    #[test]
    fn test_generated_boundary_matches_header() {
        let converter = MultipartConverter::new();
        let mut headers = HeaderMap::new();

        let written = converter.write(upload(), None, &mut headers).unwrap();

        let content_type =
            MediaType::parse(headers[header::CONTENT_TYPE].to_str().unwrap()).unwrap();
        let boundary = content_type.parameter("boundary").unwrap().to_owned();
        assert!(boundary.starts_with("----restbox"));
        assert_eq!(boundary.len(), 43);
        let body = String::from_utf8_lossy(&written);
        assert!(body.starts_with(&format!("--{boundary}\r\n")));
        assert!(body.ends_with(&format!("--{boundary}--\r\n")));

        // Same parts, same bytes.
        assert_eq!(converter.encode(upload()).unwrap(), written);
        let other = RequestBody::Multipart(vec![Part::new("title", "other")]);
        assert!(!converter.encode(other).unwrap().starts_with(&written[..20]));
    }

    #[test]
    fn test_part_names_are_escaped_and_headers_kept() {
        let converter = MultipartConverter::new();
        let body = RequestBody::Multipart(vec![
            Part::new("say \"hi\"", "x")
                .with_header(HeaderName::from_static("x-part"), HeaderValue::from_static("1")),
        ]);

        let written = converter.encode(body).unwrap();
        let text = String::from_utf8_lossy(&written);
        assert!(text.contains("content-disposition: form-data; name=\"say %22hi%22\"\r\n"));
        assert!(text.contains("x-part: 1\r\n"));
    }

    #[test]
    fn test_json_part_needs_part_converter() {
        let parts = || RequestBody::Multipart(vec![Part::new("meta", json!({"id": 1}))]);

        let result = MultipartConverter::new().encode(parts());
        assert!(matches!(
            result,
            Err(ConversionError::NoWriter {
                kind: BodyKind::Json,
                ..
            })
        ));

        let converter = MultipartConverter::new().with_part_converter(JsonConverter::new());
        let written = converter.encode(parts()).unwrap();
        let text = String::from_utf8_lossy(&written);
        assert!(text.contains("content-type: application/json\r\n\r\n{\"id\":1}\r\n"));
    }

    #[test]
    fn test_rejects_empty_name_and_reading() {
        let converter = MultipartConverter::new();
        let result = converter.encode(RequestBody::Multipart(vec![Part::new("", "x")]));
        assert!(matches!(result, Err(ConversionError::Multipart(_))));

        let media_type = MediaType::multipart_form_data();
        assert!(!converter.can_read(BodyKind::Text, Some(&media_type)));
        assert!(!converter.can_write(&RequestBody::from("x"), Some(&media_type)));
    }
}
