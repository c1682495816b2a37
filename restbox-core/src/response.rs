//! Buffered HTTP response shared between coalesced requests.

use bytes::Bytes;
use http::{HeaderMap, HeaderValue, StatusCode, header};

/// A fully buffered response as captured from the transport.
///
/// This is what the cache stores and what every waiter of a coalesced slice
/// receives. Body conversion happens later, per waiter.
#[derive(Debug, Clone)]
pub struct RawResponse {
    /// Response status.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Trailers, empty for most HTTP/1.1 responses.
    pub trailers: HeaderMap,
    /// Raw `Set-Cookie` values in arrival order.
    pub cookies: Vec<String>,
    /// Response body.
    pub body: Bytes,
}

impl RawResponse {
    /// Creates an empty response with the given status.
    pub fn new(status: StatusCode) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            trailers: HeaderMap::new(),
            cookies: Vec::new(),
            body: Bytes::new(),
        }
    }

    /// Builds a response from its parts, collecting cookies from `Set-Cookie`.
    pub fn from_parts(status: StatusCode, headers: HeaderMap, body: Bytes) -> Self {
        let cookies = collect_cookies(&headers);
        Self {
            status,
            headers,
            trailers: HeaderMap::new(),
            cookies,
            body,
        }
    }

    /// Sets the body.
    pub fn with_body(self, body: impl Into<Bytes>) -> Self {
        Self {
            body: body.into(),
            ..self
        }
    }

    /// Appends a header, tracking cookies.
    pub fn with_header(mut self, name: header::HeaderName, value: HeaderValue) -> Self {
        if name == header::SET_COOKIE {
            self.cookies
                .push(String::from_utf8_lossy(value.as_bytes()).into_owned());
        }
        self.headers.append(name, value);
        self
    }

    /// Returns the reason phrase of the status, if it has one.
    pub fn status_message(&self) -> &'static str {
        self.status.canonical_reason().unwrap_or_default()
    }

    /// Returns the `Content-Type` header as a string.
    pub fn content_type(&self) -> Option<&str> {
        self.headers
            .get(header::CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
    }
}

/// Collects every `Set-Cookie` header value.
pub fn collect_cookies(headers: &HeaderMap) -> Vec<String> {
    headers
        .get_all(header::SET_COOKIE)
        .iter()
        .map(|value| String::from_utf8_lossy(value.as_bytes()).into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_parts_collects_cookies() {
        let mut headers = HeaderMap::new();
        headers.append(header::SET_COOKIE, HeaderValue::from_static("a=1"));
        headers.append(header::SET_COOKIE, HeaderValue::from_static("b=2; Path=/"));
        headers.append(header::CONTENT_TYPE, HeaderValue::from_static("text/plain"));

        let response = RawResponse::from_parts(StatusCode::OK, headers, Bytes::from("hi"));

        assert_eq!(response.cookies, vec!["a=1", "b=2; Path=/"]);
        assert_eq!(response.content_type(), Some("text/plain"));
        assert_eq!(response.status_message(), "OK");
    }
}
