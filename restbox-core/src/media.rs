//! Media types used for content negotiation.

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

const WILDCARD: &str = "*";

/// Error returned when a media type string cannot be parsed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MediaTypeError {
    /// The input was empty.
    #[error("media type must not be empty")]
    Empty,
    /// The input had no `type/subtype` separator.
    #[error("media type '{0}' does not contain '/'")]
    MissingSubtype(String),
    /// A wildcard type was combined with a concrete subtype (`*/json`).
    #[error("wildcard type is legal only in '*/*' (all media types), got '{0}'")]
    WildcardType(String),
    /// A parameter was not of the form `name=value`.
    #[error("invalid parameter '{0}'")]
    InvalidParameter(String),
}

/// A parsed `type/subtype;name=value` media type.
///
/// Type, subtype and parameter names are stored lowercase. Parameter order is
/// preserved for display.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MediaType {
    kind: String,
    subtype: String,
    parameters: Vec<(String, String)>,
}

impl MediaType {
    /// Creates a media type without parameters.
    pub fn new(kind: impl Into<String>, subtype: impl Into<String>) -> Self {
        Self {
            kind: kind.into().to_ascii_lowercase(),
            subtype: subtype.into().to_ascii_lowercase(),
            parameters: Vec::new(),
        }
    }

    /// Parses a media type string such as `application/json;charset=UTF-8`.
    pub fn parse(input: &str) -> Result<Self, MediaTypeError> {
        let input = input.trim();
        if input.is_empty() {
            return Err(MediaTypeError::Empty);
        }

        let mut segments = input.split(';');
        let full_type = segments.next().unwrap_or_default().trim();
        // Some servers send a bare "*"
        let full_type = if full_type == WILDCARD { "*/*" } else { full_type };

        let (kind, subtype) = full_type
            .split_once('/')
            .ok_or_else(|| MediaTypeError::MissingSubtype(input.to_owned()))?;
        let (kind, subtype) = (kind.trim(), subtype.trim());
        if kind.is_empty() || subtype.is_empty() {
            return Err(MediaTypeError::MissingSubtype(input.to_owned()));
        }
        if kind == WILDCARD && subtype != WILDCARD {
            return Err(MediaTypeError::WildcardType(input.to_owned()));
        }

        let mut media_type = Self::new(kind, subtype);
        for segment in segments.map(str::trim).filter(|s| !s.is_empty()) {
            let (name, value) = segment
                .split_once('=')
                .ok_or_else(|| MediaTypeError::InvalidParameter(segment.to_owned()))?;
            let value = value.trim().trim_matches('"');
            media_type = media_type.with_parameter(name.trim(), value);
        }
        Ok(media_type)
    }

    /// `*/*`
    pub fn all() -> Self {
        Self::new(WILDCARD, WILDCARD)
    }

    /// `application/json`
    pub fn application_json() -> Self {
        Self::new("application", "json")
    }

    /// `application/x-www-form-urlencoded`
    pub fn application_form_urlencoded() -> Self {
        Self::new("application", "x-www-form-urlencoded")
    }

    /// `application/octet-stream`
    pub fn application_octet_stream() -> Self {
        Self::new("application", "octet-stream")
    }

    /// `text/plain`
    pub fn text_plain() -> Self {
        Self::new("text", "plain")
    }

    /// `multipart/form-data`
    pub fn multipart_form_data() -> Self {
        Self::new("multipart", "form-data")
    }

    /// Adds or replaces a parameter.
    pub fn with_parameter(mut self, name: &str, value: &str) -> Self {
        let name = name.to_ascii_lowercase();
        self.parameters.retain(|(existing, _)| *existing != name);
        self.parameters.push((name, value.to_owned()));
        self
    }

    /// Returns the primary type (`application` in `application/json`).
    pub fn kind(&self) -> &str {
        &self.kind
    }

    /// Returns the subtype (`json` in `application/json`).
    pub fn subtype(&self) -> &str {
        &self.subtype
    }

    /// Returns a parameter value by (case-insensitive) name.
    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters
            .iter()
            .find(|(existing, _)| existing.eq_ignore_ascii_case(name))
            .map(|(_, value)| value.as_str())
    }

    /// Returns the `charset` parameter, if any.
    pub fn charset(&self) -> Option<&str> {
        self.parameter("charset")
    }

    /// Returns a copy with the `charset` parameter removed.
    pub fn without_charset(&self) -> Self {
        Self {
            kind: self.kind.clone(),
            subtype: self.subtype.clone(),
            parameters: self
                .parameters
                .iter()
                .filter(|(name, _)| name != "charset")
                .cloned()
                .collect(),
        }
    }

    /// Returns `true` for `*` as the primary type.
    pub fn is_wildcard_type(&self) -> bool {
        self.kind == WILDCARD
    }

    /// Returns `true` for `*` or `*+suffix` as the subtype.
    pub fn is_wildcard_subtype(&self) -> bool {
        self.subtype == WILDCARD || self.subtype.starts_with("*+")
    }

    /// Returns `true` when the type and subtype contain no wildcards.
    pub fn is_concrete(&self) -> bool {
        !self.is_wildcard_type() && !self.is_wildcard_subtype()
    }

    /// Returns `true` when this media type includes `other`.
    ///
    /// `*/*` includes everything, `text/*` includes `text/plain`, and
    /// `application/*+json` includes `application/vnd.api+json`.
    pub fn includes(&self, other: &MediaType) -> bool {
        if self.is_wildcard_type() {
            return true;
        }
        if self.kind != other.kind {
            return false;
        }
        if self.subtype == other.subtype || self.subtype == WILDCARD {
            return true;
        }
        match (self.suffix(), other.suffix()) {
            (Some(suffix), Some(other_suffix)) if self.subtype.starts_with("*+") => {
                suffix == other_suffix
            }
            _ => false,
        }
    }

    /// Returns `true` when either media type includes the other.
    pub fn is_compatible_with(&self, other: &MediaType) -> bool {
        self.includes(other) || other.includes(self)
    }

    fn suffix(&self) -> Option<&str> {
        self.subtype.rsplit_once('+').map(|(_, suffix)| suffix)
    }

    fn specificity(&self) -> (u8, u8, usize) {
        (
            u8::from(!self.is_wildcard_type()),
            u8::from(!self.is_wildcard_subtype()),
            self.parameters.len(),
        )
    }

    /// Sorts media types from most to least specific.
    ///
    /// Concrete types come before `type/*`, which comes before `*/*`; among
    /// equally specific types, more parameters win. The sort is stable.
    pub fn sort_by_specificity(media_types: &mut [MediaType]) {
        media_types.sort_by(|a, b| b.specificity().cmp(&a.specificity()));
    }

    /// Formats a list of media types as an `Accept` header value.
    ///
    /// Charset parameters are stripped, duplicates removed and the result is
    /// ordered by specificity.
    pub fn to_accept_header(media_types: &[MediaType]) -> String {
        let mut stripped: Vec<MediaType> = Vec::with_capacity(media_types.len());
        for media_type in media_types.iter().map(MediaType::without_charset) {
            if !stripped.contains(&media_type) {
                stripped.push(media_type);
            }
        }
        Self::sort_by_specificity(&mut stripped);
        stripped
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(",")
    }
}

impl PartialOrd for MediaType {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for MediaType {
    fn cmp(&self, other: &Self) -> Ordering {
        (&self.kind, &self.subtype, &self.parameters).cmp(&(
            &other.kind,
            &other.subtype,
            &other.parameters,
        ))
    }
}

impl fmt::Display for MediaType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.kind, self.subtype)?;
        for (name, value) in &self.parameters {
            write!(f, ";{}={}", name, value)?;
        }
        Ok(())
    }
}

impl FromStr for MediaType {
    type Err = MediaTypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_parse_with_parameters() {
        let media_type = MediaType::parse("Application/JSON; charset=\"UTF-8\"").unwrap();
        assert_eq!(media_type.kind(), "application");
        assert_eq!(media_type.subtype(), "json");
        assert_eq!(media_type.charset(), Some("UTF-8"));
        assert_eq!(media_type.to_string(), "application/json;charset=UTF-8");
        assert_eq!(media_type.without_charset(), MediaType::application_json());
    }

    #[test]
    fn test_parse_errors() {
        assert_eq!(MediaType::parse(""), Err(MediaTypeError::Empty));
        assert!(matches!(
            MediaType::parse("json"),
            Err(MediaTypeError::MissingSubtype(_))
        ));
        assert!(matches!(
            MediaType::parse("*/json"),
            Err(MediaTypeError::WildcardType(_))
        ));
        assert!(matches!(
            MediaType::parse("text/plain;charset"),
            Err(MediaTypeError::InvalidParameter(_))
        ));
        assert_eq!(MediaType::parse("*").unwrap(), MediaType::all());
    }

    #[test]
    fn test_includes() {
        let json = MediaType::application_json();
        let vendor_json: MediaType = "application/vnd.api+json".parse().unwrap();
        let json_suffix: MediaType = "application/*+json".parse().unwrap();
        let text_any: MediaType = "text/*".parse().unwrap();

        assert!(MediaType::all().includes(&json));
        assert!(json.includes(&json));
        assert!(!json.includes(&MediaType::text_plain()));
        assert!(text_any.includes(&MediaType::text_plain()));
        assert!(json_suffix.includes(&vendor_json));
        assert!(!json_suffix.includes(&MediaType::application_octet_stream()));
        assert!(MediaType::text_plain().is_compatible_with(&text_any));
    }

    #[test]
    fn test_accept_header_ordering() {
        let types = vec![
            MediaType::all(),
            "text/plain;charset=ISO-8859-1".parse().unwrap(),
            "text/*".parse().unwrap(),
            MediaType::application_json(),
            MediaType::text_plain(),
        ];
        assert_eq!(
            MediaType::to_accept_header(&types),
            "text/plain,application/json,text/*,*/*"
        );
    }
}
