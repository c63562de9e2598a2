//! Path and query parameter parsing, the generic parameter map, and percent-encoding policies.
//!
//! `Params` is the user-visible merged parameter map carried on [`State`](crate::state::State);
//! it stores `serde_json::Value` rather than a flat string so that `defaultParams` entries (which
//! may be numbers, booleans, or nested objects per the wire format) round-trip without lossy
//! stringification until build time.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use thiserror::Error;

use crate::error::BuildError;

/// The user-visible parameter map: URL params merged with query params, default-merged, as
/// carried on a [`State`](crate::state::State).
pub type Params = HashMap<String, Value>;

/// Errors raised while parsing path or query parameters.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ParamsError {
    #[error("parameter '{0}' not found")]
    NotFound(String),

    #[error("malformed query string: {0}")]
    MalformedQuery(String),

    #[error("malformed percent-encoding in '{0}'")]
    MalformedEncoding(String),
}

pub type ParamsResult<T> = Result<T, ParamsError>;

/// A parsed URL path, split into segments, independent of any route pattern.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPath {
    /// The path as given to `match`, with its trailing slash (if any) intact.
    pub clean_path: String,
    /// The path with any trailing slash removed (unless the path is exactly `"/"`).
    pub normalized: String,
    /// The individual non-empty segments.
    pub segments: Vec<String>,
    /// Whether `clean_path` ends in `/` (and is not just `"/"`).
    pub trailing_slash: bool,
}

impl ParsedPath {
    pub fn parse(path: &str) -> Self {
        let path = if path.is_empty() { "/" } else { path };
        let trailing_slash = path.len() > 1 && path.ends_with('/');
        let normalized = if trailing_slash {
            path.trim_end_matches('/').to_string()
        } else {
            path.to_string()
        };
        let segments = normalized
            .split('/')
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
            .collect();

        Self {
            clean_path: path.to_string(),
            normalized,
            segments,
            trailing_slash,
        }
    }
}

/// A collection of query parameters parsed from a `?`-delimited query string.
///
/// Preserves multiple values per key (`?tags=a&tags=b`); most routing code only cares about the
/// first value, exposed through [`QueryParams::get`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryParams {
    values: HashMap<String, Vec<String>>,
}

impl QueryParams {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a query string (without the leading `?`).
    pub fn parse(query: &str) -> ParamsResult<Self> {
        let mut values: HashMap<String, Vec<String>> = HashMap::new();

        if query.is_empty() {
            return Ok(Self { values });
        }

        for pair in query.split('&') {
            if pair.is_empty() {
                continue;
            }

            let (key, value) = match pair.split_once('=') {
                Some((k, v)) => (k, v),
                None => (pair, ""),
            };

            let key = percent_decode(key)
                .map_err(|e| ParamsError::MalformedQuery(format!("key '{key}': {e}")))?;
            let value = percent_decode(&value.replace('+', " "))
                .map_err(|e| ParamsError::MalformedQuery(format!("value for '{key}': {e}")))?;

            values.entry(key).or_default().push(value);
        }

        Ok(Self { values })
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).and_then(|v| v.first()).map(String::as_str)
    }

    pub fn get_all(&self, name: &str) -> &[String] {
        self.values.get(name).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.values.keys().map(String::as_str)
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Merges these query params into a `Params` map, later (query) values winning over
    /// existing (URL-param) entries of the same name.
    pub fn merge_into(&self, params: &mut Params) {
        for (key, values) in &self.values {
            let value = if values.len() > 1 {
                Value::Array(values.iter().cloned().map(Value::String).collect())
            } else {
                Value::String(values[0].clone())
            };
            params.insert(key.clone(), value);
        }
    }

    pub fn to_query_string(&self) -> String {
        let mut keys: Vec<&String> = self.values.keys().collect();
        keys.sort();
        let mut parts = Vec::new();
        for key in keys {
            for value in &self.values[key] {
                parts.push(format!(
                    "{}={}",
                    percent_encode(key, EncodingStrategy::UriComponent),
                    percent_encode(value, EncodingStrategy::UriComponent)
                ));
            }
        }
        parts.join("&")
    }
}

/// The query-string parser collaborator (§1: "user-provided callables ... query parsers"). The
/// matcher never parses a query string itself; it calls out to whichever [`QueryParser`] the
/// router was constructed with, defaulting to [`DefaultQueryParser`].
pub trait QueryParser: Send + Sync {
    fn parse(&self, query: &str) -> ParamsResult<QueryParams>;
}

/// A shared handle to an injected [`QueryParser`].
pub type SharedQueryParser = Arc<dyn QueryParser>;

/// The built-in query parser: `&`-delimited `key=value` pairs, percent-decoded, `+` treated as a
/// space in values, repeated keys collected into [`QueryParams::get_all`].
#[derive(Debug, Default)]
pub struct DefaultQueryParser;

impl QueryParser for DefaultQueryParser {
    fn parse(&self, query: &str) -> ParamsResult<QueryParams> {
        QueryParams::parse(query)
    }
}

/// Constructs the default shared query parser.
pub fn default_query_parser() -> SharedQueryParser {
    Arc::new(DefaultQueryParser)
}

/// The percent-encoding policy applied to captured/emitted URL parameter values.
///
/// Mirrors `urlParamsEncoding` in the router options (§6.2).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EncodingStrategy {
    /// Component-style encoding that additionally preserves the sub-delimiter set
    /// `! $ ' ( ) * + , : ; | ~`, matching the wire format's default encoder (§4.1/§6.5).
    #[default]
    Default,
    /// Encodes as a full URI component would be, preserving `uri`-reserved marks.
    Uri,
    /// Strict `encodeURIComponent`-equivalent: only unreserved characters pass through.
    UriComponent,
    /// No encoding at all; the caller is responsible for producing a valid path segment.
    None,
}

const DEFAULT_PRESERVED: &[u8] = b"!$'()*+,:;|~";
const URI_PRESERVED: &[u8] = b";,/?:@&=+$!*'()#";

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'_' | b'.' | b'~')
}

/// Percent-encodes `value` under the given strategy. Splat params should call this once per
/// segment and rejoin with `/` (the `/` in a splat value is never itself encoded).
pub fn percent_encode(value: &str, strategy: EncodingStrategy) -> String {
    if strategy == EncodingStrategy::None {
        return value.to_string();
    }

    // Fast path: nothing needs encoding.
    let needs_encoding = value.bytes().any(|b| {
        if is_unreserved(b) {
            return false;
        }
        match strategy {
            EncodingStrategy::Default => !DEFAULT_PRESERVED.contains(&b),
            EncodingStrategy::Uri => !URI_PRESERVED.contains(&b),
            EncodingStrategy::UriComponent => true,
            EncodingStrategy::None => false,
        }
    });
    if !needs_encoding {
        return value.to_string();
    }

    let mut out = String::with_capacity(value.len() * 3);
    for byte in value.bytes() {
        let preserved = is_unreserved(byte)
            || match strategy {
                EncodingStrategy::Default => DEFAULT_PRESERVED.contains(&byte),
                EncodingStrategy::Uri => URI_PRESERVED.contains(&byte),
                EncodingStrategy::UriComponent => false,
                EncodingStrategy::None => true,
            };
        if preserved {
            out.push(byte as char);
        } else {
            out.push('%');
            out.push_str(&format!("{byte:02X}"));
        }
    }
    out
}

/// Percent-encodes a splat value segment-by-segment, preserving its internal `/`.
pub fn percent_encode_splat(value: &str, strategy: EncodingStrategy) -> String {
    value
        .split('/')
        .map(|segment| percent_encode(segment, strategy))
        .collect::<Vec<_>>()
        .join("/")
}

/// Percent-decodes `value`, rejecting any `%` not followed by two hex digits.
pub fn percent_decode(value: &str) -> Result<String, String> {
    let bytes = value.as_bytes();
    let mut i = 0;
    let mut raw = Vec::with_capacity(value.len());

    while i < bytes.len() {
        if bytes[i] == b'%' {
            if i + 2 >= bytes.len() {
                return Err(format!("incomplete percent-encoding in '{value}'"));
            }
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3])
                .map_err(|_| format!("invalid percent-encoding in '{value}'"))?;
            let byte = u8::from_str_radix(hex, 16)
                .map_err(|_| format!("invalid percent-encoding '%{hex}' in '{value}'"))?;
            raw.push(byte);
            i += 3;
        } else {
            raw.push(bytes[i]);
            i += 1;
        }
    }

    String::from_utf8(raw).map_err(|_| format!("percent-decoded bytes in '{value}' are not valid UTF-8"))
}

/// Coerces a `Params` value into its canonical textual form for URL building (§4.1 build
/// algorithm): objects are JSON-serialized; numbers/booleans use their canonical textual form;
/// non-finite numbers are rejected.
pub fn value_to_build_string(param: &str, value: &Value) -> Result<String, BuildError> {
    match value {
        Value::String(s) => Ok(s.clone()),
        Value::Bool(b) => Ok(b.to_string()),
        Value::Number(n) => {
            if let Some(f) = n.as_f64() {
                if !f.is_finite() {
                    return Err(BuildError::ConstraintViolation {
                        param: param.to_string(),
                        value: n.to_string(),
                    });
                }
            }
            Ok(n.to_string())
        }
        Value::Null => Err(BuildError::MissingParam(param.to_string())),
        other => serde_json::to_string(other).map_err(|_| BuildError::MissingParam(param.to_string())),
    }
}

impl fmt::Display for EncodingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EncodingStrategy::Default => "default",
            EncodingStrategy::Uri => "uri",
            EncodingStrategy::UriComponent => "uriComponent",
            EncodingStrategy::None => "none",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parsed_path_keeps_trailing_slash_info() {
        let p = ParsedPath::parse("/users/42/");
        assert_eq!(p.clean_path, "/users/42/");
        assert_eq!(p.normalized, "/users/42");
        assert!(p.trailing_slash);
        assert_eq!(p.segments, vec!["users", "42"]);
    }

    #[test]
    fn root_path_has_no_trailing_slash_flag() {
        let p = ParsedPath::parse("/");
        assert!(!p.trailing_slash);
        assert!(p.segments.is_empty());
    }

    #[test]
    fn query_params_parse_and_merge() {
        let q = QueryParams::parse("tab=info&tags=a&tags=b").unwrap();
        assert_eq!(q.get("tab"), Some("info"));
        assert_eq!(q.get_all("tags"), &["a".to_string(), "b".to_string()]);

        let mut params = Params::new();
        params.insert("id".into(), Value::String("42".into()));
        q.merge_into(&mut params);
        assert_eq!(params.get("tab").unwrap(), &Value::String("info".into()));
        assert_eq!(params.get("id").unwrap(), &Value::String("42".into()));
    }

    #[test]
    fn percent_decode_rejects_malformed_escapes() {
        assert!(percent_decode("100%").is_err());
        assert!(percent_decode("100%2").is_err());
        assert!(percent_decode("100%2G").is_err());
        assert_eq!(percent_decode("100%25").unwrap(), "100%");
    }

    #[test]
    fn default_encoding_preserves_sub_delimiters() {
        let encoded = percent_encode("a;b,c:d", EncodingStrategy::Default);
        assert_eq!(encoded, "a;b,c:d");
    }

    #[test]
    fn uri_component_encodes_sub_delimiters() {
        let encoded = percent_encode("a;b", EncodingStrategy::UriComponent);
        assert_eq!(encoded, "a%3Bb");
    }

    #[test]
    fn encoding_fast_path_returns_unchanged_when_possible() {
        let input = "plain-value_123.ok~";
        let encoded = percent_encode(input, EncodingStrategy::UriComponent);
        assert_eq!(encoded, input);
    }

    #[test]
    fn splat_encoding_preserves_slashes() {
        let encoded = percent_encode_splat("a/b c/d", EncodingStrategy::UriComponent);
        assert_eq!(encoded, "a/b%20c/d");
    }

    #[test]
    fn value_to_build_string_serializes_objects_as_json() {
        let value: Value = serde_json::json!({"a": 1});
        assert_eq!(value_to_build_string("p", &value).unwrap(), r#"{"a":1}"#);
    }

    #[test]
    fn value_to_build_string_rejects_null() {
        assert!(value_to_build_string("p", &Value::Null).is_err());
    }

    #[test]
    fn a_custom_query_parser_can_be_plugged_in() {
        struct SemicolonParser;
        impl QueryParser for SemicolonParser {
            fn parse(&self, query: &str) -> ParamsResult<QueryParams> {
                QueryParams::parse(&query.replace(';', "&"))
            }
        }

        let parser: SharedQueryParser = Arc::new(SemicolonParser);
        let parsed = parser.parse("a=1;b=2").unwrap();
        assert_eq!(parsed.get("a"), Some("1"));
        assert_eq!(parsed.get("b"), Some("2"));
    }
}
