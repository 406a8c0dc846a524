//! Request model and parameter serialization.
//!
//! Serialization follows the `OpenAPI` defaults only:
//! - path: `simple`, non-exploded (arrays comma-joined)
//! - query: `form`, exploded (arrays become repeated pairs)
//! - header: `simple` (arrays comma-joined)
//! - cookie: `form`, exploded (arrays become repeated cookie pairs)

use crate::runtime::{HttpToolsError, Result};
use reqwest::Method;
use serde_json::{Map, Value};

/// A JSON request body plus the media type it is sent with.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestBody {
    pub content_type: String,
    pub content: Value,
}

/// A downstream request, already split by parameter location.
#[derive(Debug, Clone)]
pub struct OutboundRequest {
    pub method: Method,
    /// Path template as written in the document, e.g. `/pets/{petId}`.
    pub path: String,
    pub path_params: Map<String, Value>,
    pub query: Map<String, Value>,
    pub headers: Map<String, Value>,
    pub cookies: Map<String, Value>,
    pub body: Option<RequestBody>,
}

impl OutboundRequest {
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            path_params: Map::new(),
            query: Map::new(),
            headers: Map::new(),
            cookies: Map::new(),
            body: None,
        }
    }

    /// Substitute `{name}` placeholders in the path template.
    ///
    /// # Errors
    ///
    /// Returns an error if a placeholder has no value or the template is malformed.
    pub fn render_path(&self) -> Result<String> {
        let mut out = String::with_capacity(self.path.len());
        let mut rest = self.path.as_str();
        while let Some(start) = rest.find('{') {
            out.push_str(&rest[..start]);
            let after = &rest[start + 1..];
            let Some(end) = after.find('}') else {
                return Err(HttpToolsError::Runtime(format!(
                    "Unterminated path placeholder in '{}'",
                    self.path
                )));
            };
            let name = &after[..end];
            let value = self
                .path_params
                .get(name)
                .filter(|v| !v.is_null())
                .ok_or_else(|| {
                    HttpToolsError::Runtime(format!("Missing value for path parameter '{name}'"))
                })?;
            out.push_str(&encode_path_segment(&simple_style(value)));
            rest = &after[end + 1..];
        }
        out.push_str(rest);
        Ok(out)
    }

    /// Query pairs in form/explode style. `null` values and `null` array items are skipped.
    #[must_use]
    pub fn query_pairs(&self) -> Vec<(String, String)> {
        let mut pairs = Vec::new();
        for (name, value) in &self.query {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items.iter().filter(|v| !v.is_null()) {
                        pairs.push((name.clone(), value_to_string(item)));
                    }
                }
                other => pairs.push((name.clone(), value_to_string(other))),
            }
        }
        pairs
    }

    /// Rendered query string (without the leading `?`), or `None` when there are no pairs.
    #[must_use]
    pub fn query_string(&self) -> Option<String> {
        let pairs = self.query_pairs();
        if pairs.is_empty() {
            return None;
        }
        Some(
            pairs
                .iter()
                .map(|(k, v)| {
                    format!(
                        "{}={}",
                        encode_query_component(k),
                        encode_query_component(v)
                    )
                })
                .collect::<Vec<_>>()
                .join("&"),
        )
    }

    /// Header name/value pairs. Arrays are comma-joined; empty results are dropped.
    #[must_use]
    pub fn header_pairs(&self) -> Vec<(String, String)> {
        self.headers
            .iter()
            .filter_map(|(name, value)| {
                let rendered = simple_style(value);
                (!rendered.is_empty()).then(|| (name.clone(), rendered))
            })
            .collect()
    }

    /// A single `Cookie` header value holding every cookie parameter, or `None`.
    #[must_use]
    pub fn cookie_header(&self) -> Option<String> {
        let mut parts: Vec<String> = Vec::new();
        for (name, value) in &self.cookies {
            match value {
                Value::Null => {}
                Value::Array(items) => {
                    for item in items.iter().filter(|v| !v.is_null()) {
                        parts.push(format!("{name}={}", value_to_string(item)));
                    }
                }
                other => parts.push(format!("{name}={}", value_to_string(other))),
            }
        }
        if parts.is_empty() {
            None
        } else {
            Some(parts.join("; "))
        }
    }

    /// Whether a header parameter with this name (case-insensitive) is present.
    #[must_use]
    pub fn has_header(&self, name: &str) -> bool {
        self.headers
            .iter()
            .any(|(k, v)| k.eq_ignore_ascii_case(name) && !v.is_null())
    }
}

fn simple_style(value: &Value) -> String {
    match value {
        Value::Array(items) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(value_to_string)
            .collect::<Vec<_>>()
            .join(","),
        other => value_to_string(other),
    }
}

/// Render a scalar the way it appears on the wire. Objects and arrays fall back to JSON text.
#[must_use]
pub fn value_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => value.to_string(),
    }
}

const HEX: &[u8; 16] = b"0123456789ABCDEF";

fn is_unreserved(b: u8) -> bool {
    matches!(b, b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'.' | b'_' | b'~')
}

fn percent_encode(s: &str, keep: impl Fn(u8) -> bool) -> String {
    let mut out = String::with_capacity(s.len());
    for &b in s.as_bytes() {
        if keep(b) {
            out.push(b as char);
        } else {
            out.push('%');
            out.push(HEX[(b >> 4) as usize] as char);
            out.push(HEX[(b & 0x0F) as usize] as char);
        }
    }
    out
}

/// Percent-encode a query key or value. Only RFC 3986 unreserved bytes pass through.
#[must_use]
pub fn encode_query_component(s: &str) -> String {
    percent_encode(s, is_unreserved)
}

/// Percent-encode a single path segment. Sub-delimiters that are safe inside a segment are kept.
#[must_use]
pub fn encode_path_segment(s: &str) -> String {
    percent_encode(s, |b| {
        is_unreserved(b) || matches!(b, b'!' | b'$' | b'\'' | b'(' | b')' | b'*' | b',' | b':' | b'@')
    })
}
