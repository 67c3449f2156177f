//! Extraction of resolution inputs from an HTTP request.
//!
//! Derives the category from the path and reads the lookup value, delay
//! override, and template data from the query string and body.

use axum::http::Method;
use serde_json::{Map, Value};
use tracing::debug;

/// First meaningful path segment, skipping a literal `api` prefix.
pub fn category_from_path(path: &str) -> Option<&str> {
    let mut segments = path.split('/').filter(|s| !s.is_empty());
    match segments.next() {
        Some("api") => segments.next(),
        other => other,
    }
}

/// Query parameters and parsed body of one request.
#[derive(Debug, Clone)]
pub struct RequestInput {
    method: Method,
    query: Map<String, Value>,
    body: Option<Value>,
}

impl RequestInput {
    /// Start from a method and raw query string.
    pub fn new(method: Method, query: Option<&str>) -> Self {
        Self {
            method,
            query: parse_query_string(query.unwrap_or("")),
            body: None,
        }
    }

    /// Attach a request body.
    ///
    /// Form bodies are decoded like query strings; anything else is parsed
    /// as JSON. Bodies that cannot be parsed are dropped.
    pub fn with_body(mut self, content_type: Option<&str>, bytes: &[u8]) -> Self {
        if bytes.is_empty() {
            return self;
        }
        let is_form = content_type
            .map(|ct| ct.trim_start().starts_with("application/x-www-form-urlencoded"))
            .unwrap_or(false);

        self.body = if is_form {
            Some(Value::Object(parse_query_string(&String::from_utf8_lossy(bytes))))
        } else {
            match serde_json::from_slice(bytes) {
                Ok(value) => Some(value),
                Err(e) => {
                    debug!(error = %e, "Ignoring unparseable request body");
                    None
                }
            }
        };
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// Whether the body takes precedence over the query string.
    pub fn is_mutating(&self) -> bool {
        [Method::POST, Method::PUT, Method::PATCH].contains(&self.method)
    }

    /// Field sources in precedence order.
    fn sources(&self) -> Vec<&Map<String, Value>> {
        let body = self.body.as_ref().and_then(Value::as_object);
        match body {
            Some(body) if self.is_mutating() => vec![body, &self.query],
            _ => vec![&self.query],
        }
    }

    /// First non-null value for `name` across the ordered sources.
    pub fn field(&self, name: &str) -> Option<&Value> {
        self.sources()
            .into_iter()
            .filter_map(|source| source.get(name))
            .find(|value| !value.is_null())
    }

    /// The lookup value carried in `name`.
    ///
    /// Empty strings and zero are real values and are returned as such.
    pub fn lookup_value(&self, name: &str) -> Option<String> {
        match self.field(name)? {
            Value::String(s) => Some(s.clone()),
            value @ (Value::Number(_) | Value::Bool(_)) => Some(value.to_string()),
            _ => None,
        }
    }

    /// Per-request delay override in milliseconds, if one was supplied.
    pub fn explicit_delay(&self, name: &str) -> Option<i64> {
        match self.field(name)? {
            Value::Number(n) => n.as_i64().or_else(|| n.as_f64().map(|f| f as i64)),
            Value::String(s) => {
                let s = s.trim();
                s.parse::<i64>()
                    .ok()
                    .or_else(|| s.parse::<f64>().ok().filter(|f| f.is_finite()).map(|f| f as i64))
            }
            _ => None,
        }
    }

    /// Query parameters overlaid with the top-level fields of the body.
    pub fn request_data(&self) -> Value {
        let mut data = self.query.clone();
        if let Some(Value::Object(body)) = &self.body {
            for (k, v) in body {
                data.insert(k.clone(), v.clone());
            }
        }
        Value::Object(data)
    }
}

/// Parse a query string into key-value pairs.
pub fn parse_query_string(query: &str) -> Map<String, Value> {
    let mut params = Map::new();

    for part in query.split('&') {
        if part.is_empty() {
            continue;
        }
        let (key, value) = part.split_once('=').unwrap_or((part, ""));
        params.insert(
            urlencoding_decode(key),
            Value::String(urlencoding_decode(value)),
        );
    }

    params
}

/// Percent-decode a query component, treating `+` as a space.
fn urlencoding_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;

    while i < bytes.len() {
        match bytes[i] {
            b'%' => {
                let decoded = s
                    .get(i + 1..i + 3)
                    .filter(|hex| hex.bytes().all(|b| b.is_ascii_hexdigit()))
                    .and_then(|hex| u8::from_str_radix(hex, 16).ok());
                match decoded {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(b'%');
                        i += 1;
                    }
                }
            }
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }

    String::from_utf8_lossy(&out).into_owned()
}
