//! Sanitization for user-provided strings before storage.
//!
//! Strips HTML tags, inline script vectors and control characters. Stored
//! values are rendered back into dashboards and exports, so this runs once
//! at every write boundary rather than on read.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref HTML_TAGS: Regex = Regex::new(r"<[^>]*>").unwrap();
    static ref JS_PROTOCOL: Regex = Regex::new(r"(?i)javascript:").unwrap();
    static ref EVENT_HANDLERS: Regex = Regex::new(r#"(?i)on\w+\s*=\s*["'][^"']*["']"#).unwrap();
    static ref CONTROL_CHARS: Regex =
        Regex::new("[\u{00}-\u{08}\u{0B}\u{0C}\u{0E}-\u{1F}\u{7F}]").unwrap();
}

/// Strip markup and control characters from a string and trim whitespace.
pub fn sanitize_string(value: &str) -> String {
    let value = HTML_TAGS.replace_all(value, "");
    let value = JS_PROTOCOL.replace_all(&value, "");
    let value = EVENT_HANDLERS.replace_all(&value, "");
    let value = CONTROL_CHARS.replace_all(&value, "");
    value.trim().to_string()
}

/// Sanitize an optional string, passing None through.
pub fn sanitize_optional(value: Option<&str>) -> Option<String> {
    value.map(sanitize_string)
}

/// Recursively sanitize string leaves of a submitted JSON value.
pub fn sanitize_json(value: &serde_json::Value) -> serde_json::Value {
    use serde_json::Value;

    match value {
        Value::String(s) => Value::String(sanitize_string(s)),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_json).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), sanitize_json(v)))
                .collect(),
        ),
        other => other.clone(),
    }
}
