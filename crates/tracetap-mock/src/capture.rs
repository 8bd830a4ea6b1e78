//! Capture records and corpus loading.
//!
//! A capture is one previously observed request/response exchange. The corpus
//! is read once at startup and shared read-only by the matcher and the server.
//!
//! Accepted corpus shapes:
//! - a bare JSON array of capture objects
//! - an object holding that array under `requests`
//! - an object holding that array under `captures`

use serde::{Deserialize, Serialize};
use indexmap::IndexMap;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;

/// Header name to value, in the order the headers were seen.
pub type Headers = IndexMap<String, String>;

/// Errors raised while loading a capture corpus.
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("failed to read capture file: {0}")]
    Io(#[from] std::io::Error),

    #[error("capture file is not valid JSON: {0}")]
    Json(#[from] serde_json::Error),

    #[error("unrecognized capture document; expected an array or an object with `requests` or `captures` (found keys: {keys:?})")]
    UnrecognizedShape { keys: Vec<String> },

    #[error("capture #{index} is missing required string field `{field}`")]
    MissingField { index: usize, field: &'static str },
}

/// One previously observed exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Capture {
    /// Uppercase HTTP verb
    pub method: String,
    /// Absolute request URL
    pub url: String,
    #[serde(default)]
    pub req_headers: Headers,
    #[serde(default)]
    pub req_body: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default)]
    pub resp_headers: Headers,
    #[serde(default)]
    pub resp_body: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
}

impl Capture {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_uppercase(),
            url: url.to_string(),
            req_headers: Headers::new(),
            req_body: String::new(),
            status: 200,
            resp_headers: Headers::new(),
            resp_body: String::new(),
            timestamp: None,
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    pub fn with_req_header(mut self, name: &str, value: &str) -> Self {
        self.req_headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_req_body(mut self, body: &str) -> Self {
        self.req_body = body.to_string();
        self
    }

    pub fn with_resp_header(mut self, name: &str, value: &str) -> Self {
        self.resp_headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_resp_body(mut self, body: &str) -> Self {
        self.resp_body = body.to_string();
        self
    }
}

/// Load a corpus from a JSON file.
pub fn load_captures(path: impl AsRef<Path>) -> Result<Vec<Capture>, CaptureError> {
    let content = std::fs::read_to_string(path)?;
    parse_captures(&content)
}

/// Parse a corpus from JSON text.
pub fn parse_captures(content: &str) -> Result<Vec<Capture>, CaptureError> {
    let document: Value = serde_json::from_str(content)?;

    let entries = match document {
        Value::Array(items) => items,
        Value::Object(mut map) => match map.remove("requests").or_else(|| map.remove("captures")) {
            Some(Value::Array(items)) => items,
            _ => {
                let mut keys: Vec<String> = map.keys().cloned().collect();
                keys.sort();
                return Err(CaptureError::UnrecognizedShape { keys });
            }
        },
        _ => return Err(CaptureError::UnrecognizedShape { keys: Vec::new() }),
    };

    entries
        .iter()
        .enumerate()
        .map(|(index, entry)| capture_from_value(index, entry))
        .collect()
}

fn capture_from_value(index: usize, entry: &Value) -> Result<Capture, CaptureError> {
    let required = |field: &'static str| {
        entry
            .get(field)
            .and_then(Value::as_str)
            .map(str::to_string)
            .ok_or(CaptureError::MissingField { index, field })
    };

    let method = required("method")?.to_uppercase();
    let url = required("url")?;

    Ok(Capture {
        method,
        url,
        req_headers: header_map(entry.get("req_headers")),
        req_body: body_text(entry.get("req_body")),
        status: entry
            .get("status")
            .and_then(Value::as_u64)
            .and_then(|s| u16::try_from(s).ok())
            .unwrap_or(0),
        resp_headers: header_map(entry.get("resp_headers")),
        resp_body: body_text(entry.get("resp_body")),
        timestamp: entry
            .get("timestamp")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn header_map(value: Option<&Value>) -> Headers {
    let Some(Value::Object(map)) = value else {
        return Headers::new();
    };
    map.iter()
        .map(|(k, v)| {
            let v = match v {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            };
            (k.clone(), v)
        })
        .collect()
}

/// Bodies are stored as text; structured JSON bodies are re-serialized.
fn body_text(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(other) => other.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_parse_bare_array() {
        let captures = parse_captures(
            r#"[{"method": "get", "url": "https://api.x/users/1", "status": 200, "resp_body": "{}"}]"#,
        )
        .unwrap();

        assert_eq!(captures.len(), 1);
        assert_eq!(captures[0].method, "GET");
        assert_eq!(captures[0].status, 200);
        assert!(captures[0].req_headers.is_empty());
    }

    #[test]
    fn test_parse_requests_and_captures_keys() {
        let a = parse_captures(r#"{"session": "s", "requests": [{"method": "GET", "url": "/a"}]}"#)
            .unwrap();
        let b = parse_captures(r#"{"captures": [{"method": "POST", "url": "/b"}]}"#).unwrap();

        assert_eq!(a[0].url, "/a");
        assert_eq!(b[0].method, "POST");
    }

    #[test]
    fn test_missing_fields_default() {
        let captures = parse_captures(r#"[{"method": "GET", "url": "/x"}]"#).unwrap();
        let c = &captures[0];
        assert_eq!(c.status, 0);
        assert_eq!(c.req_body, "");
        assert_eq!(c.resp_body, "");
        assert!(c.resp_headers.is_empty());
    }

    #[test]
    fn test_header_order_is_preserved() {
        let captures = parse_captures(
            r#"[{"method": "GET", "url": "/x",
                 "resp_headers": {"X-Zeta": "1", "Content-Type": "text/plain", "A-First": "2"}}]"#,
        )
        .unwrap();
        let names: Vec<&str> = captures[0].resp_headers.keys().map(String::as_str).collect();
        assert_eq!(names, vec!["X-Zeta", "Content-Type", "A-First"]);

        let exported = serde_json::to_string(&captures[0].resp_headers).unwrap();
        assert_eq!(exported, r#"{"X-Zeta":"1","Content-Type":"text/plain","A-First":"2"}"#);
    }

    #[test]
    fn test_structured_body_is_serialized() {
        let captures =
            parse_captures(r#"[{"method": "GET", "url": "/x", "resp_body": {"id": 1}}]"#).unwrap();
        assert_eq!(captures[0].resp_body, r#"{"id":1}"#);
    }

    #[test]
    fn test_missing_url_is_an_error() {
        let err = parse_captures(r#"[{"method": "GET", "url": "/ok"}, {"method": "GET"}]"#)
            .unwrap_err();
        assert!(matches!(
            err,
            CaptureError::MissingField {
                index: 1,
                field: "url"
            }
        ));
    }

    #[test]
    fn test_unrecognized_shape() {
        let err = parse_captures(r#"{"items": []}"#).unwrap_err();
        match err {
            CaptureError::UnrecognizedShape { keys } => assert_eq!(keys, vec!["items"]),
            other => panic!("unexpected error: {other}"),
        }

        assert!(matches!(
            parse_captures("42"),
            Err(CaptureError::UnrecognizedShape { .. })
        ));
    }

    #[test]
    fn test_invalid_json() {
        assert!(matches!(parse_captures("{nope"), Err(CaptureError::Json(_))));
    }

    #[test]
    fn test_load_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"[{{"method": "DELETE", "url": "/users/9", "status": 204}}]"#).unwrap();

        let captures = load_captures(file.path()).unwrap();
        assert_eq!(captures[0].status, 204);
    }
}
