//! AI-generated response bodies.

use super::{RequestContext, ResponseSpec};
use crate::capture::{Capture, Headers};
use crate::matching::semantic::truncate;
use regex::Regex;
use std::sync::OnceLock;

const PREVIEW_CHARS: usize = 500;

static FENCED_BLOCK_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_fenced_block_regex() -> &'static Regex {
    FENCED_BLOCK_REGEX.get_or_init(|| Regex::new(r"(?s)```(?:json)?\s*\n(.*?)\n\s*```").unwrap())
}

pub fn build_prompt(capture: &Capture, context: &RequestContext) -> String {
    let vars = serde_json::to_string(&context.vars).unwrap_or_default();
    format!(
        "Generate a realistic HTTP response body for the request below.\n\n\
         REQUEST:\nMethod: {}\nURL: {}\nBody: {}\nExtracted variables: {}\n\n\
         REFERENCE RESPONSE (status {}):\n{}\n\n\
         Keep the structure of the reference response, adapt values to the request, \
         and return only the body inside a ```json code block.",
        context.method,
        context.url,
        truncate(&context.body, PREVIEW_CHARS),
        vars,
        capture.status,
        truncate(&capture.resp_body, PREVIEW_CHARS),
    )
}

/// Body text from a completion: a fenced block if present, else the whole
/// reply. The flag reports whether the body is JSON.
pub fn extract_body(reply: &str) -> (String, bool) {
    let candidate = get_fenced_block_regex()
        .captures(reply)
        .and_then(|caps| caps.get(1))
        .map_or(reply.trim(), |m| m.as_str().trim());

    let is_json = serde_json::from_str::<serde_json::Value>(candidate).is_ok();
    (candidate.to_string(), is_json)
}

pub fn to_spec(capture: &Capture, reply: &str) -> ResponseSpec {
    let (body, is_json) = extract_body(reply);
    let content_type = if is_json {
        "application/json"
    } else {
        "text/plain"
    };

    let headers = Headers::from([
        ("content-type".to_string(), content_type.to_string()),
        ("x-generated-by".to_string(), "tracetap-ai".to_string()),
    ]);

    ResponseSpec {
        status: capture.status,
        headers,
        body,
    }
}
