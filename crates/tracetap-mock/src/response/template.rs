//! `{{variable}}` substitution.
//!
//! Placeholders whose name is not in the context are left untouched, so a
//! captured body that happens to contain braces survives unchanged.

use super::{RequestContext, ResponseSpec};
use regex::{Captures, Regex};
use serde_json::Value;
use std::sync::OnceLock;

static PLACEHOLDER_REGEX: OnceLock<Regex> = OnceLock::new();

fn get_placeholder_regex() -> &'static Regex {
    PLACEHOLDER_REGEX
        .get_or_init(|| Regex::new(r"\{\{\s*([A-Za-z0-9_.\-]+)\s*\}\}").unwrap())
}

/// Text form of a context value: strings verbatim, everything else as JSON.
pub fn display_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn render(text: &str, context: &RequestContext) -> String {
    if !text.contains("{{") {
        return text.to_string();
    }

    get_placeholder_regex()
        .replace_all(text, |caps: &Captures| match context.get(&caps[1]) {
            Some(value) => display_value(value),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Render the body and every header value.
pub fn apply(mut spec: ResponseSpec, context: &RequestContext) -> ResponseSpec {
    spec.body = render(&spec.body, context);
    for value in spec.headers.values_mut() {
        *value = render(value, context);
    }
    spec
}
