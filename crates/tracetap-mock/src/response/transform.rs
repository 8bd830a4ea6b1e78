//! Response transformer pipeline and the built-in transformers.

use super::{RequestContext, ResponseSpec};
use crate::config::TransformerName;
use serde_json::Value;
use std::sync::Arc;

/// A `(response, context) -> response` pipeline stage.
pub type Transformer = Arc<dyn Fn(ResponseSpec, &RequestContext) -> ResponseSpec + Send + Sync>;

pub fn builtin(name: TransformerName) -> Transformer {
    match name {
        TransformerName::AddTimestamp => Arc::new(add_timestamp),
        TransformerName::ReplaceIds => Arc::new(replace_ids),
        TransformerName::CorsHeaders => Arc::new(cors_headers),
        TransformerName::PrettyJson => Arc::new(pretty_json),
    }
}

/// Run stages in registration order.
pub fn apply_all(
    transformers: &[Transformer],
    spec: ResponseSpec,
    context: &RequestContext,
) -> ResponseSpec {
    transformers
        .iter()
        .fold(spec, |spec, transform| transform(spec, context))
}

/// Edit a JSON body in place; non-JSON bodies pass through.
fn map_json_body(mut spec: ResponseSpec, edit: impl FnOnce(&mut Value)) -> ResponseSpec {
    if let Ok(mut json) = serde_json::from_str::<Value>(&spec.body) {
        edit(&mut json);
        if let Ok(body) = serde_json::to_string(&json) {
            spec.body = body;
        }
    }
    spec
}

pub fn add_timestamp(spec: ResponseSpec, _context: &RequestContext) -> ResponseSpec {
    map_json_body(spec, |json| {
        if let Value::Object(map) = json {
            map.insert(
                "timestamp".to_string(),
                Value::String(chrono::Utc::now().to_rfc3339()),
            );
        }
    })
}

pub fn replace_ids(spec: ResponseSpec, context: &RequestContext) -> ResponseSpec {
    if !context.has_variables() {
        return spec;
    }
    map_json_body(spec, |json| replace_matching_keys(json, context))
}

fn replace_matching_keys(value: &mut Value, context: &RequestContext) {
    match value {
        Value::Object(map) => {
            for (key, field) in map.iter_mut() {
                match context.get(key) {
                    Some(replacement) => *field = replacement.clone(),
                    None => replace_matching_keys(field, context),
                }
            }
        }
        Value::Array(items) => items
            .iter_mut()
            .for_each(|item| replace_matching_keys(item, context)),
        _ => {}
    }
}

pub fn cors_headers(mut spec: ResponseSpec, _context: &RequestContext) -> ResponseSpec {
    for (name, value) in [
        ("access-control-allow-origin", "*"),
        (
            "access-control-allow-methods",
            "GET, POST, PUT, DELETE, PATCH, OPTIONS",
        ),
        ("access-control-allow-headers", "*"),
    ] {
        spec.headers.insert(name.to_string(), value.to_string());
    }
    spec
}

pub fn pretty_json(mut spec: ResponseSpec, _context: &RequestContext) -> ResponseSpec {
    if let Ok(json) = serde_json::from_str::<Value>(&spec.body) {
        if let Ok(pretty) = serde_json::to_string_pretty(&json) {
            spec.body = pretty;
        }
    }
    spec
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use crate::capture::Headers;

    fn spec(body: &str) -> ResponseSpec {
        ResponseSpec {
            status: 200,
            headers: Headers::new(),
            body: body.to_string(),
        }
    }

    #[test]
    fn test_add_timestamp() {
        let out = add_timestamp(spec(r#"{"a":1}"#), &RequestContext::default());
        let json: Value = serde_json::from_str(&out.body).unwrap();
        assert!(json["timestamp"].is_string());

        let text = add_timestamp(spec("plain"), &RequestContext::default());
        assert_eq!(text.body, "plain");
    }

    #[test]
    fn test_replace_ids() {
        let ctx = RequestContext::default().with_var("id", json!("77"));
        let out = replace_ids(spec(r#"{"id":1,"items":[{"id":2,"name":"x"}]}"#), &ctx);
        let json: Value = serde_json::from_str(&out.body).unwrap();
        assert_eq!(json["id"], "77");
        assert_eq!(json["items"][0]["id"], "77");
        assert_eq!(json["items"][0]["name"], "x");
    }

    #[test]
    fn test_cors_and_pretty() {
        let out = cors_headers(spec("{}"), &RequestContext::default());
        assert_eq!(out.headers["access-control-allow-origin"], "*");

        let pretty = pretty_json(spec(r#"{"a":[1]}"#), &RequestContext::default());
        assert_eq!(pretty.body, "{\n  \"a\": [\n    1\n  ]\n}");
    }

    #[test]
    fn test_pipeline_runs_in_order() {
        let first: Transformer = Arc::new(|mut s: ResponseSpec, _: &RequestContext| {
            s.body.push('1');
            s
        });
        let second: Transformer = Arc::new(|mut s: ResponseSpec, _: &RequestContext| {
            s.body.push('2');
            s
        });
        let out = apply_all(&[first, second], spec(""), &RequestContext::default());
        assert_eq!(out.body, "12");
    }
}
