//! Response generation from a matched capture.
//!
//! Modes:
//! - `static`: the capture's status, headers and body as stored
//! - `template`: `{{var}}` placeholders filled from the request context
//! - `transform`: registered transformers applied in order
//! - `faker`: JSON leaves replaced with synthetic data
//! - `ai`: body generated by the AI delegate, static on failure
//! - `intelligent`: ai, then template, then transform, then static

pub mod ai;
pub mod faker;
pub mod template;
pub mod transform;

use crate::ai::{with_timeout, AiDelegate, AiError};
use crate::capture::{Capture, Headers};
use crate::config::{ResponseConfig, ResponseMode};
use crate::matching::id::{is_numeric_id, is_uuid, parse_query};
use crate::matching::IncomingRequest;
use serde::Serialize;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

pub use faker::Faker;
pub use transform::Transformer;

/// A rendered response. Built fresh for every request.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseSpec {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
}

impl ResponseSpec {
    pub fn from_capture(capture: &Capture) -> Self {
        Self {
            status: capture.status,
            headers: capture.resp_headers.clone(),
            body: capture.resp_body.clone(),
        }
    }
}

/// Request data available to response modes.
#[derive(Debug, Clone, Default)]
pub struct RequestContext {
    pub method: String,
    pub url: String,
    pub body: String,
    /// Query params, path ids and top-level JSON body fields
    pub vars: Map<String, Value>,
}

impl RequestContext {
    /// Collect variables from the query string, the path and a JSON body.
    pub fn from_request(request: &IncomingRequest) -> Self {
        let mut vars = Map::new();
        let (path, query) = crate::matching::id::split_url(&request.url);

        for (key, mut values) in parse_query(query) {
            let value = if values.len() == 1 {
                Value::String(values.remove(0))
            } else {
                Value::Array(values.into_iter().map(Value::String).collect())
            };
            vars.insert(key, value);
        }

        for segment in path.split('/').filter(|s| !s.is_empty()) {
            if is_numeric_id(segment) {
                vars.insert("id".to_string(), Value::String(segment.to_string()));
            } else if is_uuid(segment) {
                vars.insert("uuid".to_string(), Value::String(segment.to_string()));
            }
        }

        if let Ok(Value::Object(fields)) = serde_json::from_slice::<Value>(&request.body) {
            vars.extend(fields);
        }

        Self {
            method: request.method.to_uppercase(),
            url: request.url.clone(),
            body: String::from_utf8_lossy(&request.body).into_owned(),
            vars,
        }
    }

    pub fn with_var(mut self, key: &str, value: Value) -> Self {
        self.vars.insert(key.to_string(), value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.vars.get(key)
    }

    pub fn has_variables(&self) -> bool {
        !self.vars.is_empty()
    }
}

pub struct ResponseGenerator {
    mode: ResponseMode,
    transformers: Vec<Transformer>,
    ai: Option<Arc<dyn AiDelegate>>,
    ai_timeout: Duration,
    faker_seed: Option<u64>,
}

impl ResponseGenerator {
    pub fn new(config: &ResponseConfig) -> Self {
        Self {
            mode: config.mode,
            transformers: config
                .transformers
                .iter()
                .map(|name| transform::builtin(*name))
                .collect(),
            ai: None,
            ai_timeout: Duration::from_secs(30),
            faker_seed: config.faker_seed,
        }
    }

    pub fn with_ai(mut self, ai: Arc<dyn AiDelegate>, timeout: Duration) -> Self {
        self.ai = Some(ai);
        self.ai_timeout = timeout;
        self
    }

    /// Append a custom pipeline stage after the configured ones.
    pub fn with_transformer(mut self, transformer: Transformer) -> Self {
        self.transformers.push(transformer);
        self
    }

    /// Configured default mode.
    pub fn mode(&self) -> ResponseMode {
        self.mode
    }

    pub async fn generate(
        &self,
        capture: &Capture,
        context: &RequestContext,
        mode: ResponseMode,
    ) -> ResponseSpec {
        match mode {
            ResponseMode::Static => ResponseSpec::from_capture(capture),
            ResponseMode::Template => template::apply(ResponseSpec::from_capture(capture), context),
            ResponseMode::Transform => self.transformed(capture, context),
            ResponseMode::Faker => self.faked(capture),
            ResponseMode::Ai => match self.ai_generated(capture, context).await {
                Ok(spec) => spec,
                Err(e) => {
                    warn!("AI response generation failed, serving static: {}", e);
                    ResponseSpec::from_capture(capture)
                }
            },
            ResponseMode::Intelligent => self.intelligent(capture, context).await,
        }
    }

    async fn intelligent(&self, capture: &Capture, context: &RequestContext) -> ResponseSpec {
        if self.ai.is_some() {
            match self.ai_generated(capture, context).await {
                Ok(spec) => return spec,
                Err(e) => debug!("Intelligent mode skipping AI: {}", e),
            }
        }
        if context.has_variables() {
            return template::apply(ResponseSpec::from_capture(capture), context);
        }
        if !self.transformers.is_empty() {
            return self.transformed(capture, context);
        }
        ResponseSpec::from_capture(capture)
    }

    fn transformed(&self, capture: &Capture, context: &RequestContext) -> ResponseSpec {
        transform::apply_all(
            &self.transformers,
            ResponseSpec::from_capture(capture),
            context,
        )
    }

    fn faked(&self, capture: &Capture) -> ResponseSpec {
        let mut spec = ResponseSpec::from_capture(capture);
        spec.body = Faker::new(self.faker_seed).fake_body(&spec.body);
        spec
    }

    async fn ai_generated(
        &self,
        capture: &Capture,
        context: &RequestContext,
    ) -> Result<ResponseSpec, AiError> {
        let delegate = self.ai.as_ref().ok_or(AiError::NotConfigured)?;
        let prompt = ai::build_prompt(capture, context);
        let reply = with_timeout(self.ai_timeout, delegate.complete(&prompt)).await?;
        Ok(ai::to_spec(capture, &reply))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedDelegate;
    use crate::config::TransformerName;
    use serde_json::json;

    fn capture() -> Capture {
        Capture::new("GET", "https://api.x/users/1")
            .with_status(200)
            .with_resp_header("content-type", "application/json")
            .with_resp_body(r#"{"id":"{{id}}","email":"a@b.c"}"#)
    }

    fn generator(transformers: Vec<TransformerName>) -> ResponseGenerator {
        ResponseGenerator::new(&ResponseConfig {
            transformers,
            faker_seed: Some(7),
            ..Default::default()
        })
    }

    #[test]
    fn test_context_extraction() {
        let request = IncomingRequest::new(
            "post",
            "https://api.x/users/42/docs/550e8400-e29b-41d4-a716-446655440000?page=2&tag=a&tag=b",
        )
        .with_body(r#"{"name":"Ann","page":"body-wins"}"#);
        let ctx = RequestContext::from_request(&request);

        assert_eq!(ctx.method, "POST");
        assert_eq!(ctx.get("id"), Some(&json!("42")));
        assert_eq!(
            ctx.get("uuid"),
            Some(&json!("550e8400-e29b-41d4-a716-446655440000"))
        );
        assert_eq!(ctx.get("tag"), Some(&json!(["a", "b"])));
        assert_eq!(ctx.get("name"), Some(&json!("Ann")));
        assert_eq!(ctx.get("page"), Some(&json!("body-wins")));
    }

    #[test]
    fn test_context_without_variables() {
        let ctx = RequestContext::from_request(&IncomingRequest::new("GET", "https://api.x/health"));
        assert!(!ctx.has_variables());
    }

    #[tokio::test]
    async fn test_static_round_trip() {
        let capture = capture();
        let ctx = RequestContext::default().with_var("id", json!("9"));
        let spec = generator(vec![])
            .generate(&capture, &ctx, ResponseMode::Static)
            .await;

        assert_eq!(spec.status, capture.status);
        assert_eq!(spec.headers, capture.resp_headers);
        assert_eq!(spec.body, capture.resp_body);
    }

    #[tokio::test]
    async fn test_template_mode() {
        let ctx = RequestContext::default().with_var("id", json!("9"));
        let spec = generator(vec![])
            .generate(&capture(), &ctx, ResponseMode::Template)
            .await;
        assert_eq!(spec.body, r#"{"id":"9","email":"a@b.c"}"#);
    }

    #[tokio::test]
    async fn test_transform_mode() {
        let spec = generator(vec![TransformerName::CorsHeaders])
            .with_transformer(Arc::new(|mut s: ResponseSpec, _: &RequestContext| {
                s.status = 299;
                s
            }))
            .generate(&capture(), &RequestContext::default(), ResponseMode::Transform)
            .await;
        assert_eq!(spec.status, 299);
        assert_eq!(spec.headers["access-control-allow-origin"], "*");
    }

    #[tokio::test]
    async fn test_faker_mode() {
        let spec = generator(vec![])
            .generate(&capture(), &RequestContext::default(), ResponseMode::Faker)
            .await;
        let json: Value = serde_json::from_str(&spec.body).unwrap();
        assert_ne!(json["email"], "a@b.c");
        assert_eq!(spec.status, 200);
    }

    #[tokio::test]
    async fn test_ai_mode_uses_reply() {
        let delegate = ScriptedDelegate::replying(vec![Ok("```json\n{\"id\": 1}\n```".to_string())]);
        let spec = generator(vec![])
            .with_ai(Arc::new(delegate), Duration::from_secs(1))
            .generate(&capture(), &RequestContext::default(), ResponseMode::Ai)
            .await;
        assert_eq!(spec.body, "{\"id\": 1}");
        assert_eq!(spec.headers["x-generated-by"], "tracetap-ai");
    }

    #[tokio::test]
    async fn test_ai_mode_falls_back_to_static() {
        let spec = generator(vec![])
            .generate(&capture(), &RequestContext::default(), ResponseMode::Ai)
            .await;
        assert_eq!(spec, ResponseSpec::from_capture(&capture()));

        let failing = ScriptedDelegate::replying(vec![Err(AiError::Transport("down".to_string()))]);
        let spec = generator(vec![])
            .with_ai(Arc::new(failing), Duration::from_secs(1))
            .generate(&capture(), &RequestContext::default(), ResponseMode::Ai)
            .await;
        assert_eq!(spec, ResponseSpec::from_capture(&capture()));
    }

    #[tokio::test]
    async fn test_intelligent_fall_through() {
        let ctx = RequestContext::default().with_var("id", json!("5"));
        let failing = ScriptedDelegate::replying(vec![Err(AiError::Timeout(Duration::ZERO))]);
        let with_vars = generator(vec![])
            .with_ai(Arc::new(failing), Duration::from_secs(1))
            .generate(&capture(), &ctx, ResponseMode::Intelligent)
            .await;
        assert!(with_vars.body.contains(r#""id":"5""#));

        let transformed = generator(vec![TransformerName::CorsHeaders])
            .generate(&capture(), &RequestContext::default(), ResponseMode::Intelligent)
            .await;
        assert!(transformed.headers.contains_key("access-control-allow-origin"));

        let plain = generator(vec![])
            .generate(&capture(), &RequestContext::default(), ResponseMode::Intelligent)
            .await;
        assert_eq!(plain, ResponseSpec::from_capture(&capture()));
    }
}
