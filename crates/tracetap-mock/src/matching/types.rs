//! Request and result types shared by the matching strategies.

use super::id::{parse_query, split_url, QueryParams};
use super::score::MatchScore;
use crate::capture::{Capture, Headers};
use bytes::Bytes;
use std::sync::Arc;

/// One inbound call. Never persisted.
#[derive(Debug, Clone, Default)]
pub struct IncomingRequest {
    pub method: String,
    /// Absolute URL (origin-form is accepted too)
    pub url: String,
    pub headers: Headers,
    pub body: Bytes,
}

impl IncomingRequest {
    pub fn new(method: &str, url: &str) -> Self {
        Self {
            method: method.to_string(),
            url: url.to_string(),
            headers: Headers::new(),
            body: Bytes::new(),
        }
    }

    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.insert(name.to_string(), value.to_string());
        self
    }

    pub fn with_body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = body.into();
        self
    }

    pub fn path(&self) -> &str {
        split_url(&self.url).0
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub(crate) fn parsed(&self) -> ParsedRequest<'_> {
        let (path, query) = split_url(&self.url);
        ParsedRequest {
            method: self.method.to_uppercase(),
            path,
            query: parse_query(query),
            request: self,
        }
    }
}

/// An incoming request with its URL broken out once per match attempt.
pub(crate) struct ParsedRequest<'a> {
    pub method: String,
    pub path: &'a str,
    pub query: QueryParams,
    pub request: &'a IncomingRequest,
}

/// Outcome of a match attempt. `matched` implies `capture` is present.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchResult {
    pub matched: bool,
    pub capture: Option<Arc<Capture>>,
    pub score: Option<MatchScore>,
    pub reason: String,
}

impl MatchResult {
    pub fn found(capture: Arc<Capture>, score: MatchScore, reason: impl Into<String>) -> Self {
        Self {
            matched: true,
            capture: Some(capture),
            score: Some(score),
            reason: reason.into(),
        }
    }

    pub fn not_found(reason: impl Into<String>) -> Self {
        Self {
            matched: false,
            capture: None,
            score: None,
            reason: reason.into(),
        }
    }

    /// No match, but a best candidate was scored.
    pub fn below_threshold(score: MatchScore, reason: impl Into<String>) -> Self {
        Self {
            matched: false,
            capture: None,
            score: Some(score),
            reason: reason.into(),
        }
    }

    pub fn total_score(&self) -> Option<f64> {
        self.score.map(|s| s.total_score)
    }
}
