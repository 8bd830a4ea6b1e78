//! Structured diffs between an incoming request and the capture it matched
//! (or came closest to).

use crate::capture::{Capture, Headers};
use crate::matching::id::{parse_query, split_url, QueryParams};
use crate::matching::semantic::truncate;
use crate::matching::{CaptureIndex, IncomingRequest};
use serde::Serialize;
use serde_json::Value;
use similar::TextDiff;
use std::collections::BTreeMap;
use std::sync::Arc;

const DIFF_HEADERS: [&str; 5] = [
    "content-type",
    "authorization",
    "accept",
    "x-api-key",
    "x-auth-token",
];
const BODY_PREVIEW: usize = 500;
const MAX_LINE_DIFF: usize = 50;
const CANDIDATE_SCAN_LIMIT: usize = 20;

#[derive(Debug, Clone, Serialize)]
pub struct RequestDiff {
    pub timestamp: String,
    pub incoming_method: String,
    pub incoming_url: String,
    pub matched_url: String,
    pub match_score: f64,
    pub match_reason: String,
    pub method_differs: bool,
    pub path_diff: PathDiff,
    pub query_diff: QueryDiff,
    pub header_diff: HeaderDiff,
    pub body_diff: BodyDiff,
}

#[derive(Debug, Clone, Serialize)]
pub struct PartDiff {
    pub index: usize,
    pub incoming: String,
    pub matched: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PathDiff {
    pub incoming: String,
    pub matched: String,
    pub differs: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub part_diffs: Vec<PartDiff>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ValueChange<T> {
    pub name: String,
    pub incoming: T,
    pub matched: T,
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryDiff {
    pub incoming: QueryParams,
    pub matched: QueryParams,
    pub added_params: Vec<String>,
    pub removed_params: Vec<String>,
    pub changed_params: Vec<ValueChange<Vec<String>>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct HeaderDiff {
    pub incoming: BTreeMap<String, String>,
    pub matched: BTreeMap<String, String>,
    pub added_headers: Vec<String>,
    pub removed_headers: Vec<String>,
    pub changed_headers: Vec<ValueChange<String>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BodyDiff {
    pub incoming: String,
    pub matched: String,
    pub differs: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub added_keys: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub removed_keys: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub changed_keys: Option<Vec<ValueChange<Value>>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line_diff: Option<Vec<String>>,
}

/// Closest capture for diffing when nothing matched: among the first few
/// same-method captures, the one sharing most path segments at equal depth.
pub fn best_candidate(index: &CaptureIndex, request: &IncomingRequest) -> Option<Arc<Capture>> {
    let same_method = index.with_method(&request.method);
    let incoming_parts = segments(request.path());

    let mut best: Option<(f64, &Arc<Capture>)> = None;
    for candidate in same_method.iter().take(CANDIDATE_SCAN_LIMIT) {
        let parts = segments(&candidate.path);
        if parts.len() != incoming_parts.len() {
            continue;
        }
        let shared = parts
            .iter()
            .zip(&incoming_parts)
            .filter(|(a, b)| a == b)
            .count();
        let score = shared as f64 / parts.len().max(1) as f64;
        if best.map_or(score > 0.0, |(b, _)| score > b) {
            best = Some((score, &candidate.capture));
        }
    }

    best.map(|(_, c)| Arc::clone(c))
        .or_else(|| same_method.first().map(|c| Arc::clone(&c.capture)))
        .or_else(|| index.entries().first().map(|c| Arc::clone(&c.capture)))
}

pub fn compute_diff(
    request: &IncomingRequest,
    capture: &Capture,
    match_score: f64,
    match_reason: &str,
) -> RequestDiff {
    let (incoming_path, incoming_query) = split_url(&request.url);
    let (matched_path, matched_query) = split_url(&capture.url);

    RequestDiff {
        timestamp: chrono::Utc::now().to_rfc3339(),
        incoming_method: request.method.to_uppercase(),
        incoming_url: request.url.clone(),
        matched_url: capture.url.clone(),
        match_score,
        match_reason: match_reason.to_string(),
        method_differs: !request.method.eq_ignore_ascii_case(&capture.method),
        path_diff: path_diff(incoming_path, matched_path),
        query_diff: query_diff(parse_query(incoming_query), parse_query(matched_query)),
        header_diff: header_diff(request, capture),
        body_diff: body_diff(&String::from_utf8_lossy(&request.body), &capture.req_body),
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

fn path_diff(incoming: &str, matched: &str) -> PathDiff {
    let incoming = if incoming.is_empty() { "/" } else { incoming };
    let matched = if matched.is_empty() { "/" } else { matched };

    let part_diffs = segments(incoming)
        .into_iter()
        .zip(segments(matched))
        .enumerate()
        .filter(|(_, (a, b))| a != b)
        .map(|(index, (a, b))| PartDiff {
            index,
            incoming: a.to_string(),
            matched: b.to_string(),
        })
        .collect();

    PathDiff {
        incoming: incoming.to_string(),
        matched: matched.to_string(),
        differs: incoming != matched,
        part_diffs,
    }
}

/// Keys only in `incoming`, keys only in `matched`, and shared keys whose
/// values differ.
fn key_changes<T: Clone + PartialEq>(
    incoming: &BTreeMap<String, T>,
    matched: &BTreeMap<String, T>,
) -> (Vec<String>, Vec<String>, Vec<ValueChange<T>>) {
    let added = incoming
        .keys()
        .filter(|k| !matched.contains_key(*k))
        .cloned()
        .collect();
    let removed = matched
        .keys()
        .filter(|k| !incoming.contains_key(*k))
        .cloned()
        .collect();
    let changed = incoming
        .iter()
        .filter_map(|(k, v)| {
            matched
                .get(k)
                .filter(|m| *m != v)
                .map(|m| ValueChange {
                    name: k.clone(),
                    incoming: v.clone(),
                    matched: m.clone(),
                })
        })
        .collect();
    (added, removed, changed)
}

fn query_diff(incoming: QueryParams, matched: QueryParams) -> QueryDiff {
    let (added_params, removed_params, changed_params) = key_changes(&incoming, &matched);
    QueryDiff {
        incoming,
        matched,
        added_params,
        removed_params,
        changed_params,
    }
}

fn header_diff(request: &IncomingRequest, capture: &Capture) -> HeaderDiff {
    let filter = |headers: &Headers| -> BTreeMap<String, String> {
        headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .filter(|(k, _)| DIFF_HEADERS.contains(&k.as_str()))
            .collect()
    };
    let incoming = filter(&request.headers);
    let matched = filter(&capture.req_headers);
    let (added_headers, removed_headers, changed_headers) = key_changes(&incoming, &matched);

    HeaderDiff {
        incoming,
        matched,
        added_headers,
        removed_headers,
        changed_headers,
    }
}

fn body_diff(incoming: &str, matched: &str) -> BodyDiff {
    let mut diff = BodyDiff {
        incoming: truncate(incoming, BODY_PREVIEW).to_string(),
        matched: truncate(matched, BODY_PREVIEW).to_string(),
        differs: incoming != matched,
        added_keys: None,
        removed_keys: None,
        changed_keys: None,
        line_diff: None,
    };
    if !diff.differs {
        return diff;
    }

    let parse = |text: &str| -> Result<Value, serde_json::Error> {
        if text.is_empty() {
            Ok(Value::Object(Default::default()))
        } else {
            serde_json::from_str(text)
        }
    };

    match (parse(incoming), parse(matched)) {
        (Ok(Value::Object(a)), Ok(Value::Object(b))) => {
            let a: BTreeMap<String, Value> = a.into_iter().collect();
            let b: BTreeMap<String, Value> = b.into_iter().collect();
            let (added, removed, changed) = key_changes(&a, &b);
            diff.added_keys = Some(added);
            diff.removed_keys = Some(removed);
            diff.changed_keys = Some(changed);
        }
        (Ok(_), Ok(_)) => {}
        _ if !incoming.is_empty() && !matched.is_empty() => {
            let text_diff = TextDiff::from_lines(matched, incoming);
            let unified = text_diff
                .unified_diff()
                .header("matched", "incoming")
                .to_string();
            diff.line_diff = Some(
                unified
                    .lines()
                    .take(MAX_LINE_DIFF)
                    .map(str::to_string)
                    .collect(),
            );
        }
        _ => {}
    }
    diff
}
