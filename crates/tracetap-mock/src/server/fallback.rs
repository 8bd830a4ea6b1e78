//! Diagnostic body for requests that matched no capture.

use crate::config::MatchingStrategy;
use crate::matching::id::url_path;
use crate::matching::{is_likely_id, CaptureIndex, IncomingRequest};
use serde::Serialize;
use std::collections::BTreeSet;

const SCAN_LIMIT: usize = 50;
const CLOSEST_LIMIT: usize = 3;

#[derive(Debug, Clone, Serialize)]
pub struct ClosestMatch {
    pub url: String,
    pub score: f64,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FallbackRequest {
    pub method: String,
    pub url: String,
    pub path: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct FallbackDebug {
    pub total_captures: usize,
    pub captures_with_method: usize,
    pub matching_strategy: MatchingStrategy,
    pub min_score_threshold: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct FallbackBody {
    pub error: &'static str,
    pub request: FallbackRequest,
    pub debug: FallbackDebug,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub closest_matches: Vec<ClosestMatch>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub suggestions: Vec<String>,
}

pub struct FallbackContext<'a> {
    pub index: &'a CaptureIndex,
    pub strategy: MatchingStrategy,
    pub min_score: f64,
    pub ai_enabled: bool,
}

impl FallbackBody {
    pub fn build(request: &IncomingRequest, ctx: &FallbackContext<'_>) -> Self {
        let path = url_path(&request.url);
        let parts = segments(path);
        let same_method = ctx.index.with_method(&request.method);

        let mut closest: Vec<ClosestMatch> = same_method
            .iter()
            .take(SCAN_LIMIT)
            .map(|candidate| {
                let cap_path = url_path(&candidate.capture.url);
                let score = segment_similarity(&parts, &segments(cap_path));
                let reason = if score < 0.3 {
                    format!("Path structure differs ({} vs {})", path, cap_path)
                } else if score < 0.7 {
                    format!("Path partially matches (score {:.2})", score)
                } else {
                    format!(
                        "Path similar but score {:.2} below threshold {:.2}",
                        score, ctx.min_score
                    )
                };
                ClosestMatch {
                    url: candidate.capture.url.clone(),
                    score,
                    reason,
                }
            })
            .collect();
        closest.sort_by(|a, b| b.score.total_cmp(&a.score));
        closest.truncate(CLOSEST_LIMIT);

        let suggestions = suggestions(request, path, ctx, same_method.len(), &closest);

        Self {
            error: "No matching request found in captures",
            request: FallbackRequest {
                method: request.method.to_uppercase(),
                url: request.url.clone(),
                path: path.to_string(),
            },
            debug: FallbackDebug {
                total_captures: ctx.index.len(),
                captures_with_method: same_method.len(),
                matching_strategy: ctx.strategy,
                min_score_threshold: ctx.min_score,
            },
            closest_matches: closest,
            suggestions,
        }
    }
}

fn segments(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

/// Share of aligned segments that are equal or both id-like, over the longer
/// path.
fn segment_similarity(incoming: &[&str], candidate: &[&str]) -> f64 {
    if incoming.is_empty() || candidate.is_empty() {
        return 0.0;
    }
    let shared = incoming
        .iter()
        .zip(candidate)
        .filter(|(a, b)| a == b || (is_likely_id(a) && is_likely_id(b)))
        .count();
    shared as f64 / incoming.len().max(candidate.len()) as f64
}

fn suggestions(
    request: &IncomingRequest,
    path: &str,
    ctx: &FallbackContext<'_>,
    captures_with_method: usize,
    closest: &[ClosestMatch],
) -> Vec<String> {
    if ctx.index.is_empty() {
        return vec!["No captures loaded - check your capture file path".to_string()];
    }
    if captures_with_method == 0 {
        let methods: BTreeSet<&str> = ctx
            .index
            .entries()
            .iter()
            .map(|c| c.method.as_str())
            .collect();
        return vec![format!(
            "No captures with method {}. Available methods: {}",
            request.method.to_uppercase(),
            methods.into_iter().collect::<Vec<_>>().join(", ")
        )];
    }

    let mut out = Vec::new();
    if let Some(best) = closest.first().filter(|c| c.score > 0.6) {
        out.push(format!(
            "Close match found (score {:.2}). Try lowering min_score threshold or use --strategy fuzzy",
            best.score
        ));
    }
    match ctx.strategy {
        MatchingStrategy::Exact => out.push(
            "Using 'exact' matching - try --strategy fuzzy for flexible ID matching".to_string(),
        ),
        MatchingStrategy::Fuzzy if !ctx.ai_enabled => {
            out.push("Try --strategy semantic --ai for AI-powered intent matching".to_string())
        }
        _ => {}
    }
    if path.chars().any(|c| c.is_ascii_digit()) {
        out.push(
            "Path contains IDs/numbers - fuzzy/semantic matching works better with dynamic IDs"
                .to_string(),
        );
    }
    if out.is_empty() {
        out.push("Check if request URL, method, and parameters match captured traffic".to_string());
        out.push("Enable --record to capture this request for future matching".to_string());
    }
    out
}
