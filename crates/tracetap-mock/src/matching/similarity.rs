//! Similarity scorers.
//!
//! Each scorer compares two inputs of the same kind and returns a confidence
//! in `[0, 1]`. All of them are symmetric in their arguments.

use super::id::{is_likely_id, QueryParams};
use crate::capture::Headers;
use serde_json::Value;
use similar::TextDiff;
use std::collections::{HashMap, HashSet};

/// Headers that participate in header scoring (lowercase).
pub const SCORED_HEADERS: [&str; 5] = [
    "content-type",
    "accept",
    "authorization",
    "x-api-key",
    "user-agent",
];

/// Character-level similarity ratio, `2 * matches / (len(a) + len(b))`.
///
/// Inputs are put in a canonical order before diffing so the result does not
/// depend on argument order.
pub fn sequence_ratio(a: &str, b: &str) -> f64 {
    if a == b {
        return 1.0;
    }
    let (first, second) = if a <= b { (a, b) } else { (b, a) };
    f64::from(TextDiff::from_chars(first, second).ratio())
}

/// Segment-wise path similarity. Identical segments earn 1.0, two differing
/// identifier-like segments earn 0.8.
pub fn path_score(path1: &str, path2: &str) -> f64 {
    if path1 == path2 {
        return 1.0;
    }

    let path1 = path1.trim_end_matches('/');
    let path2 = path2.trim_end_matches('/');
    if path1 == path2 {
        return 1.0;
    }

    let segments1: Vec<&str> = path1.split('/').filter(|s| !s.is_empty()).collect();
    let segments2: Vec<&str> = path2.split('/').filter(|s| !s.is_empty()).collect();

    if segments1.len() != segments2.len() {
        return sequence_ratio(path1, path2) * 0.5;
    }
    if segments1.is_empty() {
        return 1.0;
    }

    let awarded: f64 = segments1
        .iter()
        .zip(&segments2)
        .map(|(s1, s2)| {
            if s1 == s2 {
                1.0
            } else if is_likely_id(s1) && is_likely_id(s2) {
                0.8
            } else {
                0.0
            }
        })
        .sum();

    awarded / segments1.len() as f64
}

/// Key overlap and exact value-list agreement, weighted equally.
pub fn query_score(query1: &QueryParams, query2: &QueryParams) -> f64 {
    match (query1.is_empty(), query2.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }

    let shared: Vec<&String> = query1.keys().filter(|k| query2.contains_key(*k)).collect();
    let union = query1.len() + query2.len() - shared.len();
    let key_score = shared.len() as f64 / union as f64;

    let value_score = if shared.is_empty() {
        0.0
    } else {
        let agreeing = shared.iter().filter(|k| query1[**k] == query2[**k]).count();
        agreeing as f64 / shared.len() as f64
    };

    key_score * 0.5 + value_score * 0.5
}

/// Similarity over [`SCORED_HEADERS`]; header names compare case-insensitively.
pub fn header_score(headers1: &Headers, headers2: &Headers) -> f64 {
    let lower = |headers: &Headers| -> HashMap<String, String> {
        headers
            .iter()
            .map(|(k, v)| (k.to_ascii_lowercase(), v.clone()))
            .collect()
    };
    let h1 = lower(headers1);
    let h2 = lower(headers2);

    let mut total = 0u32;
    let mut matches = 0.0;

    for name in SCORED_HEADERS {
        match (h1.get(name), h2.get(name)) {
            (None, None) => continue,
            (Some(v1), Some(v2)) => {
                total += 1;
                matches += if v1 == v2 {
                    1.0
                } else {
                    sequence_ratio(v1, v2) * 0.5
                };
            }
            _ => total += 1,
        }
    }

    if total == 0 {
        1.0
    } else {
        matches / f64::from(total)
    }
}

/// Compare a raw incoming body with a captured body. JSON on both sides is
/// compared structurally, anything else by character ratio.
pub fn body_score(body1: &[u8], body2: &str) -> f64 {
    match (body1.is_empty(), body2.is_empty()) {
        (true, true) => return 1.0,
        (true, false) | (false, true) => return 0.0,
        _ => {}
    }

    let text1 = String::from_utf8_lossy(body1);
    match (
        serde_json::from_slice::<Value>(body1),
        serde_json::from_str::<Value>(body2),
    ) {
        (Ok(json1), Ok(json2)) => json_similarity(&json1, &json2),
        _ => sequence_ratio(&text1, body2),
    }
}

/// Recursive structural similarity of two JSON values.
pub fn json_similarity(a: &Value, b: &Value) -> f64 {
    if a == b {
        return 1.0;
    }

    match (a, b) {
        (Value::Object(map1), Value::Object(map2)) => {
            let keys1: HashSet<&String> = map1.keys().collect();
            let keys2: HashSet<&String> = map2.keys().collect();
            let shared: Vec<&&String> = keys1.intersection(&keys2).collect();
            let union = keys1.union(&keys2).count();

            let key_score = if union == 0 {
                1.0
            } else {
                shared.len() as f64 / union as f64
            };

            let value_score = if shared.is_empty() {
                0.0
            } else {
                shared
                    .iter()
                    .map(|k| json_similarity(&map1[k.as_str()], &map2[k.as_str()]))
                    .sum::<f64>()
                    / shared.len() as f64
            };

            key_score * 0.5 + value_score * 0.5
        }
        (Value::Array(items1), Value::Array(items2)) => {
            if items1.len() != items2.len() {
                return 0.5;
            }
            if items1.is_empty() {
                return 1.0;
            }
            items1
                .iter()
                .zip(items2)
                .map(|(x, y)| json_similarity(x, y))
                .sum::<f64>()
                / items1.len() as f64
        }
        // Same type but unequal scalars, or a type mismatch
        _ => 0.0,
    }
}
