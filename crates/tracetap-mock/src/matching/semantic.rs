//! Prompt construction and reply parsing for the semantic strategy.

use super::index::{CaptureIndex, IndexedCapture};
use super::similarity::path_score;
use super::types::ParsedRequest;
use std::fmt::Write;

/// Request headers shown to the AI delegate (lowercase).
const PROMPT_HEADERS: [&str; 6] = [
    "content-type",
    "authorization",
    "accept",
    "x-api-key",
    "x-auth-token",
    "x-requested-with",
];

const REQUEST_BODY_PREVIEW: usize = 500;
const CAPTURE_BODY_PREVIEW: usize = 200;

/// What the delegate picked.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemanticChoice {
    /// Corpus position of the chosen capture
    Capture(usize),
    /// The delegate found nothing suitable
    NoMatch,
    /// Unparseable reply or an index that was not offered
    Invalid,
}

/// Same-method captures, narrowed to the `limit` closest paths when there are
/// more. With no same-method captures the first `limit` captures are offered.
pub(crate) fn select_candidates<'a>(
    index: &'a CaptureIndex,
    request: &ParsedRequest<'_>,
    limit: usize,
) -> Vec<&'a IndexedCapture> {
    let same_method = index.with_method(&request.method);
    if same_method.is_empty() {
        return index.entries().iter().take(limit).collect();
    }
    if same_method.len() <= limit {
        return same_method;
    }

    let mut scored: Vec<(f64, &IndexedCapture)> = same_method
        .into_iter()
        .map(|c| (path_score(request.path, &c.path), c))
        .collect();
    // Stable sort keeps corpus order among equal scores
    scored.sort_by(|a, b| b.0.total_cmp(&a.0));
    scored.into_iter().take(limit).map(|(_, c)| c).collect()
}

pub(crate) fn build_prompt(request: &ParsedRequest<'_>, candidates: &[&IndexedCapture]) -> String {
    let incoming = request.request;
    let mut prompt = String::new();

    let _ = writeln!(
        prompt,
        "You are matching an incoming HTTP request against previously captured requests."
    );
    let _ = writeln!(prompt, "\nINCOMING REQUEST:");
    let _ = writeln!(prompt, "Method: {}", request.method);
    let _ = writeln!(prompt, "URL: {}", incoming.url);

    let mut headers: Vec<(String, &str)> = incoming
        .headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
        .filter(|(k, _)| PROMPT_HEADERS.contains(&k.as_str()))
        .collect();
    headers.sort();
    if !headers.is_empty() {
        let _ = writeln!(prompt, "Headers:");
        for (name, value) in headers {
            let _ = writeln!(prompt, "  {name}: {value}");
        }
    }
    if !incoming.body.is_empty() {
        let body = String::from_utf8_lossy(&incoming.body);
        let _ = writeln!(prompt, "Body: {}", truncate(&body, REQUEST_BODY_PREVIEW));
    }

    let _ = writeln!(prompt, "\nCAPTURED REQUESTS:");
    for candidate in candidates {
        let capture = &candidate.capture;
        let _ = writeln!(
            prompt,
            "[{}] {} {}",
            candidate.position, capture.method, capture.url
        );
        if !capture.req_body.is_empty() {
            let _ = writeln!(
                prompt,
                "    Body: {}",
                truncate(&capture.req_body, CAPTURE_BODY_PREVIEW)
            );
        }
    }

    let _ = writeln!(
        prompt,
        "\nReply with only the number in brackets of the captured request that best \
         represents the incoming request, or NONE if none of them fit."
    );
    prompt
}

/// Interpret the delegate's reply against the offered candidates.
pub fn parse_choice(reply: &str, offered: &[usize]) -> SemanticChoice {
    let reply = reply.trim();
    if reply.eq_ignore_ascii_case("none") {
        return SemanticChoice::NoMatch;
    }

    let digits = reply.trim_matches(|c: char| c == '[' || c == ']' || c == '.');
    match digits.parse::<usize>() {
        Ok(position) if offered.contains(&position) => SemanticChoice::Capture(position),
        _ => SemanticChoice::Invalid,
    }
}

/// Prefix of at most `max_chars` characters.
pub(crate) fn truncate(text: &str, max_chars: usize) -> &str {
    match text.char_indices().nth(max_chars) {
        Some((end, _)) => &text[..end],
        None => text,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Capture;
    use crate::matching::types::IncomingRequest;

    #[test]
    fn test_parse_choice() {
        let offered = [0, 3, 7];
        assert_eq!(parse_choice(" 3\n", &offered), SemanticChoice::Capture(3));
        assert_eq!(parse_choice("[7]", &offered), SemanticChoice::Capture(7));
        assert_eq!(parse_choice("NONE", &offered), SemanticChoice::NoMatch);
        assert_eq!(parse_choice("none", &offered), SemanticChoice::NoMatch);
        assert_eq!(parse_choice("5", &offered), SemanticChoice::Invalid);
        assert_eq!(parse_choice("the third", &offered), SemanticChoice::Invalid);
    }

    #[test]
    fn test_select_candidates_limits_by_path_similarity() {
        let index = CaptureIndex::build(vec![
            Capture::new("GET", "https://api.x/orders/1"),
            Capture::new("GET", "https://api.x/users/1"),
            Capture::new("GET", "https://api.x/users/2"),
            Capture::new("POST", "https://api.x/users"),
        ]);
        let request = IncomingRequest::new("GET", "https://api.x/users/9");
        let parsed = request.parsed();

        let picked: Vec<usize> = select_candidates(&index, &parsed, 2)
            .iter()
            .map(|c| c.position)
            .collect();
        assert_eq!(picked, vec![1, 2]);
    }

    #[test]
    fn test_select_candidates_without_same_method() {
        let index = CaptureIndex::build(vec![
            Capture::new("GET", "/a"),
            Capture::new("GET", "/b"),
        ]);
        let request = IncomingRequest::new("DELETE", "/a");
        let parsed = request.parsed();
        assert_eq!(select_candidates(&index, &parsed, 1).len(), 1);
    }

    #[test]
    fn test_prompt_lists_candidates_and_filters_headers() {
        let index = CaptureIndex::build(vec![
            Capture::new("POST", "https://api.x/login").with_req_body(r#"{"user":"a"}"#)
        ]);
        let request = IncomingRequest::new("POST", "https://api.x/login")
            .with_header("Content-Type", "application/json")
            .with_header("Cookie", "secret")
            .with_body(r#"{"user":"b"}"#);
        let parsed = request.parsed();
        let candidates = select_candidates(&index, &parsed, 10);
        let prompt = build_prompt(&parsed, &candidates);

        assert!(prompt.contains("[0] POST https://api.x/login"));
        assert!(prompt.contains("content-type: application/json"));
        assert!(!prompt.contains("secret"));
        assert!(prompt.contains(r#"Body: {"user":"b"}"#));
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        assert_eq!(truncate("héllo", 2), "hé");
        assert_eq!(truncate("abc", 10), "abc");
    }
}
