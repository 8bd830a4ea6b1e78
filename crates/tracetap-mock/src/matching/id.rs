//! Dynamic identifier detection and URL path helpers.
//!
//! `is_likely_id` is intentionally permissive: a false positive only nudges a
//! similarity score up, it never changes which strategy runs.

use regex::Regex;
use std::collections::BTreeMap;
use std::sync::OnceLock;

static UUID_REGEX: OnceLock<Regex> = OnceLock::new();
static NUMERIC_REGEX: OnceLock<Regex> = OnceLock::new();
static OBJECT_ID_REGEX: OnceLock<Regex> = OnceLock::new();
static ULID_REGEX: OnceLock<Regex> = OnceLock::new();
static BASE64_REGEX: OnceLock<Regex> = OnceLock::new();
static ALNUM_REGEX: OnceLock<Regex> = OnceLock::new();

fn uuid_regex() -> &'static Regex {
    UUID_REGEX.get_or_init(|| {
        Regex::new(r"(?i)^[0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12}$").unwrap()
    })
}

fn numeric_regex() -> &'static Regex {
    NUMERIC_REGEX.get_or_init(|| Regex::new(r"^\d+$").unwrap())
}

/// Placeholder used by [`normalize_path`] for dynamic segments.
pub const ID_PLACEHOLDER: &str = "{id}";

/// Returns true when the segment looks like a generated identifier.
pub fn is_likely_id(segment: &str) -> bool {
    if segment.is_empty() {
        return false;
    }

    uuid_regex().is_match(segment)
        || numeric_regex().is_match(segment)
        || OBJECT_ID_REGEX
            .get_or_init(|| Regex::new(r"^[0-9a-fA-F]{24}$").unwrap())
            .is_match(segment)
        || ULID_REGEX
            .get_or_init(|| Regex::new(r"(?i)^[0-9A-HJKMNP-TV-Z]{26}$").unwrap())
            .is_match(segment)
        || BASE64_REGEX
            .get_or_init(|| Regex::new(r"^[A-Za-z0-9+/=_-]{16,}$").unwrap())
            .is_match(segment)
        || ALNUM_REGEX
            .get_or_init(|| Regex::new(r"^[A-Za-z0-9]{6,32}$").unwrap())
            .is_match(segment)
}

/// Numeric segments only.
pub fn is_numeric_id(segment: &str) -> bool {
    numeric_regex().is_match(segment)
}

/// Canonical 8-4-4-4-12 UUIDs only.
pub fn is_uuid(segment: &str) -> bool {
    uuid_regex().is_match(segment)
}

/// Split a URL (absolute or origin-form) into its path and raw query string.
/// The fragment is dropped. An authority without a path yields an empty path.
pub fn split_url(url: &str) -> (&str, &str) {
    let url = url.split_once('#').map_or(url, |(before, _)| before);
    let (before_query, query) = url.split_once('?').unwrap_or((url, ""));

    let path = match before_query.find("://") {
        Some(scheme_end) => {
            let rest = &before_query[scheme_end + 3..];
            rest.find('/').map_or("", |slash| &rest[slash..])
        }
        None => before_query,
    };

    (path, query)
}

/// Path component of a URL, query and fragment removed.
pub fn url_path(url: &str) -> &str {
    split_url(url).0
}

/// Path plus `?query` when a query is present.
pub fn path_and_query(url: &str) -> String {
    let (path, query) = split_url(url);
    let path = if path.is_empty() { "/" } else { path };
    if query.is_empty() {
        path.to_string()
    } else {
        format!("{path}?{query}")
    }
}

/// Multi-valued query parameters, keys in sorted order.
pub type QueryParams = BTreeMap<String, Vec<String>>;

/// Parse a raw query string. Pairs without `=` and blank values are skipped,
/// `+` decodes to a space and percent escapes are decoded.
pub fn parse_query(query: &str) -> QueryParams {
    let mut params = QueryParams::new();
    for pair in query.split('&') {
        let Some((key, value)) = pair.split_once('=') else {
            continue;
        };
        if key.is_empty() || value.is_empty() {
            continue;
        }
        params
            .entry(decode_component(key))
            .or_default()
            .push(decode_component(value));
    }
    params
}

fn decode_component(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => spaced,
    }
}

/// Replace dynamic identifier segments with [`ID_PLACEHOLDER`].
///
/// `/users/123/orders?page=2` becomes `/users/{id}/orders`.
pub fn normalize_path(url: &str) -> String {
    url_path(url)
        .split('/')
        .map(|segment| {
            if is_likely_id(segment) {
                ID_PLACEHOLDER
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognized_ids() {
        assert!(is_likely_id("550e8400-e29b-41d4-a716-446655440000"));
        assert!(is_likely_id("550E8400-E29B-41D4-A716-446655440000"));
        assert!(is_likely_id("123"));
        assert!(is_likely_id("507f1f77bcf86cd799439011"));
        assert!(is_likely_id("01ARZ3NDEKTSV4RRFFQ69G5FAV"));
        assert!(is_likely_id("01arz3ndektsv4rrffq69g5fav"));
        assert!(is_likely_id("dGhpcyBpcyBhIHRva2Vu_-=="));
        assert!(is_likely_id("abc123"));
    }

    #[test]
    fn test_rejected_segments() {
        assert!(!is_likely_id(""));
        assert!(!is_likely_id("users"));
        assert!(!is_likely_id("v1"));
        assert!(!is_likely_id("order-items"));
        assert!(!is_likely_id("a.b"));
    }

    #[test]
    fn test_word_segments_of_six_letters_are_ids() {
        // The alphanumeric rule has no digit requirement.
        assert!(is_likely_id("orders"));
    }

    #[test]
    fn test_split_url() {
        assert_eq!(
            split_url("https://api.x/users/1?page=2#top"),
            ("/users/1", "page=2")
        );
        assert_eq!(split_url("https://api.x"), ("", ""));
        assert_eq!(split_url("/search?q=foo"), ("/search", "q=foo"));
        assert_eq!(split_url("/plain"), ("/plain", ""));
    }

    #[test]
    fn test_path_and_query() {
        assert_eq!(path_and_query("http://h:1/a?b=c"), "/a?b=c");
        assert_eq!(path_and_query("http://h:1"), "/");
    }

    #[test]
    fn test_parse_query() {
        let params = parse_query("q=hello+world&tag=a&tag=b&empty=&flag&x=%2Fy");
        assert_eq!(params["q"], vec!["hello world"]);
        assert_eq!(params["tag"], vec!["a", "b"]);
        assert_eq!(params["x"], vec!["/y"]);
        assert!(!params.contains_key("empty"));
        assert!(!params.contains_key("flag"));
        assert!(parse_query("").is_empty());
    }

    #[test]
    fn test_normalize_path() {
        assert_eq!(
            normalize_path("https://api.x/api/v1/users/123?page=2"),
            "/api/v1/users/{id}"
        );
        assert_eq!(
            normalize_path("/items/550e8400-e29b-41d4-a716-446655440000/tags"),
            "/items/{id}/tags"
        );
    }
}
