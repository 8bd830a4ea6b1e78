//! Capture paths as wildcard patterns.
//!
//! - `*` matches exactly one non-empty segment
//! - `{name}` matches exactly one non-empty segment
//! - `**` matches any remainder, slashes included
//!
//! Everything else is literal. Patterns are anchored at both ends.

use regex::Regex;
use tracing::warn;

#[derive(Debug, Clone)]
pub enum PathPattern {
    /// No wildcards; compared by string equality
    Literal(String),
    Wildcard { source: String, regex: Regex },
}

impl PathPattern {
    pub fn compile(path: &str) -> Self {
        if !has_wildcards(path) {
            return PathPattern::Literal(path.to_string());
        }

        match Regex::new(&pattern_to_regex(path)) {
            Ok(regex) => PathPattern::Wildcard {
                source: path.to_string(),
                regex,
            },
            Err(e) => {
                warn!("Treating capture path '{}' as literal: {}", path, e);
                PathPattern::Literal(path.to_string())
            }
        }
    }

    pub fn matches(&self, path: &str) -> bool {
        match self {
            PathPattern::Literal(literal) => literal == path,
            PathPattern::Wildcard { regex, .. } => regex.is_match(path),
        }
    }

    pub fn source(&self) -> &str {
        match self {
            PathPattern::Literal(literal) => literal,
            PathPattern::Wildcard { source, .. } => source,
        }
    }
}

fn has_wildcards(path: &str) -> bool {
    path.contains('*') || (path.contains('{') && path.contains('}'))
}

fn pattern_to_regex(pattern: &str) -> String {
    let mut regex = String::from("^");
    let mut rest = pattern;

    while !rest.is_empty() {
        if let Some(after) = rest.strip_prefix("**") {
            regex.push_str(".*");
            rest = after;
        } else if let Some(after) = rest.strip_prefix('*') {
            regex.push_str("[^/]+");
            rest = after;
        } else if let Some(close) = rest.strip_prefix('{').and_then(placeholder_end) {
            regex.push_str("[^/]+");
            rest = &rest[close + 2..];
        } else {
            let next = rest
                .char_indices()
                .skip(1)
                .find(|(_, c)| *c == '*' || *c == '{')
                .map_or(rest.len(), |(i, _)| i);
            regex.push_str(&regex::escape(&rest[..next]));
            rest = &rest[next..];
        }
    }

    regex.push('$');
    regex
}

/// Offset of the `}` closing a placeholder; a placeholder never spans a `/`.
fn placeholder_end(after_brace: &str) -> Option<usize> {
    after_brace
        .find(['}', '/'])
        .filter(|&i| after_brace.as_bytes()[i] == b'}')
}
