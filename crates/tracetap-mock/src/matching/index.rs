//! Capture index keyed by `(METHOD, exact path)`.
//!
//! The index only narrows candidates. Captures whose ids differ by value land
//! under different keys, so callers fall back to the method-wide list when a
//! lookup comes back empty.

use super::id::{parse_query, split_url, QueryParams};
use super::pattern::PathPattern;
use crate::capture::Capture;
use std::collections::HashMap;
use std::sync::Arc;

/// A capture with its URL pre-parsed for scoring.
#[derive(Debug, Clone)]
pub struct IndexedCapture {
    /// Position in the original corpus
    pub position: usize,
    pub capture: Arc<Capture>,
    pub method: String,
    pub path: String,
    pub query: QueryParams,
    pub pattern: PathPattern,
}

impl IndexedCapture {
    fn new(position: usize, capture: Arc<Capture>) -> Self {
        let (path, query) = split_url(&capture.url);
        let path = path.to_string();
        let query = parse_query(query);
        Self {
            position,
            method: capture.method.to_uppercase(),
            pattern: PathPattern::compile(&path),
            path,
            query,
            capture,
        }
    }
}

/// Read-only after construction; safe to share across request handlers.
#[derive(Debug, Default)]
pub struct CaptureIndex {
    entries: Vec<IndexedCapture>,
    by_key: HashMap<(String, String), Vec<usize>>,
    by_method: HashMap<String, Vec<usize>>,
}

impl CaptureIndex {
    pub fn build(captures: Vec<Capture>) -> Self {
        let entries: Vec<IndexedCapture> = captures
            .into_iter()
            .enumerate()
            .map(|(position, capture)| IndexedCapture::new(position, Arc::new(capture)))
            .collect();

        let mut by_key: HashMap<(String, String), Vec<usize>> = HashMap::new();
        let mut by_method: HashMap<String, Vec<usize>> = HashMap::new();
        for entry in &entries {
            by_key
                .entry((entry.method.clone(), entry.path.clone()))
                .or_default()
                .push(entry.position);
            by_method
                .entry(entry.method.clone())
                .or_default()
                .push(entry.position);
        }

        Self {
            entries,
            by_key,
            by_method,
        }
    }

    /// Captures sharing method and exact path, in corpus order.
    pub fn lookup(&self, method: &str, path: &str) -> Vec<&IndexedCapture> {
        self.resolve(self.by_key.get(&(method.to_uppercase(), path.to_string())))
    }

    /// Captures sharing the method, in corpus order.
    pub fn with_method(&self, method: &str) -> Vec<&IndexedCapture> {
        self.resolve(self.by_method.get(&method.to_uppercase()))
    }

    /// Index lookup, widened to the method when the exact key is unknown.
    pub fn candidates(&self, method: &str, path: &str) -> Vec<&IndexedCapture> {
        let exact = self.lookup(method, path);
        if exact.is_empty() {
            self.with_method(method)
        } else {
            exact
        }
    }

    pub fn entries(&self) -> &[IndexedCapture] {
        &self.entries
    }

    pub fn get(&self, position: usize) -> Option<&IndexedCapture> {
        self.entries.get(position)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn resolve(&self, positions: Option<&Vec<usize>>) -> Vec<&IndexedCapture> {
        positions
            .map(|positions| positions.iter().map(|&p| &self.entries[p]).collect())
            .unwrap_or_default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Capture> {
        vec![
            Capture::new("GET", "https://api.x/users/1"),
            Capture::new("get", "https://api.x/users/2"),
            Capture::new("GET", "https://api.x/users/1?verbose=true"),
            Capture::new("POST", "https://api.x/users"),
        ]
    }

    #[test]
    fn test_lookup_groups_by_method_and_path() {
        let index = CaptureIndex::build(corpus());
        let hits = index.lookup("get", "/users/1");
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].position, 0);
        assert_eq!(hits[1].position, 2);
        assert!(hits[1].query.contains_key("verbose"));
    }

    #[test]
    fn test_lookup_miss_is_empty() {
        let index = CaptureIndex::build(corpus());
        assert!(index.lookup("GET", "/users/3").is_empty());
        assert!(index.lookup("DELETE", "/users/1").is_empty());
    }

    #[test]
    fn test_candidates_fall_back_to_method() {
        let index = CaptureIndex::build(corpus());
        let candidates = index.candidates("GET", "/users/999");
        let positions: Vec<usize> = candidates.iter().map(|c| c.position).collect();
        assert_eq!(positions, vec![0, 1, 2]);
        assert!(index.candidates("PUT", "/users/1").is_empty());
    }

    #[test]
    fn test_empty_index() {
        let index = CaptureIndex::build(Vec::new());
        assert!(index.is_empty());
        assert!(index.candidates("GET", "/").is_empty());
    }
}
