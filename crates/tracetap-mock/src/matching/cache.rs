//! Bounded FIFO cache of match results.
//!
//! Keys are request fingerprints. Eviction is strictly by insertion order,
//! reads do not refresh an entry. Entries and statistics share one lock, and
//! the lock is never held while a match is being computed.

use super::types::{IncomingRequest, MatchResult};
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::hash_map::DefaultHasher;
use std::collections::{HashMap, VecDeque};
use std::hash::{Hash, Hasher};
use tracing::{debug, trace};

/// Headers folded into the fingerprint (lowercase).
const FINGERPRINT_HEADERS: [&str; 3] = ["content-type", "authorization", "accept"];

/// Deterministic cache key: `METHOD::url[::k:v|k:v][::bodyhash8]`.
pub fn fingerprint(request: &IncomingRequest) -> String {
    let mut key = format!("{}::{}", request.method.to_uppercase(), request.url);

    let mut headers: Vec<(String, &str)> = request
        .headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.as_str()))
        .filter(|(k, _)| FINGERPRINT_HEADERS.contains(&k.as_str()))
        .collect();
    if !headers.is_empty() {
        headers.sort();
        let joined = headers
            .iter()
            .map(|(k, v)| format!("{k}:{v}"))
            .collect::<Vec<_>>()
            .join("|");
        key.push_str("::");
        key.push_str(&joined);
    }

    if !request.body.is_empty() {
        let mut hasher = DefaultHasher::new();
        request.body.hash(&mut hasher);
        let digest = format!("{:016x}", hasher.finish());
        key.push_str("::");
        key.push_str(&digest[..8]);
    }

    key
}

/// Cache statistics snapshot.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
    pub max_size: usize,
    pub hit_rate: f64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<String, MatchResult>,
    order: VecDeque<String>,
    hits: u64,
    misses: u64,
    /// Bumped by every `clear`.
    generation: u64,
}

#[derive(Debug)]
pub struct MatchCache {
    max_size: usize,
    state: Mutex<CacheState>,
}

impl MatchCache {
    pub fn new(max_size: usize) -> Self {
        debug!("Creating match cache: max_size={}", max_size);
        Self {
            max_size: max_size.max(1),
            state: Mutex::new(CacheState::default()),
        }
    }

    /// Look up a fingerprint, counting a hit or a miss.
    pub fn get(&self, key: &str) -> Option<MatchResult> {
        let mut state = self.state.lock();
        match state.entries.get(key).cloned() {
            Some(result) => {
                state.hits += 1;
                trace!("Match cache hit: {}", key);
                Some(result)
            }
            None => {
                state.misses += 1;
                None
            }
        }
    }

    /// Insert unless another caller already stored this key, and return the
    /// stored value. Concurrent misses for one fingerprint therefore converge
    /// on a single result.
    pub fn insert(&self, key: String, result: MatchResult) -> MatchResult {
        let generation = self.generation();
        self.insert_at(generation, key, result)
    }

    /// Current generation. Read it before computing a result and pass it to
    /// `insert_at`.
    pub fn generation(&self) -> u64 {
        self.state.lock().generation
    }

    /// Like `insert`, but a result computed before the latest `clear` is
    /// returned to the caller without being stored.
    pub fn insert_at(&self, generation: u64, key: String, result: MatchResult) -> MatchResult {
        let mut state = self.state.lock();
        if state.generation != generation {
            trace!("Discarding match computed before cache clear: {}", key);
            return result;
        }
        if let Some(existing) = state.entries.get(&key) {
            return existing.clone();
        }

        while state.entries.len() >= self.max_size {
            let Some(oldest) = state.order.pop_front() else {
                break;
            };
            state.entries.remove(&oldest);
            trace!("Evicted oldest match cache entry: {}", oldest);
        }

        state.order.push_back(key.clone());
        state.entries.insert(key, result.clone());
        result
    }

    pub fn contains(&self, key: &str) -> bool {
        self.state.lock().entries.contains_key(key)
    }

    /// Drop all entries and reset statistics.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        let generation = state.generation + 1;
        *state = CacheState {
            generation,
            ..CacheState::default()
        };
        debug!("Match cache cleared");
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let state = self.state.lock();
        let lookups = state.hits + state.misses;
        CacheStats {
            hits: state.hits,
            misses: state.misses,
            size: state.entries.len(),
            max_size: self.max_size,
            hit_rate: if lookups == 0 {
                0.0
            } else {
                state.hits as f64 / lookups as f64
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    fn result(reason: &str) -> MatchResult {
        MatchResult::not_found(reason)
    }

    #[test]
    fn test_fingerprint_shape() {
        let plain = IncomingRequest::new("get", "https://api.x/users/1");
        assert_eq!(fingerprint(&plain), "GET::https://api.x/users/1");

        let with_headers = IncomingRequest::new("POST", "https://api.x/users")
            .with_header("Content-Type", "application/json")
            .with_header("Accept", "*/*")
            .with_header("X-Request-Id", "abc")
            .with_body(r#"{"name":"a"}"#);
        let key = fingerprint(&with_headers);
        assert!(key.starts_with(
            "POST::https://api.x/users::accept:*/*|content-type:application/json::"
        ));
        assert_eq!(key.rsplit("::").next().unwrap().len(), 8);
        assert!(!key.contains("x-request-id"));
    }

    #[test]
    fn test_fingerprint_is_deterministic() {
        let a = IncomingRequest::new("PUT", "/a").with_body("payload");
        let b = IncomingRequest::new("PUT", "/a").with_body("payload");
        let c = IncomingRequest::new("PUT", "/a").with_body("other");
        assert_eq!(fingerprint(&a), fingerprint(&b));
        assert_ne!(fingerprint(&a), fingerprint(&c));
    }

    #[test]
    fn test_hit_and_miss_accounting() {
        let cache = MatchCache::new(10);
        assert!(cache.get("k").is_none());
        cache.insert("k".to_string(), result("r"));
        assert_eq!(cache.get("k"), Some(result("r")));

        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.size, 1);
        assert_eq!(stats.hit_rate, 0.5);
    }

    #[test]
    fn test_fifo_eviction_drops_first_inserted() {
        let n = 3;
        let cache = MatchCache::new(n);
        for i in 0..=n {
            cache.insert(format!("k{i}"), result(&format!("r{i}")));
        }

        assert_eq!(cache.len(), n);
        assert!(!cache.contains("k0"));
        for i in 1..=n {
            assert!(cache.contains(&format!("k{i}")));
        }
    }

    #[test]
    fn test_reads_do_not_refresh_entries() {
        let cache = MatchCache::new(2);
        cache.insert("a".to_string(), result("a"));
        cache.insert("b".to_string(), result("b"));
        cache.get("a");
        cache.insert("c".to_string(), result("c"));
        assert!(!cache.contains("a"));
        assert!(cache.contains("b"));
    }

    #[test]
    fn test_insert_keeps_first_value() {
        let cache = MatchCache::new(4);
        let first = cache.insert("k".to_string(), result("first"));
        let second = cache.insert("k".to_string(), result("second"));
        assert_eq!(first, second);
        assert_eq!(second.reason, "first");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_clear_resets_stats() {
        let cache = MatchCache::new(4);
        cache.insert("k".to_string(), result("r"));
        cache.get("k");
        cache.clear();
        assert!(cache.is_empty());
        assert_eq!(cache.stats().hits, 0);
        assert_eq!(cache.stats().max_size, 4);
    }

    #[test]
    fn test_insert_after_clear_is_discarded() {
        let cache = MatchCache::new(4);
        let generation = cache.generation();
        cache.clear();

        let returned = cache.insert_at(generation, "k".to_string(), result("stale"));
        assert_eq!(returned.reason, "stale");
        assert!(cache.is_empty());

        cache.insert_at(cache.generation(), "k".to_string(), result("fresh"));
        assert_eq!(cache.get("k").unwrap().reason, "fresh");
    }

    #[test]
    fn test_concurrent_inserts_converge() {
        let cache = Arc::new(MatchCache::new(100));
        let handles: Vec<_> = (0..8)
            .map(|i| {
                let cache = Arc::clone(&cache);
                std::thread::spawn(move || cache.insert("same".to_string(), result(&i.to_string())))
            })
            .collect();
        let stored: Vec<MatchResult> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(cache.len(), 1);
        assert!(stored.windows(2).all(|w| w[0] == w[1]));
    }
}
