//! Strategy dispatch over the capture index.

use super::cache::{fingerprint, CacheStats, MatchCache};
use super::index::{CaptureIndex, IndexedCapture};
use super::score::{aggregate, MatchScore, ScoreWeights};
use super::semantic::{self, SemanticChoice};
use super::similarity::{body_score, header_score, path_score, query_score};
use super::types::{IncomingRequest, MatchResult, ParsedRequest};
use crate::ai::{self, AiDelegate};
use crate::capture::Capture;
use crate::config::{validate_min_score, ConfigError, MatchingConfig, MatchingStrategy};
use parking_lot::RwLock;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Fixed score reported by the pattern strategy.
pub const PATTERN_MATCH_SCORE: f64 = 0.9;
/// Fixed score reported for an AI-selected capture.
pub const SEMANTIC_MATCH_SCORE: f64 = 0.95;

/// A match result plus whether it came from the cache.
#[derive(Debug, Clone)]
pub struct MatchLookup {
    pub result: MatchResult,
    pub cache_hit: bool,
}

pub struct RequestMatcher {
    index: CaptureIndex,
    strategy: RwLock<MatchingStrategy>,
    min_score: f64,
    weights: ScoreWeights,
    cache: Option<MatchCache>,
    ai: Option<Arc<dyn AiDelegate>>,
    semantic_candidate_limit: usize,
    ai_timeout: Duration,
}

impl RequestMatcher {
    /// Build the index and validate the configuration up front.
    pub fn new(
        captures: Vec<Capture>,
        config: &MatchingConfig,
        ai: Option<Arc<dyn AiDelegate>>,
    ) -> Result<Self, ConfigError> {
        validate_min_score(config.min_score)?;
        config.weights.validate()?;
        if config.cache_enabled && config.cache_max_size == 0 {
            return Err(ConfigError::InvalidCacheSize);
        }

        let index = CaptureIndex::build(captures);
        debug!(
            "Request matcher ready: {} captures, strategy={}, min_score={}",
            index.len(),
            config.strategy,
            config.min_score
        );

        Ok(Self {
            index,
            strategy: RwLock::new(config.strategy),
            min_score: config.min_score,
            weights: config.weights,
            cache: config
                .cache_enabled
                .then(|| MatchCache::new(config.cache_max_size)),
            ai,
            semantic_candidate_limit: config.semantic_candidate_limit.max(1),
            ai_timeout: Duration::from_millis(config.ai_timeout_ms),
        })
    }

    pub async fn find_match(&self, request: &IncomingRequest) -> MatchResult {
        self.lookup(request).await.result
    }

    /// Consult the cache, then the configured strategy. The cache lock is not
    /// held while a strategy runs. A result computed across a strategy switch
    /// is returned but not cached.
    pub async fn lookup(&self, request: &IncomingRequest) -> MatchLookup {
        let key = self.cache.as_ref().map(|_| fingerprint(request));
        // Read before the strategy so a concurrent switch invalidates this insert.
        let generation = self.cache.as_ref().map_or(0, MatchCache::generation);

        if let (Some(cache), Some(key)) = (&self.cache, &key) {
            if let Some(result) = cache.get(key) {
                return MatchLookup {
                    result,
                    cache_hit: true,
                };
            }
        }

        let result = self.match_uncached(request).await;

        let result = match (&self.cache, key) {
            (Some(cache), Some(key)) => cache.insert_at(generation, key, result),
            _ => result,
        };

        MatchLookup {
            result,
            cache_hit: false,
        }
    }

    async fn match_uncached(&self, request: &IncomingRequest) -> MatchResult {
        let parsed = request.parsed();
        match self.strategy() {
            MatchingStrategy::Exact => self.exact_match(&parsed),
            MatchingStrategy::Fuzzy => self.fuzzy_match(&parsed),
            MatchingStrategy::Pattern => self.pattern_match(&parsed),
            MatchingStrategy::Semantic => self.semantic_match(&parsed).await,
        }
    }

    fn exact_match(&self, request: &ParsedRequest<'_>) -> MatchResult {
        self.index
            .entries()
            .iter()
            .find(|c| c.method == request.method && c.capture.url == request.request.url)
            .map(|c| {
                MatchResult::found(
                    Arc::clone(&c.capture),
                    MatchScore::synthetic(1.0, true),
                    "Exact match",
                )
            })
            .unwrap_or_else(|| MatchResult::not_found("No exact match found"))
    }

    fn fuzzy_match(&self, request: &ParsedRequest<'_>) -> MatchResult {
        let candidates = self.index.candidates(&request.method, request.path);
        if candidates.is_empty() {
            return MatchResult::not_found(format!(
                "No captures found for method {}",
                request.method
            ));
        }

        let mut best: Option<(&IndexedCapture, MatchScore)> = None;
        for candidate in candidates {
            let score = self.score_candidate(request, candidate);
            trace!(
                "Scored {} {}: {:.3}",
                candidate.method,
                candidate.capture.url,
                score.total_score
            );
            if best.map_or(true, |(_, b)| score.total_score > b.total_score) {
                best = Some((candidate, score));
            }
        }

        match best {
            Some((capture, score)) if score.total_score >= self.min_score => MatchResult::found(
                Arc::clone(&capture.capture),
                score,
                format!("Fuzzy match (score: {:.2})", score.total_score),
            ),
            Some((_, score)) => MatchResult::below_threshold(
                score,
                format!(
                    "No match above threshold {} (best: {:.2})",
                    self.min_score, score.total_score
                ),
            ),
            None => MatchResult::not_found("No candidates scored"),
        }
    }

    /// Header and body components only count when the incoming request
    /// carries headers or a body at all.
    fn score_candidate(&self, request: &ParsedRequest<'_>, candidate: &IndexedCapture) -> MatchScore {
        let incoming = request.request;

        let path = path_score(request.path, &candidate.path);
        let query = query_score(&request.query, &candidate.query);
        let headers = if incoming.headers.is_empty() {
            0.0
        } else {
            header_score(&incoming.headers, &candidate.capture.req_headers)
        };
        let body = if incoming.body.is_empty() {
            0.0
        } else {
            body_score(&incoming.body, &candidate.capture.req_body)
        };

        aggregate(path, query, headers, body, &self.weights)
    }

    fn pattern_match(&self, request: &ParsedRequest<'_>) -> MatchResult {
        self.index
            .with_method(&request.method)
            .into_iter()
            .find(|c| c.pattern.matches(request.path))
            .map(|c| {
                MatchResult::found(
                    Arc::clone(&c.capture),
                    MatchScore::synthetic(PATTERN_MATCH_SCORE, true),
                    format!("Pattern match ({})", c.pattern.source()),
                )
            })
            .unwrap_or_else(|| MatchResult::not_found("No pattern match found"))
    }

    async fn semantic_match(&self, request: &ParsedRequest<'_>) -> MatchResult {
        let Some(delegate) = &self.ai else {
            debug!("Semantic matching requested without an AI delegate; using fuzzy");
            return self.fuzzy_match(request);
        };

        let candidates =
            semantic::select_candidates(&self.index, request, self.semantic_candidate_limit);
        if candidates.is_empty() {
            return MatchResult::not_found("No captures available for semantic matching");
        }

        let prompt = semantic::build_prompt(request, &candidates);
        let reply = match ai::with_timeout(self.ai_timeout, delegate.complete(&prompt)).await {
            Ok(reply) => reply,
            Err(e) => {
                warn!("Semantic match failed, falling back to fuzzy: {}", e);
                return self.fuzzy_match(request);
            }
        };

        let offered: Vec<usize> = candidates.iter().map(|c| c.position).collect();
        match semantic::parse_choice(&reply, &offered) {
            SemanticChoice::Capture(position) => match self.index.get(position) {
                Some(chosen) => MatchResult::found(
                    Arc::clone(&chosen.capture),
                    MatchScore::synthetic(SEMANTIC_MATCH_SCORE, chosen.method == request.method),
                    format!("AI semantic match (index {position})"),
                ),
                None => self.fuzzy_match(request),
            },
            SemanticChoice::NoMatch => MatchResult::not_found("AI found no suitable capture"),
            SemanticChoice::Invalid => {
                warn!(
                    "Unusable semantic match reply {:?}, falling back to fuzzy",
                    reply.trim()
                );
                self.fuzzy_match(request)
            }
        }
    }

    pub fn strategy(&self) -> MatchingStrategy {
        *self.strategy.read()
    }

    /// Switch strategy at runtime. Cached results belong to the old strategy
    /// and are dropped.
    pub fn set_strategy(&self, strategy: MatchingStrategy) {
        let mut current = self.strategy.write();
        if *current != strategy {
            *current = strategy;
            self.clear_cache();
        }
    }

    pub fn min_score(&self) -> f64 {
        self.min_score
    }

    pub fn weights(&self) -> &ScoreWeights {
        &self.weights
    }

    pub fn index(&self) -> &CaptureIndex {
        &self.index
    }

    pub fn has_ai(&self) -> bool {
        self.ai.is_some()
    }

    pub fn cache_stats(&self) -> Option<CacheStats> {
        self.cache.as_ref().map(MatchCache::stats)
    }

    pub fn clear_cache(&self) {
        if let Some(cache) = &self.cache {
            cache.clear();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ai::testing::ScriptedDelegate;
    use crate::ai::AiError;

    fn config(strategy: MatchingStrategy, min_score: f64) -> MatchingConfig {
        MatchingConfig {
            strategy,
            min_score,
            ..Default::default()
        }
    }

    fn matcher(captures: Vec<Capture>, strategy: MatchingStrategy, min_score: f64) -> RequestMatcher {
        RequestMatcher::new(captures, &config(strategy, min_score), None).unwrap()
    }

    fn users() -> Vec<Capture> {
        vec![
            Capture::new("GET", "https://api.x/users/1").with_resp_body(r#"{"id":1}"#),
            Capture::new("GET", "https://api.x/orders/1"),
            Capture::new("POST", "https://api.x/users").with_req_body(r#"{"name":"a"}"#),
        ]
    }

    #[tokio::test]
    async fn test_exact_match() {
        let matcher = matcher(users(), MatchingStrategy::Exact, 0.7);
        let result = matcher
            .find_match(&IncomingRequest::new("GET", "https://api.x/users/1"))
            .await;
        assert!(result.matched);
        assert_eq!(result.total_score(), Some(1.0));
        assert_eq!(result.reason, "Exact match");

        let miss = matcher
            .find_match(&IncomingRequest::new("GET", "https://api.x/users/2"))
            .await;
        assert!(!miss.matched);
        assert_eq!(miss.reason, "No exact match found");
    }

    #[tokio::test]
    async fn test_exact_match_first_wins() {
        let captures = vec![
            Capture::new("GET", "https://api.x/a").with_resp_body("first"),
            Capture::new("GET", "https://api.x/a").with_resp_body("second"),
        ];
        let matcher = matcher(captures, MatchingStrategy::Exact, 0.7);
        let result = matcher
            .find_match(&IncomingRequest::new("GET", "https://api.x/a"))
            .await;
        assert_eq!(result.capture.unwrap().resp_body, "first");
    }

    #[tokio::test]
    async fn test_fuzzy_id_tolerance() {
        let captures = vec![Capture::new("GET", "https://api.x/users/1")];
        let matcher = matcher(captures, MatchingStrategy::Fuzzy, 0.6);
        let result = matcher
            .find_match(&IncomingRequest::new("GET", "https://api.x/users/999"))
            .await;

        assert!(result.matched, "{}", result.reason);
        let score = result.score.unwrap();
        assert!(score.path_score >= 0.8);
        assert!(score.total_score >= 0.6);
        assert!(result.reason.starts_with("Fuzzy match (score: "));
    }

    #[tokio::test]
    async fn test_fuzzy_query_mismatch_threshold() {
        let captures = vec![Capture::new("GET", "/search?q=foo")];
        let request = IncomingRequest::new("GET", "/search?q=bar");

        let strict = matcher(captures.clone(), MatchingStrategy::Fuzzy, 0.9);
        let rejected = strict.find_match(&request).await;
        assert!(!rejected.matched);
        assert!(rejected.capture.is_none());
        assert_eq!(rejected.reason, "No match above threshold 0.9 (best: 0.60)");

        let lenient = matcher(captures, MatchingStrategy::Fuzzy, 0.5);
        assert!(lenient.find_match(&request).await.matched);
    }

    #[tokio::test]
    async fn test_fuzzy_ties_keep_first_candidate() {
        let captures = vec![
            Capture::new("GET", "https://api.x/users/1").with_resp_body("first"),
            Capture::new("GET", "https://api.x/users/2").with_resp_body("second"),
        ];
        let matcher = matcher(captures, MatchingStrategy::Fuzzy, 0.5);
        let result = matcher
            .find_match(&IncomingRequest::new("GET", "https://api.x/users/3"))
            .await;
        assert_eq!(result.capture.unwrap().resp_body, "first");
    }

    #[tokio::test]
    async fn test_fuzzy_prefers_matching_body() {
        let captures = vec![
            Capture::new("POST", "https://api.x/login").with_req_body(r#"{"user":"alice"}"#),
            Capture::new("POST", "https://api.x/login").with_req_body(r#"{"user":"bob"}"#),
        ];
        let matcher = matcher(captures, MatchingStrategy::Fuzzy, 0.5);
        let request =
            IncomingRequest::new("POST", "https://api.x/login").with_body(r#"{"user":"bob"}"#);
        let result = matcher.find_match(&request).await;
        assert!(result.capture.unwrap().req_body.contains("bob"));
    }

    #[tokio::test]
    async fn test_fuzzy_without_same_method() {
        let matcher = matcher(users(), MatchingStrategy::Fuzzy, 0.7);
        let result = matcher
            .find_match(&IncomingRequest::new("DELETE", "https://api.x/users/1"))
            .await;
        assert!(!result.matched);
        assert!(result.score.is_none());
        assert_eq!(result.reason, "No captures found for method DELETE");
    }

    #[tokio::test]
    async fn test_threshold_monotonicity() {
        let request = IncomingRequest::new("GET", "https://api.x/users/42?expand=true");
        let mut previously_matched = true;
        for min_score in [0.0, 0.3, 0.5, 0.6, 0.7, 0.8, 0.9, 1.0] {
            let matched = matcher(users(), MatchingStrategy::Fuzzy, min_score)
                .find_match(&request)
                .await
                .matched;
            assert!(previously_matched || !matched, "flipped back at {min_score}");
            previously_matched = matched;
        }
    }

    #[tokio::test]
    async fn test_pattern_match() {
        let captures = vec![
            Capture::new("GET", "https://api.x/users/{id}/orders"),
            Capture::new("GET", "https://api.x/static/**"),
        ];
        let matcher = matcher(captures, MatchingStrategy::Pattern, 0.7);

        let result = matcher
            .find_match(&IncomingRequest::new("GET", "https://api.x/users/7/orders"))
            .await;
        assert!(result.matched);
        assert_eq!(result.total_score(), Some(PATTERN_MATCH_SCORE));

        let nested = matcher
            .find_match(&IncomingRequest::new("GET", "https://api.x/static/js/app.js"))
            .await;
        assert!(nested.matched);

        let miss = matcher
            .find_match(&IncomingRequest::new("GET", "https://api.x/users/7"))
            .await;
        assert!(!miss.matched);
        assert_eq!(miss.reason, "No pattern match found");
    }

    #[tokio::test]
    async fn test_empty_corpus_never_matches() {
        for strategy in [
            MatchingStrategy::Exact,
            MatchingStrategy::Fuzzy,
            MatchingStrategy::Pattern,
            MatchingStrategy::Semantic,
        ] {
            let matcher = matcher(Vec::new(), strategy, 0.7);
            let result = matcher
                .find_match(&IncomingRequest::new("GET", "https://api.x/anything"))
                .await;
            assert!(!result.matched, "{strategy} matched an empty corpus");
        }
    }

    #[tokio::test]
    async fn test_repeated_query_hits_cache() {
        let matcher = matcher(users(), MatchingStrategy::Fuzzy, 0.6);
        let request = IncomingRequest::new("GET", "https://api.x/users/5")
            .with_header("Accept", "application/json");

        let first = matcher.lookup(&request).await;
        let second = matcher.lookup(&request).await;

        assert!(!first.cache_hit);
        assert!(second.cache_hit);
        assert_eq!(first.result, second.result);

        let stats = matcher.cache_stats().unwrap();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[tokio::test]
    async fn test_cache_disabled() {
        let config = MatchingConfig {
            cache_enabled: false,
            ..Default::default()
        };
        let matcher = RequestMatcher::new(users(), &config, None).unwrap();
        let request = IncomingRequest::new("GET", "https://api.x/users/1");
        assert!(!matcher.lookup(&request).await.cache_hit);
        assert!(!matcher.lookup(&request).await.cache_hit);
        assert!(matcher.cache_stats().is_none());
    }

    #[tokio::test]
    async fn test_strategy_change_clears_cache() {
        let matcher = matcher(users(), MatchingStrategy::Fuzzy, 0.6);
        let request = IncomingRequest::new("GET", "https://api.x/users/5");
        assert!(matcher.find_match(&request).await.matched);

        matcher.set_strategy(MatchingStrategy::Exact);
        assert_eq!(matcher.cache_stats().unwrap().size, 0);
        assert!(!matcher.find_match(&request).await.matched);
    }

    #[test]
    fn test_invalid_configuration_is_rejected() {
        assert!(matches!(
            RequestMatcher::new(users(), &config(MatchingStrategy::Fuzzy, -0.1), None),
            Err(ConfigError::InvalidMinScore(_))
        ));

        let bad_weights = MatchingConfig {
            weights: ScoreWeights {
                path: -1.0,
                ..Default::default()
            },
            ..Default::default()
        };
        assert!(RequestMatcher::new(users(), &bad_weights, None).is_err());
    }

    fn semantic_matcher(delegate: ScriptedDelegate) -> RequestMatcher {
        let config = MatchingConfig {
            strategy: MatchingStrategy::Semantic,
            min_score: 0.6,
            ai_timeout_ms: 50,
            ..Default::default()
        };
        RequestMatcher::new(users(), &config, Some(Arc::new(delegate))).unwrap()
    }

    #[tokio::test]
    async fn test_semantic_match_uses_delegate_choice() {
        let matcher = semantic_matcher(ScriptedDelegate::replying(vec![Ok("1".to_string())]));
        let result = matcher
            .find_match(&IncomingRequest::new("GET", "https://api.x/orders/77"))
            .await;

        assert!(result.matched);
        assert_eq!(result.capture.unwrap().url, "https://api.x/orders/1");
        let score = result.score.unwrap();
        assert_eq!(score.total_score, SEMANTIC_MATCH_SCORE);
        assert_eq!(score.path_score, 1.0);
        assert_eq!(result.reason, "AI semantic match (index 1)");
    }

    #[tokio::test]
    async fn test_semantic_none_is_no_match() {
        let matcher = semantic_matcher(ScriptedDelegate::replying(vec![Ok("NONE".to_string())]));
        let result = matcher
            .find_match(&IncomingRequest::new("GET", "https://api.x/users/1"))
            .await;
        assert!(!result.matched);
    }

    #[tokio::test]
    async fn test_semantic_falls_back_to_fuzzy() {
        for reply in [
            Ok("banana".to_string()),
            Ok("2".to_string()), // POST capture, not offered for GET
            Err(AiError::Transport("boom".to_string())),
        ] {
            let matcher = semantic_matcher(ScriptedDelegate::replying(vec![reply]));
            let result = matcher
                .find_match(&IncomingRequest::new("GET", "https://api.x/users/9"))
                .await;
            assert!(result.matched);
            assert!(result.reason.starts_with("Fuzzy match"));
        }
    }

    #[tokio::test]
    async fn test_semantic_timeout_falls_back_to_fuzzy() {
        let matcher = semantic_matcher(ScriptedDelegate::slow(Duration::from_millis(500)));
        let result = matcher
            .find_match(&IncomingRequest::new("GET", "https://api.x/users/9"))
            .await;
        assert!(result.reason.starts_with("Fuzzy match"));
    }

    #[tokio::test]
    async fn test_strategy_switch_during_lookup_is_not_cached() {
        let config = MatchingConfig {
            strategy: MatchingStrategy::Semantic,
            min_score: 0.6,
            ai_timeout_ms: 2000,
            ..Default::default()
        };
        let delegate = ScriptedDelegate::slow(Duration::from_millis(200));
        let matcher = Arc::new(RequestMatcher::new(users(), &config, Some(Arc::new(delegate))).unwrap());
        let request = IncomingRequest::new("GET", "https://api.x/users/5");

        let in_flight = {
            let matcher = Arc::clone(&matcher);
            let request = request.clone();
            tokio::spawn(async move { matcher.lookup(&request).await })
        };
        tokio::time::sleep(Duration::from_millis(30)).await;
        matcher.set_strategy(MatchingStrategy::Exact);

        // the delegate fails after its delay, so the old lookup ends in fuzzy
        let stale = in_flight.await.unwrap();
        assert!(stale.result.reason.starts_with("Fuzzy match"));
        assert_eq!(matcher.cache_stats().unwrap().size, 0);

        let fresh = matcher.lookup(&request).await;
        assert!(!fresh.cache_hit);
        assert!(!fresh.result.matched);
        assert_eq!(fresh.result.reason, "No exact match found");
    }

    #[tokio::test]
    async fn test_semantic_without_delegate_is_fuzzy() {
        let matcher = matcher(users(), MatchingStrategy::Semantic, 0.6);
        let result = matcher
            .find_match(&IncomingRequest::new("GET", "https://api.x/users/9"))
            .await;
        assert!(result.reason.starts_with("Fuzzy match"));
    }
}
