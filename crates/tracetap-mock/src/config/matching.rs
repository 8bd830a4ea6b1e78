//! Request matching configuration.

use crate::matching::ScoreWeights;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Strategy used to pick a capture for an incoming request.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchingStrategy {
    /// Identical method and full URL string
    Exact,
    /// Weighted similarity scoring with a minimum threshold
    #[default]
    Fuzzy,
    /// Capture paths interpreted as wildcard patterns
    Pattern,
    /// External AI picks among pre-filtered candidates
    Semantic,
}

impl MatchingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MatchingStrategy::Exact => "exact",
            MatchingStrategy::Fuzzy => "fuzzy",
            MatchingStrategy::Pattern => "pattern",
            MatchingStrategy::Semantic => "semantic",
        }
    }
}

impl fmt::Display for MatchingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "exact" => Ok(MatchingStrategy::Exact),
            "fuzzy" => Ok(MatchingStrategy::Fuzzy),
            "pattern" => Ok(MatchingStrategy::Pattern),
            "semantic" => Ok(MatchingStrategy::Semantic),
            other => Err(format!(
                "unknown matching strategy '{other}' (expected exact, fuzzy, pattern or semantic)"
            )),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct MatchingConfig {
    #[serde(default)]
    pub strategy: MatchingStrategy,
    /// Minimum total score accepted by the fuzzy strategy
    #[serde(default = "default_min_score")]
    pub min_score: f64,
    #[serde(default)]
    pub weights: ScoreWeights,
    #[serde(default = "default_true")]
    pub cache_enabled: bool,
    #[serde(default = "default_cache_max_size")]
    pub cache_max_size: usize,
    /// Candidates offered to the AI delegate by the semantic strategy
    #[serde(default = "default_semantic_candidate_limit")]
    pub semantic_candidate_limit: usize,
    #[serde(default = "default_ai_timeout_ms")]
    pub ai_timeout_ms: u64,
}

fn default_min_score() -> f64 {
    0.7
}

fn default_true() -> bool {
    true
}

fn default_cache_max_size() -> usize {
    1000
}

fn default_semantic_candidate_limit() -> usize {
    10
}

fn default_ai_timeout_ms() -> u64 {
    30_000
}

impl Default for MatchingConfig {
    fn default() -> Self {
        Self {
            strategy: MatchingStrategy::default(),
            min_score: default_min_score(),
            weights: ScoreWeights::default(),
            cache_enabled: true,
            cache_max_size: default_cache_max_size(),
            semantic_candidate_limit: default_semantic_candidate_limit(),
            ai_timeout_ms: default_ai_timeout_ms(),
        }
    }
}
