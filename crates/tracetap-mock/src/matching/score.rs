//! Weighted aggregation of component scores.

use crate::config::ConfigError;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// Score a match must reach to be considered good by convention.
pub const GOOD_MATCH_SCORE: f64 = 0.7;

/// Per-component weights. The defaults sum to 1.0.
#[derive(Debug, Clone, Copy, PartialEq, Deserialize, Serialize)]
pub struct ScoreWeights {
    #[serde(default = "default_path_weight")]
    pub path: f64,
    #[serde(default = "default_query_weight")]
    pub query: f64,
    #[serde(default = "default_side_weight")]
    pub headers: f64,
    #[serde(default = "default_side_weight")]
    pub body: f64,
}

fn default_path_weight() -> f64 {
    0.5
}

fn default_query_weight() -> f64 {
    0.2
}

fn default_side_weight() -> f64 {
    0.15
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            path: default_path_weight(),
            query: default_query_weight(),
            headers: default_side_weight(),
            body: default_side_weight(),
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.path + self.query + self.headers + self.body
    }

    /// Rejects negative, non-finite or all-zero weights. A sum away from 1.0
    /// is accepted as-is with a warning; weights are never renormalized.
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (name, value) in [
            ("path", self.path),
            ("query", self.query),
            ("headers", self.headers),
            ("body", self.body),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { name, value });
            }
        }

        let sum = self.sum();
        if sum == 0.0 {
            return Err(ConfigError::WeightsSum);
        }
        if (sum - 1.0).abs() > 0.01 {
            warn!(
                "Score weights sum to {:.3} instead of 1.0; total scores will not be in the usual range",
                sum
            );
        }

        Ok(())
    }
}

/// Breakdown of one match attempt.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MatchScore {
    pub total_score: f64,
    pub path_score: f64,
    pub query_score: f64,
    pub header_score: f64,
    pub body_score: f64,
    pub method_match: bool,
}

impl MatchScore {
    /// Categorical result with every component at full credit.
    pub fn synthetic(total_score: f64, method_match: bool) -> Self {
        Self {
            total_score,
            path_score: 1.0,
            query_score: 1.0,
            header_score: 1.0,
            body_score: 1.0,
            method_match,
        }
    }

    pub fn is_good(&self) -> bool {
        self.total_score >= GOOD_MATCH_SCORE
    }
}

/// Combine component scores into a weighted total.
pub fn aggregate(
    path_score: f64,
    query_score: f64,
    header_score: f64,
    body_score: f64,
    weights: &ScoreWeights,
) -> MatchScore {
    let total_score = path_score * weights.path
        + query_score * weights.query
        + header_score * weights.headers
        + body_score * weights.body;

    MatchScore {
        total_score,
        path_score,
        query_score,
        header_score,
        body_score,
        method_match: true,
    }
}
