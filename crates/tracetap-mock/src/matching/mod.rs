//! Request matching engine.
//!
//! Given an incoming request and the capture corpus, pick the capture that
//! best represents it. Strategies:
//! - `exact`: identical method and URL
//! - `fuzzy`: weighted path/query/header/body similarity with a threshold
//! - `pattern`: capture paths as `*` / `**` / `{name}` wildcards
//! - `semantic`: an AI delegate picks among the closest candidates
//!
//! Results are memoized in a bounded FIFO cache keyed by request fingerprint.

pub mod cache;
pub mod id;
pub mod index;
pub mod matcher;
pub mod pattern;
pub mod score;
pub mod semantic;
pub mod similarity;
mod types;

#[allow(unused_imports)]
pub use cache::{fingerprint, CacheStats, MatchCache};
pub use id::{is_likely_id, normalize_path};
pub use index::CaptureIndex;
pub use matcher::{MatchLookup, RequestMatcher};
pub use score::{aggregate, MatchScore, ScoreWeights};
#[allow(unused_imports)]
pub use similarity::{body_score, header_score, path_score, query_score};
pub use types::{IncomingRequest, MatchResult};
