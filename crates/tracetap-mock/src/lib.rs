//! TraceTap mock server: serve captured HTTP traffic back by matching
//! incoming requests against a capture corpus.

pub mod ai;
pub mod capture;
pub mod config;
pub mod matching;
pub mod response;
pub mod server;

pub use capture::{load_captures, parse_captures, Capture, CaptureError, Headers};
pub use config::{ConfigError, MockConfig};
pub use matching::{IncomingRequest, MatchResult, RequestMatcher};
pub use response::{RequestContext, ResponseGenerator, ResponseSpec};
pub use server::MockServer;
