//! Mock serving loop.
//!
//! Every request runs the same fixed sequence:
//! `RECEIVED -> chaos check -> delay -> MATCHING -> GENERATING -> RESPONDED`.
//! A chaos failure ends the sequence early with a synthetic error response.
//! Requests prefixed with the admin prefix are routed to the admin API instead.
//!
//! Shared mutable state is limited to the match cache (inside the matcher),
//! counters, journals, and the runtime fault settings.

pub mod admin;
pub mod chaos;
pub mod diff;
pub mod fallback;
pub mod http;
pub mod journal;
pub mod metrics;
pub mod replay;

use crate::ai::AiDelegate;
use crate::capture::{Capture, Headers};
use crate::config::{ConfigError, MockConfig};
use crate::matching::id::path_and_query;
use crate::matching::{IncomingRequest, MatchLookup, RequestMatcher};
use crate::response::{RequestContext, ResponseGenerator};
use bytes::Bytes;
use chaos::{apply_delay, FaultSettings, CHAOS_ERROR_BODY};
use diff::{best_candidate, compute_diff, RequestDiff};
use fallback::{FallbackBody, FallbackContext};
use http::{build_response_with_headers, collect_body, error_response, APPLICATION_JSON};
use http_body_util::Full;
use hyper::body::Incoming;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::{HeaderMap, Request, Response, StatusCode};
use hyper_util::rt::TokioIo;
use journal::{
    Journal, LiveRequest, MatchSummary, RecordedRequest, ServedResponse, LIVE_REQUEST_LIMIT,
};
use metrics::{record_cache_lookup, record_match_duration, MockMetrics};
use parking_lot::RwLock;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, OnceLock};
use std::time::{Duration, Instant};
use tokio::net::TcpListener;
use tracing::{debug, info, trace, warn};

/// Capture headers that must not be replayed verbatim.
const HOP_BY_HOP_HEADERS: [&str; 3] = ["content-length", "transfer-encoding", "connection"];

pub const HEADER_MATCH_SCORE: &str = "X-TraceTap-Match-Score";
pub const HEADER_MATCHED_URL: &str = "X-TraceTap-Matched-URL";
pub const HEADER_CACHE_HIT: &str = "X-TraceTap-Cache-Hit";
pub const HEADER_STRATEGY: &str = "X-TraceTap-Strategy";
pub const HEADER_MATCHED: &str = "X-TraceTap-Matched";

/// Per-request lifecycle, logged at trace level.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    Received,
    ChaosFailed,
    Delayed,
    Matching,
    Generating,
    Responded,
}

impl Phase {
    fn as_str(&self) -> &'static str {
        match self {
            Phase::Received => "RECEIVED",
            Phase::ChaosFailed => "CHAOS-FAILED",
            Phase::Delayed => "DELAYED",
            Phase::Matching => "MATCHING",
            Phase::Generating => "GENERATING",
            Phase::Responded => "RESPONDED",
        }
    }
}

/// Logs at info when verbose, otherwise at debug.
macro_rules! verbose {
    ($enabled:expr, $($arg:tt)*) => {
        if $enabled {
            info!($($arg)*);
        } else {
            debug!($($arg)*);
        }
    };
}

pub struct MockServer {
    config: MockConfig,
    matcher: RequestMatcher,
    generator: ResponseGenerator,
    faults: RwLock<FaultSettings>,
    metrics: MockMetrics,
    recordings: Journal<RecordedRequest>,
    live: Journal<LiveRequest>,
    diffs: Journal<RequestDiff>,
    local_addr: OnceLock<SocketAddr>,
    replay_client: reqwest::Client,
}

impl MockServer {
    /// Validates the configuration and indexes the corpus.
    pub fn new(
        config: MockConfig,
        captures: Vec<Capture>,
        ai: Option<Arc<dyn AiDelegate>>,
    ) -> Result<Self, ConfigError> {
        config.validate()?;

        let matcher = RequestMatcher::new(captures, &config.matching, ai.clone())?;
        let mut generator = ResponseGenerator::new(&config.response);
        if let Some(ai) = ai {
            generator = generator.with_ai(ai, Duration::from_millis(config.matching.ai_timeout_ms));
        }

        Ok(Self {
            faults: RwLock::new(FaultSettings::from_config(&config.delay, &config.chaos)),
            metrics: MockMetrics::new(),
            recordings: Journal::new(config.recording.limit),
            live: Journal::new(LIVE_REQUEST_LIMIT),
            diffs: Journal::new(config.diff.limit),
            local_addr: OnceLock::new(),
            replay_client: reqwest::Client::new(),
            matcher,
            generator,
            config,
        })
    }

    /// Replace the response generator, e.g. to register custom transformers.
    pub fn with_generator(mut self, generator: ResponseGenerator) -> Self {
        self.generator = generator;
        self
    }

    pub fn matcher(&self) -> &RequestMatcher {
        &self.matcher
    }

    pub fn metrics(&self) -> &MockMetrics {
        &self.metrics
    }

    pub fn config(&self) -> &MockConfig {
        &self.config
    }

    pub fn recordings(&self) -> Vec<RecordedRequest> {
        self.recordings.snapshot()
    }

    pub fn diffs(&self) -> Vec<RequestDiff> {
        self.diffs.snapshot()
    }

    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.local_addr.get().copied()
    }

    /// Base URL of this server, used as the replay target.
    fn base_url(&self) -> String {
        match self.local_addr() {
            Some(addr) => format!("http://{addr}"),
            None => format!("http://{}:{}", self.config.server.host, self.config.server.port),
        }
    }

    /// Bind the configured address and serve until the listener fails.
    pub async fn run(self: Arc<Self>) -> Result<(), anyhow::Error> {
        let addr = format!("{}:{}", self.config.server.host, self.config.server.port);
        let listener = TcpListener::bind(&addr).await?;
        self.serve(listener).await
    }

    pub async fn serve(self: Arc<Self>, listener: TcpListener) -> Result<(), anyhow::Error> {
        let addr = listener.local_addr()?;
        let _ = self.local_addr.set(addr);
        info!(
            "TraceTap mock server listening on http://{} ({} captures, strategy={}, response mode={})",
            addr,
            self.matcher.index().len(),
            self.matcher.strategy(),
            self.generator.mode()
        );
        if self.config.server.admin_enabled {
            info!("Admin API at http://{}{}", addr, self.config.server.admin_prefix);
        }

        loop {
            let (stream, _) = listener.accept().await?;
            let io = TokioIo::new(stream);
            let server = Arc::clone(&self);

            tokio::spawn(async move {
                let service = service_fn(move |req| {
                    let server = Arc::clone(&server);
                    async move { server.dispatch(req).await }
                });

                if let Err(e) = http1::Builder::new().serve_connection(io, service).await {
                    debug!("Connection error: {}", e);
                }
            });
        }
    }

    async fn dispatch(&self, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
        let (parts, body) = match collect_body(req).await {
            Ok(collected) => collected,
            Err(e) => return Ok(error_response(StatusCode::BAD_REQUEST, &e)),
        };

        if self.config.server.admin_enabled {
            let prefix = self.config.server.admin_prefix.trim_end_matches('/');
            if let Some(rest) = parts.uri.path().strip_prefix(prefix) {
                if rest.is_empty() || rest.starts_with('/') {
                    return Ok(admin::route(self, &parts.method, rest, body).await);
                }
            }
        }

        let request = IncomingRequest {
            method: parts.method.as_str().to_string(),
            url: self.absolute_url(&parts.uri, &parts.headers),
            headers: flatten_headers(&parts.headers),
            body,
        };
        Ok(self.handle(request).await)
    }

    fn absolute_url(&self, uri: &hyper::Uri, headers: &HeaderMap) -> String {
        if uri.scheme().is_some() {
            return uri.to_string();
        }
        let host = headers
            .get(hyper::header::HOST)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string)
            .unwrap_or_else(|| {
                self.local_addr()
                    .map(|a| a.to_string())
                    .unwrap_or_else(|| "localhost".to_string())
            });
        let path = uri.path_and_query().map_or("/", |pq| pq.as_str());
        format!("http://{host}{path}")
    }

    /// Serve one mock request. Never fails: unmatched requests get the
    /// diagnostic fallback.
    pub async fn handle(&self, request: IncomingRequest) -> Response<Full<Bytes>> {
        let start = Instant::now();
        let method = request.method.to_uppercase();
        let verbose = self.config.server.verbose;
        self.metrics.record_received();
        self.trace_phase(Phase::Received, &request);
        verbose!(verbose, "{} {}", method, request.url);

        let faults = self.faults.read().clone();
        if faults.should_fail() {
            self.metrics.record_chaos_failure(&method);
            self.trace_phase(Phase::ChaosFailed, &request);
            warn!("Chaos failure triggered for {} {}", method, request.url);
            let status = StatusCode::from_u16(faults.chaos_error_status)
                .unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
            return build_response_with_headers(
                status,
                [("Content-Type", APPLICATION_JSON)],
                CHAOS_ERROR_BODY,
            );
        }

        if let Some(delay) = faults.delay() {
            apply_delay(delay).await;
            self.trace_phase(Phase::Delayed, &request);
        }

        self.trace_phase(Phase::Matching, &request);
        let strategy = self.matcher.strategy();
        let match_start = Instant::now();
        let MatchLookup { result, cache_hit } = self.matcher.lookup(&request).await;
        record_match_duration(strategy.as_str(), match_start.elapsed().as_secs_f64() * 1000.0);
        if self.matcher.cache_stats().is_some() {
            record_cache_lookup(cache_hit);
        }

        match (&result.capture, &result.score) {
            (Some(capture), Some(score)) if result.matched => {
                verbose!(
                    verbose,
                    "  Matched: {} (score: {:.3}){}",
                    capture.url,
                    score.total_score,
                    if cache_hit { " [cache hit]" } else { "" }
                );
                if score.total_score < 0.9 {
                    verbose!(
                        verbose,
                        "    Path: {:.2} | Query: {:.2} | Headers: {:.2} | Body: {:.2}",
                        score.path_score,
                        score.query_score,
                        score.header_score,
                        score.body_score
                    );
                }
            }
            _ => verbose!(verbose, "  No match found: {}", result.reason),
        }

        if self.config.diff.enabled {
            self.track_diff(&request, &result);
        }

        let served = match result.capture.as_ref().filter(|_| result.matched) {
            Some(capture) => {
                self.trace_phase(Phase::Generating, &request);
                let context = RequestContext::from_request(&request);
                let spec = self
                    .generator
                    .generate(capture, &context, self.generator.mode())
                    .await;

                let mut headers: Headers = spec
                    .headers
                    .into_iter()
                    .filter(|(k, _)| !HOP_BY_HOP_HEADERS.contains(&k.to_ascii_lowercase().as_str()))
                    .collect();
                if !headers.keys().any(|k| k.eq_ignore_ascii_case("content-type")) {
                    headers.insert("Content-Type".to_string(), APPLICATION_JSON.to_string());
                }
                if let Some(total) = result.total_score() {
                    headers.insert(HEADER_MATCH_SCORE.to_string(), format!("{total:.3}"));
                }
                headers.insert(HEADER_MATCHED_URL.to_string(), capture.url.clone());
                headers.insert(HEADER_CACHE_HIT.to_string(), cache_hit.to_string());
                headers.insert(HEADER_STRATEGY.to_string(), strategy.to_string());

                ServedResponse {
                    status: valid_status(spec.status),
                    headers,
                    body: spec.body,
                }
            }
            None => {
                warn!("No match found for {} {}: {}", method, request.url, result.reason);
                let body = FallbackBody::build(
                    &request,
                    &FallbackContext {
                        index: self.matcher.index(),
                        strategy,
                        min_score: self.matcher.min_score(),
                        ai_enabled: self.matcher.has_ai(),
                    },
                );
                ServedResponse {
                    status: valid_status(self.config.fallback.status),
                    headers: Headers::from([
                        ("Content-Type".to_string(), APPLICATION_JSON.to_string()),
                        (HEADER_MATCHED.to_string(), "false".to_string()),
                        (HEADER_STRATEGY.to_string(), strategy.to_string()),
                    ]),
                    body: serde_json::to_string(&body).unwrap_or_else(|_| "{}".to_string()),
                }
            }
        };

        let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
        if result.matched {
            self.metrics.record_matched(&method, duration_ms);
        } else {
            self.metrics.record_unmatched(&method, duration_ms);
        }
        let matched_url = result
            .capture
            .as_ref()
            .filter(|_| result.matched)
            .map(|c| c.url.clone());

        self.live.push(LiveRequest {
            timestamp: chrono::Utc::now().to_rfc3339(),
            method: method.clone(),
            path: path_and_query(&request.url),
            status: served.status,
            matched: result.matched,
            cache_hit,
            duration_ms,
            matched_url: matched_url.clone(),
            score: result.score.filter(|_| result.matched),
            reason: result.reason.clone(),
        });

        if self.config.recording.enabled {
            self.recordings.push(RecordedRequest {
                timestamp: chrono::Utc::now().to_rfc3339(),
                method: method.clone(),
                url: request.url.clone(),
                path: path_and_query(&request.url),
                headers: request.headers.clone(),
                body: String::from_utf8_lossy(&request.body).into_owned(),
                match_info: MatchSummary {
                    matched: result.matched,
                    score: result.total_score(),
                    matched_url,
                    cache_hit,
                    reason: result.reason.clone(),
                },
                response: served.clone(),
                duration_ms,
            });
        }

        self.trace_phase(Phase::Responded, &request);
        verbose!(verbose, "  Response: {} ({:.1}ms)", served.status, duration_ms);
        into_response(served)
    }

    /// Record a diff when nothing matched, or when the match scored below
    /// the diff threshold.
    fn track_diff(&self, request: &IncomingRequest, result: &crate::matching::MatchResult) {
        let score = result.total_score().unwrap_or(0.0);
        let target = if !result.matched {
            best_candidate(self.matcher.index(), request)
        } else if score < self.config.diff.threshold {
            result.capture.clone()
        } else {
            None
        };

        let Some(capture) = target else {
            return;
        };
        let diff = compute_diff(request, &capture, score, &result.reason);
        warn!(
            "{} for {} {} (closest: {}); see {}{}/diffs/latest",
            if result.matched {
                format!("Low match score ({score:.2})")
            } else {
                "No match".to_string()
            },
            diff.incoming_method,
            diff.incoming_url,
            capture.url,
            self.base_url(),
            self.config.server.admin_prefix.trim_end_matches('/'),
        );
        self.diffs.push(diff);
    }

    fn trace_phase(&self, phase: Phase, request: &IncomingRequest) {
        trace!("{} {} {}", phase.as_str(), request.method, request.url);
    }
}

fn valid_status(status: u16) -> u16 {
    StatusCode::from_u16(status).map_or(200, |s| s.as_u16())
}

/// Multi-valued headers are joined with `", "`.
fn flatten_headers(headers: &HeaderMap) -> Headers {
    let mut flat = Headers::new();
    for (name, value) in headers {
        let Ok(value) = value.to_str() else {
            continue;
        };
        flat.entry(name.as_str().to_string())
            .and_modify(|existing| {
                existing.push_str(", ");
                existing.push_str(value);
            })
            .or_insert_with(|| value.to_string());
    }
    flat
}

/// Headers hyper rejects are dropped rather than failing the response.
fn into_response(served: ServedResponse) -> Response<Full<Bytes>> {
    let status = StatusCode::from_u16(served.status).unwrap_or(StatusCode::OK);
    let mut response = Response::new(Full::new(Bytes::from(served.body)));
    *response.status_mut() = status;
    for (name, value) in &served.headers {
        match (
            hyper::header::HeaderName::from_bytes(name.as_bytes()),
            hyper::header::HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                response.headers_mut().append(name, value);
            }
            _ => debug!("Dropping invalid response header {:?}", name),
        }
    }
    response
}
