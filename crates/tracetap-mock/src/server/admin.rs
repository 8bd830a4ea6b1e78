//! Admin API, mounted under the configured prefix.

use super::http::{build_response_with_headers, error_response, json_response, not_found};
use super::journal::export_recordings;
use super::metrics::collect_metrics;
use super::replay::{self, ReplayRequest};
use super::MockServer;
use crate::config::MatchingStrategy;
use bytes::Bytes;
use http_body_util::Full;
use hyper::{Method, Response, StatusCode};
use serde::Deserialize;
use serde_json::json;
use tracing::{debug, info};

/// Runtime configuration changes accepted by `POST config`.
#[derive(Debug, Default, Deserialize)]
pub struct ConfigUpdate {
    pub matching_strategy: Option<MatchingStrategy>,
    pub add_delay_ms: Option<u64>,
    pub chaos_enabled: Option<bool>,
    pub chaos_failure_rate: Option<f64>,
}

/// Dispatch an admin request. `path` has the prefix removed.
pub async fn route(
    server: &MockServer,
    method: &Method,
    path: &str,
    body: Bytes,
) -> Response<Full<Bytes>> {
    debug!("Admin API: {} {}", method, path);

    match (method, path.trim_end_matches('/')) {
        (&Method::GET, "/metrics") => json_response(StatusCode::OK, &server.metrics.snapshot()),
        (&Method::GET, "/metrics/prometheus") => build_response_with_headers(
            StatusCode::OK,
            [("Content-Type", "text/plain; version=0.0.4")],
            collect_metrics(),
        ),
        (&Method::GET, "/live") => handle_live(server),
        (&Method::GET, "/config") => handle_get_config(server),
        (&Method::POST, "/config") => handle_update_config(server, &body),
        (&Method::GET, "/captures") => handle_captures(server),
        (&Method::POST, "/reset") => {
            server.metrics.reset();
            json_response(StatusCode::OK, &json!({ "status": "reset" }))
        }
        (&Method::GET, "/recordings") => json_response(
            StatusCode::OK,
            &json!({
                "total": server.recordings.len(),
                "limit": server.recordings.limit(),
                "recording_enabled": server.config.recording.enabled,
                "recordings": server.recordings.snapshot(),
            }),
        ),
        (&Method::DELETE, "/recordings") => cleared(server.recordings.clear()),
        (&Method::GET, "/recordings/export") => {
            json_response(StatusCode::OK, &export_recordings(&server.recordings.snapshot()))
        }
        (&Method::GET, "/diffs") => json_response(
            StatusCode::OK,
            &json!({
                "total": server.diffs.len(),
                "limit": server.diffs.limit(),
                "threshold": server.config.diff.threshold,
                "diff_enabled": server.config.diff.enabled,
                "diffs": server.diffs.snapshot(),
            }),
        ),
        (&Method::DELETE, "/diffs") => cleared(server.diffs.clear()),
        (&Method::GET, "/diffs/latest") => match server.diffs.latest() {
            Some(diff) => json_response(StatusCode::OK, &diff),
            None => error_response(StatusCode::NOT_FOUND, "No diffs available"),
        },
        (&Method::POST, "/replay") => handle_replay(server, &body).await,
        (&Method::GET, "/cache") => handle_cache_stats(server),
        (&Method::DELETE, "/cache") => {
            let entries_cleared = server.matcher.cache_stats().map_or(0, |s| s.size);
            server.matcher.clear_cache();
            json_response(
                StatusCode::OK,
                &json!({ "status": "cleared", "entries_cleared": entries_cleared }),
            )
        }
        _ => not_found(),
    }
}

fn cleared(count: usize) -> Response<Full<Bytes>> {
    json_response(
        StatusCode::OK,
        &json!({ "status": "cleared", "cleared_count": count }),
    )
}

/// Most recent first.
fn handle_live(server: &MockServer) -> Response<Full<Bytes>> {
    let mut requests = server.live.snapshot();
    requests.reverse();
    json_response(
        StatusCode::OK,
        &json!({
            "total": requests.len(),
            "limit": server.live.limit(),
            "requests": requests,
        }),
    )
}

fn handle_get_config(server: &MockServer) -> Response<Full<Bytes>> {
    let faults = server.faults.read().clone();
    json_response(
        StatusCode::OK,
        &json!({
            "matching_strategy": server.matcher.strategy(),
            "min_score": server.matcher.min_score(),
            "response_mode": server.generator.mode(),
            "add_delay_ms": faults.delay_ms,
            "random_delay_ms": faults.random_delay_ms,
            "chaos_enabled": faults.chaos_enabled,
            "chaos_failure_rate": faults.chaos_rate,
            "total_captures": server.matcher.index().len(),
        }),
    )
}

fn handle_update_config(server: &MockServer, body: &Bytes) -> Response<Full<Bytes>> {
    let update: ConfigUpdate = match serde_json::from_slice(body) {
        Ok(update) => update,
        Err(e) => {
            return error_response(
                StatusCode::BAD_REQUEST,
                &format!("Invalid config update: {e}"),
            )
        }
    };

    {
        let mut faults = server.faults.write();
        if let Some(rate) = update.chaos_failure_rate {
            if let Err(e) = faults.set_chaos_rate(rate) {
                return error_response(StatusCode::BAD_REQUEST, &e.to_string());
            }
        }
        if let Some(enabled) = update.chaos_enabled {
            faults.chaos_enabled = enabled;
        }
        if let Some(delay_ms) = update.add_delay_ms {
            faults.delay_ms = delay_ms;
        }
    }
    if let Some(strategy) = update.matching_strategy {
        server.matcher.set_strategy(strategy);
    }

    info!("Runtime configuration updated: {:?}", update);
    json_response(StatusCode::OK, &json!({ "status": "updated" }))
}

fn handle_captures(server: &MockServer) -> Response<Full<Bytes>> {
    let captures: Vec<_> = server
        .matcher
        .index()
        .entries()
        .iter()
        .map(|c| {
            json!({
                "index": c.position,
                "method": c.capture.method,
                "url": c.capture.url,
                "status": c.capture.status,
                "timestamp": c.capture.timestamp,
            })
        })
        .collect();
    json_response(
        StatusCode::OK,
        &json!({ "total": captures.len(), "captures": captures }),
    )
}

fn handle_cache_stats(server: &MockServer) -> Response<Full<Bytes>> {
    let matching = &server.config.matching;
    let body = match server.matcher.cache_stats() {
        Some(stats) => json!({
            "enabled": true,
            "max_size": stats.max_size,
            "current_size": stats.size,
            "hits": stats.hits,
            "misses": stats.misses,
            "hit_rate": stats.hit_rate,
        }),
        None => json!({
            "enabled": false,
            "max_size": matching.cache_max_size,
            "current_size": 0,
            "hits": 0,
            "misses": 0,
            "hit_rate": 0.0,
        }),
    };
    json_response(StatusCode::OK, &body)
}

async fn handle_replay(server: &MockServer, body: &Bytes) -> Response<Full<Bytes>> {
    // An empty or unparseable body replays everything.
    let request: ReplayRequest = serde_json::from_slice(body).unwrap_or_default();
    let recordings = server.recordings.snapshot();
    let total_recordings = recordings.len();
    let selected = replay::select(recordings, request.indices.as_deref());

    if selected.is_empty() {
        return json_response(
            StatusCode::BAD_REQUEST,
            &json!({
                "error": "No recordings to replay",
                "total_recordings": total_recordings,
            }),
        );
    }

    let summary = replay::replay_all(
        &server.replay_client,
        &server.base_url(),
        selected,
        server.config.server.replay_max_workers,
    )
    .await;
    info!(
        "Replayed {} recordings: {} ok, {} status mismatches",
        summary.total_replayed, summary.successful, summary.status_mismatches
    );
    json_response(StatusCode::OK, &summary)
}
