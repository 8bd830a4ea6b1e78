//! Replay of recorded requests against a running server.
//!
//! Requests are sent with at most `max_workers` in flight. Results come back
//! in recording order regardless of completion order.

use super::journal::RecordedRequest;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};
use tracing::debug;

const REPLAY_TIMEOUT: Duration = Duration::from_secs(30);
const SKIPPED_HEADERS: [&str; 3] = ["host", "content-length", "transfer-encoding"];

/// `POST replay` body. No indices means every recording.
#[derive(Debug, Default, Deserialize)]
pub struct ReplayRequest {
    #[serde(default)]
    pub indices: Option<Vec<usize>>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplayOutcome {
    pub index: usize,
    pub method: String,
    pub url: String,
    pub original_status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub replay_status: Option<u16>,
    pub status_match: bool,
    pub success: bool,
    pub duration_ms: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ReplaySummary {
    pub total_replayed: usize,
    pub successful: usize,
    pub failed: usize,
    pub status_matches: usize,
    pub status_mismatches: usize,
    pub results: Vec<ReplayOutcome>,
}

impl ReplaySummary {
    fn from_outcomes(results: Vec<ReplayOutcome>) -> Self {
        let successful = results.iter().filter(|r| r.success).count();
        let status_matches = results.iter().filter(|r| r.status_match).count();
        Self {
            total_replayed: results.len(),
            successful,
            failed: results.len() - successful,
            status_matches,
            status_mismatches: successful - status_matches,
            results,
        }
    }
}

/// Select recordings by index; out-of-range indices are skipped.
pub fn select(
    recordings: Vec<RecordedRequest>,
    indices: Option<&[usize]>,
) -> Vec<(usize, RecordedRequest)> {
    match indices {
        None => recordings.into_iter().enumerate().collect(),
        Some(indices) => indices
            .iter()
            .filter_map(|&i| recordings.get(i).cloned().map(|r| (i, r)))
            .collect(),
    }
}

pub async fn replay_all(
    client: &Client,
    base_url: &str,
    recordings: Vec<(usize, RecordedRequest)>,
    max_workers: usize,
) -> ReplaySummary {
    let outcomes: Vec<ReplayOutcome> = stream::iter(recordings)
        .map(|(index, recording)| replay_one(client, base_url, index, recording))
        .buffered(max_workers.max(1))
        .collect()
        .await;
    ReplaySummary::from_outcomes(outcomes)
}

async fn replay_one(
    client: &Client,
    base_url: &str,
    index: usize,
    recording: RecordedRequest,
) -> ReplayOutcome {
    let target = format!("{}{}", base_url.trim_end_matches('/'), recording.path);
    let original_status = recording.response.status;
    let start = Instant::now();

    let result = async {
        let method = reqwest::Method::from_bytes(recording.method.as_bytes())
            .map_err(|e| e.to_string())?;
        let mut builder = client.request(method, &target).timeout(REPLAY_TIMEOUT);
        for (name, value) in &recording.headers {
            if !SKIPPED_HEADERS.contains(&name.to_ascii_lowercase().as_str()) {
                builder = builder.header(name, value);
            }
        }
        if !recording.body.is_empty() {
            builder = builder.body(recording.body.clone());
        }
        builder
            .send()
            .await
            .map(|response| response.status().as_u16())
            .map_err(|e| e.to_string())
    }
    .await;

    let duration_ms = start.elapsed().as_secs_f64() * 1000.0;
    debug!(
        "Replayed #{} {} {} in {:.1}ms: {:?}",
        index, recording.method, target, duration_ms, result
    );

    match result {
        Ok(status) => ReplayOutcome {
            index,
            method: recording.method,
            url: recording.url,
            original_status,
            replay_status: Some(status),
            status_match: status == original_status,
            success: true,
            duration_ms,
            error: None,
        },
        Err(error) => ReplayOutcome {
            index,
            method: recording.method,
            url: recording.url,
            original_status,
            replay_status: None,
            status_match: false,
            success: false,
            duration_ms,
            error: Some(error),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::Headers;
    use crate::server::journal::{MatchSummary, ServedResponse};

    fn recording(path: &str) -> RecordedRequest {
        RecordedRequest {
            timestamp: String::new(),
            method: "GET".to_string(),
            url: format!("http://127.0.0.1{path}"),
            path: path.to_string(),
            headers: Headers::new(),
            body: String::new(),
            match_info: MatchSummary {
                matched: false,
                score: None,
                matched_url: None,
                cache_hit: false,
                reason: String::new(),
            },
            response: ServedResponse {
                status: 200,
                headers: Headers::new(),
                body: String::new(),
            },
            duration_ms: 0.0,
        }
    }

    #[test]
    fn test_select_by_indices() {
        let all = vec![recording("/a"), recording("/b"), recording("/c")];
        let picked = select(all.clone(), Some(&[2, 0, 9]));
        let paths: Vec<(usize, &str)> = picked.iter().map(|(i, r)| (*i, r.path.as_str())).collect();
        assert_eq!(paths, vec![(2, "/c"), (0, "/a")]);
        assert_eq!(select(all, None).len(), 3);
    }

    #[test]
    fn test_summary_counts() {
        let outcome = |success: bool, status_match: bool| ReplayOutcome {
            index: 0,
            method: "GET".to_string(),
            url: String::new(),
            original_status: 200,
            replay_status: success.then_some(200),
            status_match,
            success,
            duration_ms: 0.0,
            error: None,
        };
        let summary = ReplaySummary::from_outcomes(vec![
            outcome(true, true),
            outcome(true, false),
            outcome(false, false),
        ]);
        assert_eq!(summary.total_replayed, 3);
        assert_eq!(summary.successful, 2);
        assert_eq!(summary.failed, 1);
        assert_eq!(summary.status_matches, 1);
        assert_eq!(summary.status_mismatches, 1);
    }

    #[tokio::test]
    async fn test_unreachable_target_fails_in_order() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let client = Client::new();
        let summary = replay_all(
            &client,
            &format!("http://{addr}"),
            select(vec![recording("/a"), recording("/b")], None),
            2,
        )
        .await;

        assert_eq!(summary.failed, 2);
        assert_eq!(summary.results[0].index, 0);
        assert_eq!(summary.results[1].index, 1);
        assert!(summary.results.iter().all(|r| r.error.is_some()));
    }
}
