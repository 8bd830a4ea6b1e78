//! Bounded journals of served requests.

use crate::capture::Headers;
use crate::matching::MatchScore;
use parking_lot::Mutex;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::VecDeque;

/// Live request entries retained for the admin API.
pub const LIVE_REQUEST_LIMIT: usize = 100;

/// FIFO journal; the oldest entry is dropped once `limit` is reached.
/// A limit of 0 means unbounded.
#[derive(Debug)]
pub struct Journal<T> {
    limit: usize,
    entries: Mutex<VecDeque<T>>,
}

impl<T: Clone> Journal<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            entries: Mutex::new(VecDeque::new()),
        }
    }

    pub fn push(&self, entry: T) {
        let mut entries = self.entries.lock();
        if self.limit > 0 {
            while entries.len() >= self.limit {
                entries.pop_front();
            }
        }
        entries.push_back(entry);
    }

    pub fn snapshot(&self) -> Vec<T> {
        self.entries.lock().iter().cloned().collect()
    }

    pub fn latest(&self) -> Option<T> {
        self.entries.lock().back().cloned()
    }

    pub fn clear(&self) -> usize {
        let mut entries = self.entries.lock();
        let count = entries.len();
        entries.clear();
        count
    }

    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct MatchSummary {
    pub matched: bool,
    pub score: Option<f64>,
    pub matched_url: Option<String>,
    pub cache_hit: bool,
    pub reason: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct ServedResponse {
    pub status: u16,
    pub headers: Headers,
    pub body: String,
}

/// A served request kept for export and replay.
#[derive(Debug, Clone, Serialize)]
pub struct RecordedRequest {
    pub timestamp: String,
    pub method: String,
    pub url: String,
    /// Path plus query, used to replay against this server
    pub path: String,
    pub headers: Headers,
    pub body: String,
    #[serde(rename = "match")]
    pub match_info: MatchSummary,
    pub response: ServedResponse,
    pub duration_ms: f64,
}

impl RecordedRequest {
    /// The entry in capture-corpus form, so exports can be served again.
    pub fn to_capture_json(&self) -> Value {
        json!({
            "method": self.method,
            "url": self.url,
            "req_headers": self.headers,
            "req_body": self.body,
            "status": self.response.status,
            "resp_headers": self.response.headers,
            "resp_body": self.response.body,
            "timestamp": self.timestamp,
        })
    }
}

/// Wrap recordings in the corpus document shape.
pub fn export_recordings(recordings: &[RecordedRequest]) -> Value {
    let now = chrono::Utc::now();
    json!({
        "session": format!("recording-{}", now.format("%Y%m%d-%H%M%S")),
        "exported_at": now.to_rfc3339(),
        "total_requests": recordings.len(),
        "requests": recordings.iter().map(RecordedRequest::to_capture_json).collect::<Vec<_>>(),
    })
}

/// One row of the live request feed.
#[derive(Debug, Clone, Serialize)]
pub struct LiveRequest {
    pub timestamp: String,
    pub method: String,
    pub path: String,
    pub status: u16,
    pub matched: bool,
    pub cache_hit: bool,
    pub duration_ms: f64,
    pub matched_url: Option<String>,
    pub score: Option<MatchScore>,
    pub reason: String,
}
