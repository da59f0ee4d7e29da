//! In-memory transport serving canned responses.
//!
//! Used by the test suites and the aggregation bench; never touches the
//! network. Unknown URLs answer 404.

use std::collections::HashMap;
use std::sync::Mutex;
use std::time::Duration;

use super::transport::{RawResponse, Transport, TransportError};

type Scripted = Result<RawResponse, TransportError>;

#[derive(Default)]
pub struct FixtureTransport {
    /// Responses per URL, served in order; the last one repeats.
    scripts: HashMap<String, Vec<Scripted>>,
    latency: HashMap<String, Duration>,
    hits: Mutex<HashMap<String, usize>>,
}

impl FixtureTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve the same status and body on every request to `url`.
    pub fn with_page(mut self, url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) -> Self {
        self.scripts
            .insert(url.into(), vec![Ok(RawResponse::new(status, body))]);
        self
    }

    /// Serve `responses` in order; the final entry is repeated once exhausted.
    pub fn with_sequence(mut self, url: impl Into<String>, responses: Vec<Scripted>) -> Self {
        self.scripts.insert(url.into(), responses);
        self
    }

    /// Delay every request to `url` by `delay` before answering.
    pub fn with_latency(mut self, url: impl Into<String>, delay: Duration) -> Self {
        self.latency.insert(url.into(), delay);
        self
    }

    /// Register a page after construction.
    pub fn insert_page(&mut self, url: impl Into<String>, status: u16, body: impl Into<Vec<u8>>) {
        self.scripts
            .insert(url.into(), vec![Ok(RawResponse::new(status, body))]);
    }

    /// Number of requests made for `url`.
    pub fn hits(&self, url: &str) -> usize {
        self.hits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .get(url)
            .copied()
            .unwrap_or(0)
    }

    /// Total requests across all URLs.
    pub fn total_hits(&self) -> usize {
        self.hits
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .values()
            .sum()
    }
}

impl Transport for FixtureTransport {
    fn get(&self, url: &str) -> Result<RawResponse, TransportError> {
        let nth = {
            let mut hits = self.hits.lock().unwrap_or_else(|e| e.into_inner());
            let count = hits.entry(url.to_string()).or_insert(0);
            *count += 1;
            *count - 1
        };

        if let Some(delay) = self.latency.get(url) {
            std::thread::sleep(*delay);
        }

        match self.scripts.get(url) {
            Some(script) if !script.is_empty() => script[nth.min(script.len() - 1)].clone(),
            _ => Ok(RawResponse::new(404, "")),
        }
    }
}
