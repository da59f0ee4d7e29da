//! Retrying fetch primitive.
//!
//! One logical fetch = up to `max_attempts` requests with a fixed sleep
//! between them. Non-2xx responses and timeouts are retried; a body that
//! arrives but cannot be parsed fails immediately, as does a connection that
//! cannot be established at all. The fetcher knows nothing about fields.

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::debug;

use super::document::{Document, Format};
use super::transport::{Transport, TransportError};

/// Attempt count and inter-attempt delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            delay: Duration::from_secs(1),
        }
    }
}

impl RetryPolicy {
    /// No sleeping between attempts. For tests and benches.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            delay: Duration::ZERO,
        }
    }
}

/// Result of a single request attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AttemptOutcome {
    Parsed,
    HttpStatus(u16),
    Timeout,
    ParseFailure,
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FetchError {
    #[error("gave up on {url} after {attempts} attempts (last status {})", fmt_status(.last_status))]
    Exhausted {
        url: String,
        attempts: u32,
        last_status: Option<u16>,
    },

    #[error("timed out fetching {url} ({attempts} attempts)")]
    Timeout { url: String, attempts: u32 },

    #[error("host unreachable for {url}: {reason}")]
    Unreachable { url: String, reason: String },

    #[error("could not parse {url}: {reason}")]
    Parse { url: String, reason: String },
}

fn fmt_status(status: &Option<u16>) -> String {
    status.map_or_else(|| "none".to_string(), |s| s.to_string())
}

impl FetchError {
    /// Connectivity failures are transient at the session level.
    pub fn is_connectivity(&self) -> bool {
        matches!(self, Self::Unreachable { .. })
    }

    pub fn url(&self) -> &str {
        match self {
            Self::Exhausted { url, .. }
            | Self::Timeout { url, .. }
            | Self::Unreachable { url, .. }
            | Self::Parse { url, .. } => url,
        }
    }
}

/// Shared by every field task of every symbol; cheap to clone.
#[derive(Clone)]
pub struct RetryingFetcher {
    transport: Arc<dyn Transport>,
    policy: RetryPolicy,
}

impl RetryingFetcher {
    pub fn new(transport: Arc<dyn Transport>, policy: RetryPolicy) -> Self {
        Self { transport, policy }
    }

    pub fn policy(&self) -> RetryPolicy {
        self.policy
    }

    pub fn fetch(&self, url: &str, format: Format) -> Result<Document, FetchError> {
        let attempts = self.policy.max_attempts.max(1);
        let mut last = AttemptOutcome::Timeout;
        let mut last_status = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                std::thread::sleep(self.policy.delay);
            }

            match self.transport.get(url) {
                Ok(resp) if resp.is_success() => {
                    return match Document::parse(url, format, resp.body) {
                        Ok(doc) => {
                            debug!(url, attempt, outcome = ?AttemptOutcome::Parsed, "fetched");
                            Ok(doc)
                        }
                        Err(reason) => {
                            debug!(url, attempt, outcome = ?AttemptOutcome::ParseFailure, %reason, "unparseable body");
                            Err(FetchError::Parse {
                                url: url.to_string(),
                                reason,
                            })
                        }
                    };
                }
                Ok(resp) => {
                    last = AttemptOutcome::HttpStatus(resp.status);
                    last_status = Some(resp.status);
                    debug!(url, attempt, outcome = ?last, "non-success status");
                }
                Err(TransportError::Timeout(reason)) => {
                    last = AttemptOutcome::Timeout;
                    debug!(url, attempt, outcome = ?last, %reason, "timed out");
                }
                Err(TransportError::Connect(reason)) => {
                    debug!(url, attempt, %reason, "connection failed");
                    return Err(FetchError::Unreachable {
                        url: url.to_string(),
                        reason,
                    });
                }
                Err(TransportError::Other(reason)) => {
                    // Counted as a failed attempt with no status.
                    last = AttemptOutcome::HttpStatus(0);
                    debug!(url, attempt, %reason, "request failed");
                }
            }
        }

        Err(match last {
            AttemptOutcome::Timeout => FetchError::Timeout {
                url: url.to_string(),
                attempts,
            },
            _ => FetchError::Exhausted {
                url: url.to_string(),
                attempts,
                last_status,
            },
        })
    }
}
