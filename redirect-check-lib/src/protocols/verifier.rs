//! URL verification: existence probe with full-fetch fallback.
//!
//! The checking process for one URL:
//! 1. HEAD the URL (skipped with [`ProbeStrategy::GetOnly`])
//! 2. If HEAD failed at the transport level or answered >= 500, GET the URL
//!    and use that status instead
//! 3. A GET answering 200/206 with a 1 to 3 byte body counts as 404
//!
//! Failures are never returned as errors. A URL that cannot be reached at all
//! gets [`TRANSPORT_FAILURE_STATUS`], so the classifier always has two numbers.

use crate::error::FetchError;
use crate::protocols::http::{HttpTransport, Method};
use crate::types::{ProbeStrategy, TRANSPORT_FAILURE_STATUS};
use std::sync::Arc;

/// Final word on one URL.
#[derive(Debug, Clone, PartialEq)]
pub struct ProbeResult {
    pub status: u16,
    /// Method of the request whose status was kept
    pub method: Method,
    /// Error of the request whose status was kept, if it failed
    pub error: Option<FetchError>,
}

impl ProbeResult {
    fn ok(status: u16, method: Method) -> Self {
        Self {
            status,
            method,
            error: None,
        }
    }

    fn failed(method: Method, error: FetchError) -> Self {
        Self {
            status: error.status().unwrap_or(TRANSPORT_FAILURE_STATUS),
            method,
            error: Some(error),
        }
    }
}

/// Near-empty success bodies are treated as missing content.
pub fn sanitize_status(status: u16, body_len: usize) -> u16 {
    if matches!(status, 200 | 206) && (1..=3).contains(&body_len) {
        404
    } else {
        status
    }
}

/// Verifies URLs through an [`HttpTransport`].
#[derive(Clone)]
pub struct UrlVerifier {
    transport: Arc<dyn HttpTransport>,
    strategy: ProbeStrategy,
}

impl UrlVerifier {
    pub fn new(transport: Arc<dyn HttpTransport>, strategy: ProbeStrategy) -> Self {
        Self {
            transport,
            strategy,
        }
    }

    /// Probe one URL and return its final status.
    pub async fn verify(&self, url: &str) -> ProbeResult {
        if self.strategy == ProbeStrategy::GetOnly {
            return self.full_fetch(url).await;
        }

        match self.transport.fetch(Method::Head, url).await {
            Ok(response) if response.status < 500 => ProbeResult::ok(response.status, Method::Head),
            Ok(response) => {
                tracing::debug!(%url, status = response.status, "probe answered with server error, fetching");
                self.full_fetch(url).await
            }
            Err(e) if e.needs_fallback() => {
                tracing::debug!(%url, error = %e, timed_out = e.is_timeout(), "probe failed, fetching");
                self.full_fetch(url).await
            }
            Err(e) => {
                tracing::debug!(%url, error = %e, "probe answered");
                ProbeResult::failed(Method::Head, e)
            }
        }
    }

    /// Verify both ends of a pair concurrently: (source, destination).
    pub async fn verify_pair(&self, source: &str, destination: &str) -> (ProbeResult, ProbeResult) {
        tokio::join!(self.verify(source), self.verify(destination))
    }

    async fn full_fetch(&self, url: &str) -> ProbeResult {
        match self.transport.fetch(Method::Get, url).await {
            Ok(response) => {
                let status = sanitize_status(response.status, response.body.len());
                if status != response.status {
                    tracing::debug!(
                        %url,
                        status = response.status,
                        body_len = response.body.len(),
                        "near-empty body, counting as not found"
                    );
                }
                ProbeResult::ok(status, Method::Get)
            }
            Err(e @ FetchError::Transport { .. }) => {
                tracing::warn!(%url, error = %e, timed_out = e.is_timeout(), "url unreachable");
                ProbeResult::failed(Method::Get, e)
            }
            Err(e) => {
                tracing::debug!(%url, error = %e, "fetch answered");
                ProbeResult::failed(Method::Get, e)
            }
        }
    }
}
