//! Core data types for redirect verification.
//!
//! This module defines the run configuration, the classification outcome
//! written to the result file, and the summary reported at the end of a run.

use crate::schema::RowSchema;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;

/// Header record of the result CSV. Downstream tooling matches it exactly.
pub const OUTPUT_HEADER: [&str; 6] = ["Sku", "De", "Para", "Status", "De Status", "Para Status"];

/// Status recorded when no response could be obtained for a URL.
pub const TRANSPORT_FAILURE_STATUS: u16 = 500;

/// Action suggested for a source/destination pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Action {
    /// Destination already resolves; needs a manual look.
    #[serde(rename = "ANALISAR")]
    Analyze,

    /// Source is live and destination is broken; a redirect should be created.
    #[serde(rename = "REDIRECIONAR")]
    Redirect,

    /// Neither resolves cleanly; content must be changed.
    #[serde(rename = "ALTERAR")]
    Change,
}

impl Action {
    /// The label written to the result file.
    pub fn label(&self) -> &'static str {
        match self {
            Action::Analyze => "ANALISAR",
            Action::Redirect => "REDIRECIONAR",
            Action::Change => "ALTERAR",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// A source/destination pair taken from one input row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UrlPair {
    /// Name of the schema entry the pair came from (e.g. "primary")
    pub name: String,
    pub source: String,
    pub destination: String,
}

/// Verdict for one eligible pair. One of these becomes one output record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Outcome {
    pub identifier: String,
    pub source: String,
    pub destination: String,
    pub action: Action,
    pub source_status: u16,
    pub destination_status: u16,
}

impl Outcome {
    /// Fields in output column order.
    pub fn to_record(&self) -> [String; 6] {
        [
            self.identifier.clone(),
            self.source.clone(),
            self.destination.clone(),
            self.action.label().to_string(),
            self.source_status.to_string(),
            self.destination_status.to_string(),
        ]
    }
}

/// How a single URL is probed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ProbeStrategy {
    /// HEAD first, GET only when HEAD fails or returns a server error.
    #[default]
    #[serde(rename = "head")]
    HeadThenGet,

    /// Always GET.
    #[serde(rename = "get")]
    GetOnly,
}

impl ProbeStrategy {
    /// Parse the config/CLI spelling ("head" or "get").
    pub fn parse(value: &str) -> Option<Self> {
        match value.trim().to_lowercase().as_str() {
            "head" | "head-then-get" => Some(Self::HeadThenGet),
            "get" | "get-only" => Some(Self::GetOnly),
            _ => None,
        }
    }
}

impl fmt::Display for ProbeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProbeStrategy::HeadThenGet => write!(f, "head-then-get"),
            ProbeStrategy::GetOnly => write!(f, "get-only"),
        }
    }
}

/// Settings for the HTTP transport.
#[derive(Debug, Clone, PartialEq)]
pub struct HttpConfig {
    /// Timeout for a single request, body included
    /// Default: 210 seconds
    pub timeout: Duration,

    /// Value of the User-Agent header
    pub user_agent: String,

    /// Extra headers; override the defaults on name clash
    pub headers: BTreeMap<String, String>,

    /// Query parameters added to every request. Values may contain `{{ now }}`.
    pub query: BTreeMap<String, String>,

    /// Upper bound of idle pooled connections per host (None = reqwest default)
    pub pool_max_idle_per_host: Option<usize>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(210),
            user_agent: default_user_agent(),
            headers: BTreeMap::new(),
            query: BTreeMap::new(),
            pool_max_idle_per_host: None,
        }
    }
}

/// User-Agent sent when none is configured.
pub fn default_user_agent() -> String {
    format!("redirect-check/{}", env!("CARGO_PKG_VERSION"))
}

/// Configuration of one verification run.
///
/// Admission rate and worker count are separate knobs: the rate
/// bounds how fast new rows enter the pipeline, the worker count bounds how
/// many rows are in flight.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    /// Number of concurrent row workers
    /// Default: 50, Range: 1-500
    pub workers: usize,

    /// Rows admitted per second (token bucket, burst 1)
    /// Default: 10
    pub rate_per_second: u32,

    /// Capacity of the bounded row queue
    /// Default: 200
    pub queue_capacity: usize,

    /// Longest wait for one admission token before the row is given up
    /// Default: 30 seconds
    pub admission_timeout: Duration,

    /// Pause after a row could not be admitted
    /// Default: 1 second
    pub admission_backoff: Duration,

    /// Probe policy for each URL
    pub probe: ProbeStrategy,

    /// Transport settings
    pub http: HttpConfig,

    /// Input row layout
    pub schema: RowSchema,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            workers: 50,
            rate_per_second: 10,
            queue_capacity: 200,
            admission_timeout: Duration::from_secs(30),
            admission_backoff: Duration::from_secs(1),
            probe: ProbeStrategy::default(),
            http: HttpConfig::default(),
            schema: RowSchema::default(),
        }
    }
}

impl RunConfig {
    /// Set the worker count, capped to 1..=500.
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.clamp(1, 500);
        self
    }

    /// Set the admission rate; zero is raised to one.
    pub fn with_rate(mut self, rate_per_second: u32) -> Self {
        self.rate_per_second = rate_per_second.max(1);
        self
    }

    pub fn with_queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.http.timeout = timeout;
        self
    }

    pub fn with_admission_timeout(mut self, timeout: Duration) -> Self {
        self.admission_timeout = timeout;
        self
    }

    pub fn with_admission_backoff(mut self, backoff: Duration) -> Self {
        self.admission_backoff = backoff;
        self
    }

    pub fn with_probe(mut self, probe: ProbeStrategy) -> Self {
        self.probe = probe;
        self
    }

    pub fn with_schema(mut self, schema: RowSchema) -> Self {
        self.schema = schema;
        self
    }

    pub fn with_header<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.http.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_query<K: Into<String>, V: Into<String>>(mut self, name: K, value: V) -> Self {
        self.http.query.insert(name.into(), value.into());
        self
    }
}

/// Counters reported at the end of a run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RunSummary {
    /// Data rows in the input (header excluded): admitted + skipped + not admitted
    pub rows_read: usize,
    /// Rows that got an admission token and entered the queue
    pub rows_admitted: usize,
    /// Malformed rows skipped before admission
    pub rows_skipped: usize,
    /// Well-formed rows refused by the rate limiter or left behind on cancellation
    pub rows_not_admitted: usize,
    /// Eligible pairs classified and written
    pub pairs_evaluated: usize,
    pub analyze: usize,
    pub redirect: usize,
    pub change: usize,
    pub duration_ms: u128,
    pub cancelled: bool,
}
