//! # Redirect Check Library
//!
//! Bulk verification of URL pairs for redirect planning. Each input row lists
//! up to three source/destination pairs; every pair is checked over HTTP and
//! classified as needing a redirect, a link change, or manual analysis.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use redirect_check_lib::{Pipeline, RunConfig};
//! use tokio_util::sync::CancellationToken;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = RunConfig::default().with_workers(20).with_rate(5);
//!     let pipeline = Pipeline::new(config)?;
//!     let summary = pipeline
//!         .run_files("links.csv", "output.csv", CancellationToken::new())
//!         .await?;
//!
//!     println!("{} redirects needed", summary.redirect);
//!     Ok(())
//! }
//! ```
//!
//! ## Features
//!
//! - **Two-step probe**: HEAD first, GET fallback on transport errors or 5xx
//! - **Admission control**: token-bucket rate limit in front of a bounded queue
//! - **Bounded concurrency**: fixed worker pool, pairs and URL ends checked in parallel
//! - **Streaming output**: every result is flushed as soon as it is known
//! - **Layered configuration**: TOML files, `RC_*` environment variables, builders

// Re-export main public API types and functions
// This makes them available as redirect_check_lib::TypeName
pub use classifier::{classify, outcome_for};
pub use config::{
    load_env_config, parse_duration, parse_timeout_string, validate_workers, ConfigManager,
    EnvConfig, FileConfig,
};
pub use error::{AdmissionError, FetchError, RedirectCheckError, RowError};
pub use input::{read_rows, read_rows_from_path};
pub use pipeline::{survey, Dispatcher, InputSurvey, Pipeline, RunStats};
pub use protocols::{
    sanitize_status, FetchResponse, HttpTransport, Method, ProbeResult, QueryTemplate,
    ReqwestTransport, UrlVerifier,
};
pub use rate_limiter::AdmissionLimiter;
pub use schema::{PairFields, Row, RowSchema};
pub use types::{
    Action, HttpConfig, Outcome, ProbeStrategy, RunConfig, RunSummary, UrlPair, OUTPUT_HEADER,
    TRANSPORT_FAILURE_STATUS,
};
pub use utils::parse_key_value;
pub use writer::ResultWriter;

// Internal modules - these are not part of the public API
mod classifier;
mod config;
mod error;
mod input;
mod pipeline;
mod protocols;
mod rate_limiter;
mod schema;
mod types;
mod utils;
mod writer;

// Type alias for convenience
pub type Result<T> = std::result::Result<T, RedirectCheckError>;

// Library version and metadata
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
