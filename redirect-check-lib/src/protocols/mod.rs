//! Protocol implementations for URL verification.
//!
//! This module contains the HTTP transport seam and the verifier built on it.

/// HTTP transport trait and the reqwest implementation
pub mod http;

/// Query value templates (`{{ now }}`)
pub mod template;

/// Two-step URL probe
pub mod verifier;

#[cfg(test)]
pub(crate) mod test_support;

// Re-export commonly used functions and types
pub use http::{FetchResponse, HttpTransport, Method, ReqwestTransport};
pub use template::QueryTemplate;
pub use verifier::{sanitize_status, ProbeResult, UrlVerifier};
