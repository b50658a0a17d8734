//! Error handling for redirect verification.
//!
//! Only [`RedirectCheckError`] ever ends a run. The other error types describe
//! per-row and per-URL failures that the pipeline absorbs and turns into
//! skipped rows or status codes.

use std::time::Duration;
use thiserror::Error;

/// Fatal error type for a verification run.
///
/// These cover setup failures (configuration, input and output files) and
/// explicit cancellation. Anything that goes wrong with a single row or URL
/// is handled locally and never surfaces here.
#[derive(Debug, Clone, Error)]
pub enum RedirectCheckError {
    /// Configuration errors (invalid settings, unparsable config file, etc.)
    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    /// Input file could not be opened or read
    #[error("Input error at '{path}': {message}")]
    InputError { path: String, message: String },

    /// Output file could not be created or written
    #[error("Output error at '{path}': {message}")]
    OutputError { path: String, message: String },

    /// Generic file errors (config files)
    #[error("File error at '{path}': {message}")]
    FileError { path: String, message: String },

    /// The HTTP client could not be built
    #[error("Network error: {message}")]
    NetworkError { message: String },

    /// The run was stopped through the cancellation token
    #[error("Run cancelled")]
    Cancelled,

    /// Generic internal errors that don't fit other categories
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl RedirectCheckError {
    /// Create a new configuration error.
    pub fn config<M: Into<String>>(message: M) -> Self {
        Self::ConfigError {
            message: message.into(),
        }
    }

    /// Create a new input file error.
    pub fn input<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::InputError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new output file error.
    pub fn output<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::OutputError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new file error.
    pub fn file_error<P: Into<String>, M: Into<String>>(path: P, message: M) -> Self {
        Self::FileError {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a new network error.
    pub fn network<M: Into<String>>(message: M) -> Self {
        Self::NetworkError {
            message: message.into(),
        }
    }

    /// Create a new internal error.
    pub fn internal<M: Into<String>>(message: M) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

}

impl From<std::io::Error> for RedirectCheckError {
    fn from(err: std::io::Error) -> Self {
        Self::Internal {
            message: format!("I/O error: {}", err),
        }
    }
}

impl From<toml::de::Error> for RedirectCheckError {
    fn from(err: toml::de::Error) -> Self {
        Self::ConfigError {
            message: format!("Failed to parse TOML configuration: {}", err),
        }
    }
}

/// Failure of a single HTTP request made through the transport.
///
/// `UnexpectedStatus` still carries the status code: the verifier feeds it to
/// the classifier instead of discarding it.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum FetchError {
    /// DNS, connection, TLS or timeout failure. No status was received.
    #[error("request to '{url}' failed: {message}")]
    Transport {
        url: String,
        message: String,
        timed_out: bool,
    },

    /// A response arrived with a status other than 200 or 206.
    #[error("unexpected status {status} from '{url}'")]
    UnexpectedStatus {
        url: String,
        status: u16,
        body: String,
    },
}

impl FetchError {
    pub fn transport<U: Into<String>, M: Into<String>>(url: U, message: M) -> Self {
        Self::Transport {
            url: url.into(),
            message: message.into(),
            timed_out: false,
        }
    }

    pub fn timeout<U: Into<String>>(url: U, after: Duration) -> Self {
        Self::Transport {
            url: url.into(),
            message: format!("timed out after {:?}", after),
            timed_out: true,
        }
    }

    pub fn unexpected_status<U: Into<String>, B: Into<String>>(
        url: U,
        status: u16,
        body: B,
    ) -> Self {
        Self::UnexpectedStatus {
            url: url.into(),
            status,
            body: body.into(),
        }
    }

    /// Status code received from the server, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Transport { .. } => None,
            Self::UnexpectedStatus { status, .. } => Some(*status),
        }
    }

    /// Whether the request gave up waiting for a response.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Transport { timed_out: true, .. })
    }

    /// Whether this failure should trigger the full-fetch fallback of a probe.
    pub fn needs_fallback(&self) -> bool {
        match self {
            Self::Transport { .. } => true,
            Self::UnexpectedStatus { status, .. } => *status >= 500,
        }
    }
}

/// A malformed input row. Always skipped, never fatal.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum RowError {
    #[error("line {line}: expected at least {expected} fields, found {found}")]
    TooShort {
        line: u64,
        expected: usize,
        found: usize,
    },

    #[error("line {line}: {message}")]
    Parse { line: u64, message: String },
}

impl RowError {
    pub fn line(&self) -> u64 {
        match self {
            Self::TooShort { line, .. } | Self::Parse { line, .. } => *line,
        }
    }
}

/// Why the rate limiter refused to hand out an admission token.
#[derive(Debug, Clone, Copy, Error, PartialEq, Eq)]
pub enum AdmissionError {
    #[error("admission cancelled")]
    Cancelled,

    #[error("no admission token within {0:?}")]
    TimedOut(Duration),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_error_fallback_rules() {
        assert!(FetchError::transport("http://a", "dns error").needs_fallback());
        assert!(FetchError::unexpected_status("http://a", 503, "").needs_fallback());
        assert!(FetchError::unexpected_status("http://a", 500, "").needs_fallback());
        assert!(!FetchError::unexpected_status("http://a", 404, "").needs_fallback());
        assert!(!FetchError::unexpected_status("http://a", 301, "").needs_fallback());
    }

    #[test]
    fn test_fetch_error_status() {
        assert_eq!(FetchError::timeout("http://a", Duration::from_secs(1)).status(), None);
        assert_eq!(
            FetchError::unexpected_status("http://a", 410, "gone").status(),
            Some(410)
        );
    }

    #[test]
    fn test_timeout_is_flagged() {
        assert!(FetchError::timeout("http://a", Duration::from_secs(3)).is_timeout());
        assert!(!FetchError::transport("http://a", "dns error").is_timeout());
        assert!(!FetchError::unexpected_status("http://a", 504, "").is_timeout());
    }

    #[test]
    fn test_row_error_display() {
        let err = RowError::TooShort {
            line: 4,
            expected: 14,
            found: 3,
        };
        assert_eq!(err.line(), 4);
        assert_eq!(
            err.to_string(),
            "line 4: expected at least 14 fields, found 3"
        );
    }
}
