//! HTTP transport used by the URL verifier.
//!
//! The verifier only needs "do one request, give me a status and the body".
//! That contract is the [`HttpTransport`] trait; [`ReqwestTransport`] is the
//! production implementation, and tests plug in scripted transports.

use crate::error::{FetchError, RedirectCheckError};
use crate::protocols::template::QueryTemplate;
use crate::types::HttpConfig;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use reqwest::{Client, Url};
use std::fmt;
use std::time::Duration;

/// Longest slice of an error body kept for diagnostics.
const MAX_DIAGNOSTIC_BODY: usize = 512;

/// Request methods the verifier uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// Existence probe, no body
    Head,
    /// Full fetch
    Get,
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Head => reqwest::Method::HEAD,
            Method::Get => reqwest::Method::GET,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Head => write!(f, "HEAD"),
            Method::Get => write!(f, "GET"),
        }
    }
}

/// A successful (200 or 206) response with its fully read body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

/// Performs one HTTP request.
///
/// Implementations must read the body to the end before returning, whatever
/// the status, so pooled connections are released. Statuses other than 200
/// and 206 are reported as [`FetchError::UnexpectedStatus`].
#[async_trait]
pub trait HttpTransport: Send + Sync {
    async fn fetch(&self, method: Method, url: &str) -> Result<FetchResponse, FetchError>;
}

/// reqwest-backed transport with default headers and templated query parameters.
#[derive(Clone)]
pub struct ReqwestTransport {
    client: Client,
    query: Vec<(String, QueryTemplate)>,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Build the client from transport settings.
    ///
    /// Caller-supplied headers are applied after the User-Agent and win on
    /// clash. Invalid header names or values and malformed query templates are
    /// configuration errors.
    pub fn new(config: &HttpConfig) -> Result<Self, RedirectCheckError> {
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_str(&config.user_agent).map_err(|e| {
                RedirectCheckError::config(format!(
                    "Invalid User-Agent '{}': {}",
                    config.user_agent, e
                ))
            })?,
        );

        for (name, value) in &config.headers {
            let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
                RedirectCheckError::config(format!("Invalid header name '{}': {}", name, e))
            })?;
            let header_value = HeaderValue::from_str(value).map_err(|e| {
                RedirectCheckError::config(format!("Invalid value for header '{}': {}", name, e))
            })?;
            headers.insert(header_name, header_value);
        }

        let mut builder = Client::builder()
            .timeout(config.timeout)
            .default_headers(headers);
        if let Some(max_idle) = config.pool_max_idle_per_host {
            builder = builder.pool_max_idle_per_host(max_idle);
        }
        let client = builder.build().map_err(|e| {
            RedirectCheckError::network(format!("Failed to create HTTP client: {}", e))
        })?;

        let query = config
            .query
            .iter()
            .map(|(name, value)| Ok((name.clone(), QueryTemplate::parse(value)?)))
            .collect::<Result<Vec<_>, RedirectCheckError>>()?;

        Ok(Self {
            client,
            query,
            timeout: config.timeout,
        })
    }

    /// Apply the configured query parameters, replacing same-named ones.
    /// Surrounding whitespace is not part of the request target.
    fn target_url(&self, url: &str) -> Result<Url, FetchError> {
        let mut parsed = Url::parse(url.trim())
            .map_err(|e| FetchError::transport(url, format!("invalid URL: {}", e)))?;

        if self.query.is_empty() {
            return Ok(parsed);
        }

        let kept: Vec<(String, String)> = parsed
            .query_pairs()
            .filter(|(k, _)| !self.query.iter().any(|(name, _)| name == k))
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        {
            let mut pairs = parsed.query_pairs_mut();
            pairs.clear();
            for (k, v) in &kept {
                pairs.append_pair(k, v);
            }
            for (name, template) in &self.query {
                pairs.append_pair(name, &template.render());
            }
        }
        Ok(parsed)
    }

    fn map_send_error(&self, url: &str, err: reqwest::Error) -> FetchError {
        if err.is_timeout() {
            FetchError::timeout(url, self.timeout)
        } else if err.is_connect() {
            FetchError::transport(url, format!("connection failed: {}", err))
        } else {
            FetchError::transport(url, err.to_string())
        }
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn fetch(&self, method: Method, url: &str) -> Result<FetchResponse, FetchError> {
        let target = self.target_url(url)?;

        let response = self
            .client
            .request(method.into(), target)
            .send()
            .await
            .map_err(|e| self.map_send_error(url, e))?;

        let status = response.status().as_u16();
        let content_length = response.content_length();
        // Drain the body in every case so the connection goes back to the pool
        let body = response.bytes().await;

        match status {
            200 | 206 => {
                let body = match body {
                    Ok(bytes) => bytes.to_vec(),
                    Err(e) => {
                        tracing::debug!(%url, %method, error = %e, "could not read response body");
                        Vec::new()
                    }
                };
                tracing::debug!(%url, %method, status, ?content_length, "request completed");
                Ok(FetchResponse { status, body })
            }
            _ => {
                let snippet = match body {
                    Ok(bytes) => {
                        let end = bytes.len().min(MAX_DIAGNOSTIC_BODY);
                        String::from_utf8_lossy(&bytes[..end]).into_owned()
                    }
                    Err(e) => {
                        tracing::debug!(%url, %method, error = %e, "could not read error body");
                        String::new()
                    }
                };
                tracing::debug!(%url, %method, status, body = %snippet, "unexpected status code received");
                Err(FetchError::unexpected_status(url, status, snippet))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn transport_with_query(query: &[(&str, &str)]) -> ReqwestTransport {
        let mut config = HttpConfig::default();
        for (k, v) in query {
            config.query.insert(k.to_string(), v.to_string());
        }
        ReqwestTransport::new(&config).unwrap()
    }

    #[test]
    fn test_client_creation() {
        assert!(ReqwestTransport::new(&HttpConfig::default()).is_ok());
    }

    #[test]
    fn test_invalid_header_is_config_error() {
        let mut config = HttpConfig::default();
        config.headers.insert("bad header".to_string(), "x".to_string());
        let err = ReqwestTransport::new(&config).err().unwrap();
        assert!(matches!(err, RedirectCheckError::ConfigError { .. }));
    }

    #[test]
    fn test_invalid_template_is_config_error() {
        let mut config = HttpConfig::default();
        config.query.insert("t".to_string(), "{{ later }}".to_string());
        assert!(ReqwestTransport::new(&config).is_err());
    }

    #[test]
    fn test_target_url_without_query_is_unchanged() {
        let transport = transport_with_query(&[]);
        let url = transport.target_url("https://shop.example/p?id=3").unwrap();
        assert_eq!(url.as_str(), "https://shop.example/p?id=3");
    }

    #[test]
    fn test_target_url_ignores_padding() {
        let transport = transport_with_query(&[]);
        let url = transport.target_url("  https://shop.example/p \t").unwrap();
        assert_eq!(url.as_str(), "https://shop.example/p");
        assert!(transport.target_url(" ").is_err());
    }

    #[test]
    fn test_target_url_sets_query_values() {
        let transport = transport_with_query(&[("hello", "world"), ("id", "9")]);
        let url = transport
            .target_url("https://shop.example/p?id=3&keep=1")
            .unwrap();
        let pairs: Vec<(String, String)> = url
            .query_pairs()
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect();

        assert!(pairs.contains(&("keep".to_string(), "1".to_string())));
        assert!(pairs.contains(&("hello".to_string(), "world".to_string())));
        assert!(pairs.contains(&("id".to_string(), "9".to_string())));
        assert!(!pairs.contains(&("id".to_string(), "3".to_string())));
    }

    #[test]
    fn test_target_url_renders_now() {
        let transport = transport_with_query(&[("t", "{{ now }}")]);
        let url = transport.target_url("https://shop.example/").unwrap();
        let t = url
            .query_pairs()
            .find(|(k, _)| k == "t")
            .map(|(_, v)| v.into_owned())
            .unwrap();
        assert!(t.parse::<u128>().is_ok());
    }

    #[test]
    fn test_invalid_url_is_transport_error() {
        let transport = transport_with_query(&[]);
        let err = transport.target_url("not a url").unwrap_err();
        assert!(err.needs_fallback());
        assert_eq!(err.status(), None);
    }

    #[tokio::test]
    async fn test_unreachable_host_is_transport_error() {
        let mut config = HttpConfig::default();
        config.timeout = Duration::from_secs(2);
        let transport = ReqwestTransport::new(&config).unwrap();
        // Port 9 on localhost is expected to refuse connections; a proxy in
        // the environment turns that into a 5xx instead
        let err = transport
            .fetch(Method::Head, "http://127.0.0.1:9/")
            .await
            .unwrap_err();
        assert!(err.needs_fallback());
    }
}
