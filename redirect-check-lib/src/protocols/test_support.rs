//! Scripted transport for unit tests.

use crate::error::FetchError;
use crate::protocols::http::{FetchResponse, HttpTransport, Method};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

#[derive(Default)]
pub(crate) struct ScriptedTransport {
    replies: HashMap<(Method, String), Result<FetchResponse, FetchError>>,
    delay: Option<Duration>,
    calls: Mutex<Vec<(Method, String)>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedTransport {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Reply `status` with `body` to `method url`. Non 200/206 become UnexpectedStatus.
    pub(crate) fn reply(mut self, method: Method, url: &str, status: u16, body: &[u8]) -> Self {
        let result = if status == 200 || status == 206 {
            Ok(FetchResponse {
                status,
                body: body.to_vec(),
            })
        } else {
            Err(FetchError::unexpected_status(
                url,
                status,
                String::from_utf8_lossy(body).into_owned(),
            ))
        };
        self.replies.insert((method, url.to_string()), result);
        self
    }

    /// Same status for HEAD and GET; GET gets a realistic body.
    pub(crate) fn page(self, url: &str, status: u16) -> Self {
        self.reply(Method::Head, url, status, b"")
            .reply(Method::Get, url, status, b"<html>page</html>")
    }

    pub(crate) fn fail(mut self, method: Method, url: &str) -> Self {
        self.replies.insert(
            (method, url.to_string()),
            Err(FetchError::transport(url, "connection refused")),
        );
        self
    }

    pub(crate) fn calls(&self) -> Vec<(Method, String)> {
        self.calls.lock().unwrap().clone()
    }

    /// Highest number of requests that were running at the same time.
    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn fetch(&self, method: Method, url: &str) -> Result<FetchResponse, FetchError> {
        self.calls.lock().unwrap().push((method, url.to_string()));
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.replies
            .get(&(method, url.to_string()))
            .cloned()
            .unwrap_or_else(|| Err(FetchError::transport(url, "no scripted reply")))
    }
}
