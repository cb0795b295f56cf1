//! HTTP client wrapper used by the crawler and the transfer engine.
//!
//! Three kinds of request go through [`HttpClient`]: a GET for a listing page
//! (whole body as text), a HEAD probe for the expected size of a file, and a
//! streamed GET for a file transfer. Any non-2xx status is an error.

use std::time::Duration;

use reqwest::Client;
use reqwest::header::CONTENT_LENGTH;
use tracing::{debug, instrument};
use url::Url;

use super::constants::{CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS};
use super::error::DownloadError;
use crate::user_agent;

/// HTTP client for listing fetches, size probes and streamed transfers.
///
/// Created once per process and cloned into every crawl and transfer,
/// taking advantage of connection pooling.
#[derive(Debug, Clone)]
pub struct HttpClient {
    client: Client,
}

impl Default for HttpClient {
    fn default() -> Self {
        Self::new()
    }
}

impl HttpClient {
    /// Creates a new HTTP client with default timeouts.
    ///
    /// Default configuration:
    /// - Connect timeout: 30 seconds
    /// - Read timeout: 5 minutes between body reads (no cap on total time)
    /// - Gzip decompression: enabled
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the static
    /// configuration. This should never happen in practice.
    #[must_use]
    pub fn new() -> Self {
        Self::new_with_timeouts(CONNECT_TIMEOUT_SECS, READ_TIMEOUT_SECS)
    }

    /// Creates a new HTTP client with explicit timeout values.
    ///
    /// # Panics
    ///
    /// Panics if the HTTP client builder fails to build with the supplied
    /// timeout configuration.
    #[must_use]
    #[allow(clippy::expect_used)]
    pub fn new_with_timeouts(connect_timeout_secs: u64, read_timeout_secs: u64) -> Self {
        let client = Client::builder()
            .connect_timeout(Duration::from_secs(connect_timeout_secs))
            .read_timeout(Duration::from_secs(read_timeout_secs))
            .gzip(true)
            .user_agent(user_agent::default_user_agent())
            .build()
            .expect("failed to build HTTP client with static configuration");
        Self { client }
    }

    /// Fetches a directory listing page and returns its body as text.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on network failure, timeout, a non-2xx status,
    /// or a body that cannot be read.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn fetch_listing(&self, url: &Url) -> Result<String, DownloadError> {
        let response = self.send(self.client.get(url.as_str()), url).await?;
        let body = response
            .text()
            .await
            .map_err(|e| DownloadError::from_reqwest(url.as_str(), e))?;
        debug!(bytes = body.len(), "listing fetched");
        Ok(body)
    }

    /// Issues a HEAD request and returns the advertised `Content-Length`.
    ///
    /// `Ok(None)` means the server answered but did not state a size.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on network failure, timeout or a non-2xx status.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn probe_size(&self, url: &Url) -> Result<Option<u64>, DownloadError> {
        let response = self.send(self.client.head(url.as_str()), url).await?;
        Ok(content_length(&response))
    }

    /// Starts a streamed GET for a file transfer.
    ///
    /// The caller consumes the body with `bytes_stream()`.
    ///
    /// # Errors
    ///
    /// Returns `DownloadError` on network failure, timeout or a non-2xx status.
    #[instrument(level = "debug", skip(self), fields(url = %url))]
    pub async fn open_stream(&self, url: &Url) -> Result<reqwest::Response, DownloadError> {
        self.send(self.client.get(url.as_str()), url).await
    }

    async fn send(
        &self,
        request: reqwest::RequestBuilder,
        url: &Url,
    ) -> Result<reqwest::Response, DownloadError> {
        let response = request
            .send()
            .await
            .map_err(|e| DownloadError::from_reqwest(url.as_str(), e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(DownloadError::http_status(url.as_str(), status.as_u16()));
        }
        Ok(response)
    }
}

/// Reads `Content-Length` from the response headers.
///
/// The header is read directly because the body size hint of a HEAD
/// response is always zero.
pub(crate) fn content_length(response: &reqwest::Response) -> Option<u64> {
    response
        .headers()
        .get(CONTENT_LENGTH)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.trim().parse::<u64>().ok())
}
