//! HTTP transport to the upstream provider.
//!
//! One pooled reqwest client per process; timeouts and pool budgets come
//! from [`ServerConfig`]. Failed upstream calls are not retried here.

use std::time::Duration;

use crate::config::ServerConfig;
use crate::error::ProxyError;

/// HTTP transport client for sending requests to the upstream provider.
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Create a new transport with connection pooling and timeouts from the
    /// given server config.
    #[must_use]
    pub fn new(config: &ServerConfig) -> Self {
        let pool_idle_timeout = if config.http_pool_idle_timeout_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(config.http_pool_idle_timeout_secs))
        };

        let client = reqwest::Client::builder()
            .pool_max_idle_per_host(config.http_pool_max_idle_per_host.max(1))
            .pool_idle_timeout(pool_idle_timeout)
            .tcp_nodelay(true)
            .connect_timeout(Duration::from_secs(5))
            .redirect(reqwest::redirect::Policy::none())
            .timeout(Duration::from_secs(config.timeout))
            .build()
            .unwrap_or_else(|err| {
                tracing::error!(error = %err, "failed to build configured HTTP client, falling back to default client");
                reqwest::Client::new()
            });

        Self { client }
    }

    /// Send a non-streaming POST request to the upstream.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Transport`] when URL parsing or request
    /// execution fails.
    pub async fn send_request(
        &self,
        url: &str,
        headers: &http::HeaderMap,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        let parsed = url::Url::parse(url)
            .map_err(|e| ProxyError::Transport(format!("Invalid upstream URL: {e}")))?;
        self.client
            .post(parsed)
            .headers(headers.clone())
            .body(body)
            .send()
            .await
            .map_err(|e| ProxyError::Transport(e.to_string()))
    }

    /// Send a streaming POST request to the upstream, returning the
    /// response for stream reading.
    ///
    /// # Errors
    ///
    /// Returns [`ProxyError::Transport`] when URL parsing or request
    /// execution fails.
    pub async fn send_stream(
        &self,
        url: &str,
        headers: &http::HeaderMap,
        body: bytes::Bytes,
    ) -> Result<reqwest::Response, ProxyError> {
        // Same as send_request; the caller reads the response body as a stream.
        self.send_request(url, headers, body).await
    }
}
