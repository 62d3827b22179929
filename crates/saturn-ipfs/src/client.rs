//! Upstream gateway client

use async_trait::async_trait;
use reqwest::{StatusCode, Url};
use tokio_util::sync::CancellationToken;

use crate::{ContentAddress, ContentStream, Error, Result, TransportError};

/// Anything that can resolve a content address to bytes
#[async_trait]
pub trait ContentFetcher: Send + Sync {
    /// Retrieve the content named by `address`.
    ///
    /// Cancelling `cancel` aborts the request, and any stream already
    /// returned by it.
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        address: &ContentAddress,
    ) -> Result<ContentStream>;
}

/// Retrieves content by CID from an HTTP gateway.
///
/// Every call issues one `GET {base_url}/{cid}`. No retries, no caching and
/// no idle connections are kept between calls, so concurrent fetches on a
/// shared client never observe each other.
#[derive(Debug, Clone)]
pub struct GatewayFetchClient {
    base_url: String,
    http: reqwest::Client,
}

impl GatewayFetchClient {
    /// Create a client for the gateway at `base_url`
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .pool_max_idle_per_host(0)
            .build()
            .map_err(|e| Error::Transport(TransportError::Request(e)))?;

        Self::with_http_client(base_url, http)
    }

    /// Create a client that sends requests through an existing `reqwest::Client`
    pub fn with_http_client(base_url: impl Into<String>, http: reqwest::Client) -> Result<Self> {
        let base_url = base_url.into();

        let parsed = Url::parse(&base_url)
            .map_err(|e| Error::InvalidGatewayUrl(format!("{}: {}", base_url, e)))?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(Error::InvalidGatewayUrl(format!(
                "{}: unsupported scheme '{}'",
                base_url,
                parsed.scheme()
            )));
        }
        if parsed.cannot_be_a_base() || parsed.query().is_some() || parsed.fragment().is_some() {
            return Err(Error::InvalidGatewayUrl(format!(
                "{}: not usable as a base URL",
                base_url
            )));
        }

        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            http,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// URL the content for `address` is requested from
    pub fn url_for(&self, address: &ContentAddress) -> String {
        format!("{}/{}", self.base_url, address)
    }

    /// Fetch the content for `address`.
    ///
    /// Only `200 OK` counts as success. Any other status yields
    /// [`Error::RetrievalFailed`] after the body has been drained. Failures
    /// before a response, including cancellation, yield [`Error::Transport`].
    pub async fn fetch(
        &self,
        cancel: &CancellationToken,
        address: &ContentAddress,
    ) -> Result<ContentStream> {
        let url = self.url_for(address);

        if cancel.is_cancelled() {
            return Err(TransportError::Cancelled.into());
        }

        tracing::debug!(url = %url, cid = %address, "Fetching content from gateway");

        let request = self.http.get(&url).send();
        let mut response = tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::debug!(cid = %address, "Fetch cancelled before upstream responded");
                return Err(TransportError::Cancelled.into());
            }
            res = request => res.map_err(|e| {
                tracing::warn!(cid = %address, error = %e, "Gateway request failed");
                Error::Transport(TransportError::Request(e))
            })?,
        };

        let status = response.status();
        if status != StatusCode::OK {
            // Drain so the connection is not left half-read. Chunks are
            // dropped as they arrive, the body is never buffered.
            let drain = async {
                while let Ok(Some(_)) = response.chunk().await {}
            };
            tokio::select! {
                biased;
                _ = cancel.cancelled() => {}
                _ = drain => {}
            }

            tracing::warn!(cid = %address, status = %status, "Gateway returned non-success status");
            return Err(Error::RetrievalFailed {
                cid: address.to_string(),
                status,
            });
        }

        tracing::debug!(
            cid = %address,
            content_length = ?response.content_length(),
            "Gateway responded"
        );

        Ok(ContentStream::new(response, cancel.clone()))
    }
}

#[async_trait]
impl ContentFetcher for GatewayFetchClient {
    async fn fetch(
        &self,
        cancel: &CancellationToken,
        address: &ContentAddress,
    ) -> Result<ContentStream> {
        GatewayFetchClient::fetch(self, cancel, address).await
    }
}
