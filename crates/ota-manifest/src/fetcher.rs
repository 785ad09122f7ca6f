use crate::error::{ManifestError, Result};
use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, Url};
use std::time::Duration;

/// Default request timeout for artifact downloads.
pub const DEFAULT_FETCH_TIMEOUT: Duration = Duration::from_secs(60);

/// Firmware image held in memory for the duration of one update run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FirmwareArtifact {
    url: String,
    bytes: Bytes,
}

impl FirmwareArtifact {
    /// Wrap bytes fetched from `url`. Empty artifacts are rejected.
    pub fn new(url: impl Into<String>, bytes: impl Into<Bytes>) -> Result<Self> {
        let url = url.into();
        let bytes = bytes.into();
        if bytes.is_empty() {
            return Err(ManifestError::EmptyArtifact(url));
        }
        Ok(Self { url, bytes })
    }

    /// Source URL exactly as supplied by the caller.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Artifact contents.
    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

/// Abstraction over retrieving firmware from a content host.
#[async_trait]
pub trait ArtifactFetcher: Send + Sync {
    /// Fetch the complete artifact stored at `url`.
    async fn fetch(&self, url: &str) -> Result<FirmwareArtifact>;
}

/// Builder for [`HttpArtifactFetcher`].
#[derive(Default)]
pub struct HttpArtifactFetcherBuilder {
    timeout: Option<Duration>,
    client: Option<Client>,
}

impl HttpArtifactFetcherBuilder {
    /// Request timeout covering connect, headers and body.
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Provide a custom reqwest client instance. Its own timeout settings are
    /// still capped by [`HttpArtifactFetcherBuilder::timeout`].
    pub fn client(mut self, client: Client) -> Self {
        self.client = Some(client);
        self
    }

    /// Build the fetcher.
    pub fn build(self) -> Result<HttpArtifactFetcher> {
        let timeout = self.timeout.unwrap_or(DEFAULT_FETCH_TIMEOUT);
        let client = match self.client {
            Some(client) => client,
            None => Client::builder()
                .timeout(timeout)
                .user_agent(concat!("display-ota/", env!("CARGO_PKG_VERSION")))
                .build()
                .map_err(ManifestError::Fetch)?,
        };

        Ok(HttpArtifactFetcher { client, timeout })
    }
}

/// HTTP(S) artifact fetcher with a bounded request time.
#[derive(Clone)]
pub struct HttpArtifactFetcher {
    client: Client,
    timeout: Duration,
}

impl HttpArtifactFetcher {
    /// Create a new builder.
    pub fn builder() -> HttpArtifactFetcherBuilder {
        HttpArtifactFetcherBuilder::default()
    }

    /// Configured request timeout.
    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn download(&self, url: Url) -> Result<Bytes> {
        let response = self.client.get(url.clone()).send().await?;
        let status = response.status();
        if !status.is_success() {
            return Err(ManifestError::HttpStatus {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }
        Ok(response.bytes().await?)
    }
}

#[async_trait]
impl ArtifactFetcher for HttpArtifactFetcher {
    async fn fetch(&self, url: &str) -> Result<FirmwareArtifact> {
        let parsed = Url::parse(url).map_err(|err| ManifestError::InvalidUrl {
            url: url.to_string(),
            reason: err.to_string(),
        })?;
        if !matches!(parsed.scheme(), "http" | "https") {
            return Err(ManifestError::InvalidUrl {
                url: url.to_string(),
                reason: format!("unsupported scheme {}", parsed.scheme()),
            });
        }

        tracing::debug!(%url, timeout = ?self.timeout, "fetching firmware artifact");
        let timed_out = || ManifestError::FetchTimeout {
            url: url.to_string(),
            timeout: self.timeout,
        };
        let bytes = match tokio::time::timeout(self.timeout, self.download(parsed)).await {
            Ok(Ok(bytes)) => bytes,
            Ok(Err(ManifestError::Fetch(err))) if err.is_timeout() => return Err(timed_out()),
            Ok(Err(err)) => return Err(err),
            Err(_) => return Err(timed_out()),
        };

        tracing::debug!(%url, len = bytes.len(), "artifact downloaded");
        FirmwareArtifact::new(url, bytes)
    }
}
