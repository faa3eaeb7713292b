//! API documentation fetching.
//!
//! The pipeline consumes pre-normalized markdown/plain text; turning a
//! documentation URL into that text is this module's job. The default
//! implementation goes through an HTML-to-markdown reader proxy and falls
//! back to fetching the raw URL when the proxy is unavailable. Fetching is a
//! caller-side precondition: the orchestrator itself never fetches.

use async_trait::async_trait;
use reqwest::Client;
use std::env;
use std::time::Duration;

use crate::error::DocError;

/// Reader proxy endpoint. Appending a full URL to this base returns the
/// target page converted to markdown.
const READER_PROXY_BASE: &str = "https://r.jina.ai";

/// Fetch timeout in seconds. Document conversion is slow for large pages.
const FETCH_TIMEOUT_SECS: u64 = 60;

/// Default cap on returned documentation length, in bytes.
const DEFAULT_MAX_CHARS: usize = 200_000;

/// Source of pre-normalized API documentation text.
#[async_trait]
pub trait DocumentationSource: Send + Sync {
    /// Fetch the documentation at `url` as markdown or plain text.
    async fn fetch(&self, url: &str) -> Result<String, DocError>;
}

/// Documentation fetcher backed by a reader proxy with a raw-GET fallback.
pub struct ReaderProxyFetcher {
    /// HTTP client for fetch requests.
    http_client: Client,
    /// Optional bearer token for the reader proxy.
    api_key: Option<String>,
    /// Cap on returned text length.
    max_chars: usize,
}

impl ReaderProxyFetcher {
    /// Create a fetcher without proxy authentication.
    pub fn new() -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(FETCH_TIMEOUT_SECS))
                .build()
                .expect("Failed to build HTTP client"),
            api_key: None,
            max_chars: DEFAULT_MAX_CHARS,
        }
    }

    /// Create a fetcher authenticating to the reader proxy with `api_key`.
    pub fn with_api_key(api_key: String) -> Self {
        let mut fetcher = Self::new();
        fetcher.api_key = Some(api_key);
        fetcher
    }

    /// Create a fetcher from environment variables.
    ///
    /// Reads `MCP_FORGE_READER_API_KEY` for the optional proxy token; the
    /// proxy also works unauthenticated at lower rate limits.
    pub fn from_env() -> Self {
        match env::var("MCP_FORGE_READER_API_KEY") {
            Ok(key) => Self::with_api_key(key),
            Err(_) => Self::new(),
        }
    }

    /// Set the cap on returned documentation length.
    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = max_chars;
        self
    }

    /// Fetch through the reader proxy, which converts HTML to markdown.
    async fn fetch_via_proxy(&self, url: &str) -> Result<String, DocError> {
        let proxy_url = format!("{}/{}", READER_PROXY_BASE, url);

        let mut request = self
            .http_client
            .get(&proxy_url)
            .header("X-Return-Format", "markdown");

        if let Some(ref api_key) = self.api_key {
            request = request.header("Authorization", format!("Bearer {}", api_key));
        }

        let response = request
            .send()
            .await
            .map_err(|e| DocError::RequestFailed(e.to_string()))?;

        self.read_body(response, url).await
    }

    /// Fetch the URL directly, taking whatever content comes back.
    async fn fetch_direct(&self, url: &str) -> Result<String, DocError> {
        let response = self
            .http_client
            .get(url)
            .send()
            .await
            .map_err(|e| DocError::RequestFailed(e.to_string()))?;

        self.read_body(response, url).await
    }

    /// Validate the response status and extract the capped body text.
    async fn read_body(&self, response: reqwest::Response, url: &str) -> Result<String, DocError> {
        let status = response.status();
        if !status.is_success() {
            return Err(DocError::HttpStatus {
                code: status.as_u16(),
                url: url.to_string(),
            });
        }

        let content = response
            .text()
            .await
            .map_err(|e| DocError::RequestFailed(e.to_string()))?;

        if content.trim().is_empty() {
            return Err(DocError::EmptyDocument(url.to_string()));
        }

        tracing::info!(
            url = %url,
            chars = content.len(),
            "Retrieved documentation"
        );

        Ok(truncate_to_boundary(&content, self.max_chars).to_string())
    }
}

impl Default for ReaderProxyFetcher {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentationSource for ReaderProxyFetcher {
    async fn fetch(&self, url: &str) -> Result<String, DocError> {
        match self.fetch_via_proxy(url).await {
            Ok(content) => Ok(content),
            Err(err) => {
                tracing::warn!(
                    url = %url,
                    error = %err,
                    "Reader proxy fetch failed, falling back to direct GET"
                );
                self.fetch_direct(url).await
            }
        }
    }
}

/// Cut `text` to at most `max_bytes`, backing up to a char boundary.
fn truncate_to_boundary(text: &str, max_bytes: usize) -> &str {
    if text.len() <= max_bytes {
        return text;
    }
    let mut end = max_bytes;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}
