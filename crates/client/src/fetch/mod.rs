//! HTTP fetch pipeline behind the `Network` seam.
//!
//! ### URL Resolution
//! - Root-relative URLs are joined onto the configured origin
//! - Lowercase host, remove fragments, preserve query string
//!
//! ### Failure model
//! - Transport failures (refused, reset, DNS, timeout, oversize body) are `Err`
//! - Any HTTP status, 2xx or not, is an `Ok` response; strategies decide what
//!   a non-2xx means for them
//! - No timeout unless one is configured

pub mod url;

use async_trait::async_trait;
use reqwest::{Client, Method, header};
use std::time::{Duration, Instant};

pub use url::{UrlError, is_http, resolve};

use casa_sw_core::{AppConfig, Error, RequestDescriptor, StoredResponse};

/// Anything that can put a request on the wire.
///
/// Strategies, install and sync replay only ever talk to the network
/// through this trait.
#[async_trait]
pub trait Network: Send + Sync {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<StoredResponse, Error>;
}

/// Configuration for the fetch client.
#[derive(Debug, Clone)]
pub struct FetchConfig {
    /// User agent string (default: "casa-sw/0.1")
    pub user_agent: String,

    /// Maximum response body size in bytes (default: 5MB)
    pub max_bytes: usize,

    /// Request timeout (default: none, left to the network stack)
    pub timeout: Option<Duration>,

    /// Maximum number of redirects to follow (default: 5)
    pub max_redirects: usize,
}

impl Default for FetchConfig {
    fn default() -> Self {
        Self { user_agent: "casa-sw/0.1".to_string(), max_bytes: 5 * 1024 * 1024, timeout: None, max_redirects: 5 }
    }
}

impl From<&AppConfig> for FetchConfig {
    fn from(config: &AppConfig) -> Self {
        Self {
            user_agent: config.user_agent.clone(),
            max_bytes: config.max_bytes,
            timeout: config.timeout(),
            ..Default::default()
        }
    }
}

/// `reqwest`-backed network client.
pub struct FetchClient {
    http: Client,
    config: FetchConfig,
}

impl FetchClient {
    /// Create a new fetch client with the given configuration.
    pub fn new(config: FetchConfig) -> Result<Self, Error> {
        let mut builder = Client::builder()
            .user_agent(&config.user_agent)
            .redirect(reqwest::redirect::Policy::limited(config.max_redirects))
            .use_rustls_tls()
            .gzip(true)
            .brotli(true)
            .deflate(true);

        if let Some(timeout) = config.timeout {
            builder = builder.timeout(timeout);
        }

        let http = builder
            .build()
            .map_err(|e| Error::Network(format!("failed to build HTTP client: {e}")))?;

        Ok(Self { http, config })
    }

    fn classify(err: reqwest::Error) -> Error {
        if err.is_timeout() { Error::FetchTimeout(err.to_string()) } else { Error::Network(err.to_string()) }
    }
}

/// Whether a declared `Content-Length` is over `max_bytes`, counting lengths
/// that do not fit in `usize` as over.
fn exceeds(len: u64, max_bytes: usize) -> bool {
    usize::try_from(len).map_or(true, |len| len > max_bytes)
}

#[async_trait]
impl Network for FetchClient {
    async fn fetch(&self, request: &RequestDescriptor) -> Result<StoredResponse, Error> {
        let start = Instant::now();
        let method = Method::from_bytes(request.method.to_ascii_uppercase().as_bytes())
            .map_err(|e| Error::InvalidInput(format!("invalid method {}: {e}", request.method)))?;

        let mut builder = self.http.request(method, request.url.as_str());
        if let Some(accept) = &request.accept {
            builder = builder.header(header::ACCEPT, accept);
        }
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        if let Some(body) = &request.body {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(Self::classify)?;
        let status = response.status();

        if let Some(len) = response.content_length()
            && exceeds(len, self.config.max_bytes)
        {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", len, self.config.max_bytes)));
        }

        let headers = response
            .headers()
            .iter()
            .filter_map(|(name, value)| value.to_str().ok().map(|v| (name.as_str().to_string(), v.to_string())))
            .collect();

        let bytes = response.bytes().await.map_err(Self::classify)?;
        if bytes.len() > self.config.max_bytes {
            return Err(Error::FetchTooLarge(format!("{} bytes exceeds {}", bytes.len(), self.config.max_bytes)));
        }

        tracing::debug!(
            "fetched {} {} -> {} in {}ms ({} bytes)",
            request.method,
            request.url,
            status.as_u16(),
            start.elapsed().as_millis(),
            bytes.len()
        );

        Ok(StoredResponse { status: status.as_u16(), headers, body: bytes.to_vec() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fetch_config_default() {
        let config = FetchConfig::default();
        assert_eq!(config.user_agent, "casa-sw/0.1");
        assert_eq!(config.max_bytes, 5 * 1024 * 1024);
        assert_eq!(config.timeout, None);
        assert_eq!(config.max_redirects, 5);
    }

    #[test]
    fn test_fetch_config_from_app_config() {
        let app = AppConfig { timeout_ms: Some(3_000), user_agent: "casa-test".into(), ..Default::default() };
        let config = FetchConfig::from(&app);
        assert_eq!(config.timeout, Some(Duration::from_millis(3_000)));
        assert_eq!(config.user_agent, "casa-test");
    }

    #[test]
    fn test_declared_length_limit() {
        assert!(!exceeds(1024, 1024));
        assert!(exceeds(1025, 1024));
        assert!(exceeds(u64::MAX, usize::MAX - 1));
    }

    #[tokio::test]
    async fn test_fetch_client_new() {
        let client = FetchClient::new(FetchConfig::default());
        assert!(client.is_ok());
    }

    #[tokio::test]
    async fn test_connection_refused_is_transport_error() {
        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let err = client.fetch(&RequestDescriptor::get("http://127.0.0.1:9/")).await.unwrap_err();
        assert!(err.is_transport(), "unexpected error: {err}");
    }

    #[tokio::test]
    async fn test_invalid_method_rejected() {
        let client = FetchClient::new(FetchConfig::default()).unwrap();
        let mut request = RequestDescriptor::get("http://127.0.0.1:9/");
        request.method = "NOT A METHOD".into();
        let err = client.fetch(&request).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }
}
