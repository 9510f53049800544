//! HTTP transport
//!
//! This module handles all HTTP requests made during a harvest:
//! - Building the HTTP client from the engine settings (user agent,
//!   proxy, timeout, extra headers)
//! - GET requests returning raw bytes, so encoding is decided by the
//!   document layer
//! - Error classification, used by downloads to decide on retries
//!
//! The [`Transport`] trait is the seam the rest of the engine fetches
//! through; tests plug in their own implementations.

use crate::config::EngineConfig;
use crate::ConfigError;
use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use reqwest::{redirect::Policy, Client, Proxy};
use std::time::Duration;
use thiserror::Error;

/// Maximum redirect hops followed for one request
const MAX_REDIRECTS: usize = 10;

/// A fetched resource
#[derive(Debug, Clone)]
pub struct FetchResponse {
    /// Final URL after redirects
    pub final_url: String,
    pub status_code: u16,
    pub content_type: Option<String>,
    pub body: Vec<u8>,
}

impl FetchResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status_code)
    }
}

/// Transport-level failures
#[derive(Debug, Clone, Error)]
pub enum FetchError {
    #[error("Request timed out: {0}")]
    Timeout(String),

    #[error("Connection failed: {0}")]
    Connect(String),

    #[error("HTTP {status} for {url}")]
    Status { url: String, status: u16 },

    #[error("Failed to read body: {0}")]
    Body(String),

    #[error("Request failed: {0}")]
    Other(String),
}

impl FetchError {
    /// True for failures worth retrying (timeouts and refused connections)
    pub fn is_connection_failure(&self) -> bool {
        matches!(self, Self::Timeout(_) | Self::Connect(_))
    }

    fn from_reqwest(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else if e.is_connect() {
            Self::Connect(e.to_string())
        } else if e.is_body() || e.is_decode() {
            Self::Body(e.to_string())
        } else {
            Self::Other(e.to_string())
        }
    }
}

/// Fetches resources by URL
#[async_trait]
pub trait Transport: Send + Sync {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError>;
}

/// [`Transport`] backed by a shared reqwest client
pub struct HttpTransport {
    client: Client,
    strict: bool,
}

impl HttpTransport {
    /// Builds the transport from engine settings
    ///
    /// In strict mode a non-2xx response is reported as
    /// [`FetchError::Status`]; otherwise it is returned like any other
    /// response.
    pub fn new(engine: &EngineConfig) -> crate::Result<Self> {
        Ok(Self {
            client: build_http_client(engine)?,
            strict: engine.strict,
        })
    }
}

/// Builds an HTTP client with the configured settings
///
/// # Example
///
/// ```no_run
/// use sumi_harvest::config::EngineConfig;
/// use sumi_harvest::crawler::build_http_client;
///
/// let client = build_http_client(&EngineConfig::default()).unwrap();
/// ```
pub fn build_http_client(engine: &EngineConfig) -> crate::Result<Client> {
    let user_agent = engine
        .user_agent
        .clone()
        .unwrap_or_else(|| format!("SumiHarvest/{}", env!("CARGO_PKG_VERSION")));

    let mut headers = HeaderMap::new();
    for (name, value) in &engine.headers {
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|e| {
            ConfigError::Validation(format!("Invalid header name '{}': {}", name, e))
        })?;
        let header_value = HeaderValue::from_str(value).map_err(|e| {
            ConfigError::Validation(format!("Invalid value for header '{}': {}", name, e))
        })?;
        headers.insert(header_name, header_value);
    }

    let mut builder = Client::builder()
        .user_agent(user_agent)
        .default_headers(headers)
        .timeout(Duration::from_secs(engine.timeout_secs))
        .connect_timeout(Duration::from_secs(10))
        .redirect(Policy::limited(MAX_REDIRECTS))
        .gzip(true)
        .brotli(true);

    if let Some(proxy) = &engine.proxy {
        builder = builder.proxy(Proxy::all(proxy.as_str())?);
    }

    Ok(builder.build()?)
}

#[async_trait]
impl Transport for HttpTransport {
    async fn get(&self, url: &str) -> Result<FetchResponse, FetchError> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(FetchError::from_reqwest)?;

        let status = response.status();
        let final_url = response.url().to_string();

        if self.strict && !status.is_success() {
            return Err(FetchError::Status {
                url: final_url,
                status: status.as_u16(),
            });
        }

        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let body = response.bytes().await.map_err(FetchError::from_reqwest)?;

        Ok(FetchResponse {
            final_url,
            status_code: status.as_u16(),
            content_type,
            body: body.to_vec(),
        })
    }
}
