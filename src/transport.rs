use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use crate::config::ScanConfig;

/// A GET request issued over a [`Transport`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpRequest {
    pub url: String,
    pub headers: Vec<(String, String)>,
}

impl HttpRequest {
    pub fn get(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            headers: Vec::new(),
        }
    }

    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.push((name.into(), value.into()));
        self
    }
}

/// Raw response bytes and the numeric status code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    pub status: u16,
    pub body: Vec<u8>,
}

impl HttpResponse {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Proxy-routed HTTP capability. Implementations must be usable from many tasks at once.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse>;
}

/// [`Transport`] backed by a reqwest client whose every connection goes through the SOCKS proxy.
#[derive(Debug, Clone)]
pub struct TorTransport {
    client: reqwest::Client,
}

impl TorTransport {
    pub fn new(config: &ScanConfig) -> Result<Self> {
        let proxy = reqwest::Proxy::all(&config.proxy_url)
            .with_context(|| format!("invalid proxy url: {}", config.proxy_url))?;
        let client = reqwest::Client::builder()
            .proxy(proxy)
            .timeout(config.request_timeout)
            .build()
            .context("failed to build proxy-routed HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl Transport for TorTransport {
    async fn execute(&self, request: HttpRequest) -> Result<HttpResponse> {
        let mut builder = self.client.get(&request.url);
        for (name, value) in &request.headers {
            builder = builder.header(name.as_str(), value.as_str());
        }
        let response = builder
            .send()
            .await
            .with_context(|| format!("request to {} failed", request.url))?;
        let status = response.status().as_u16();
        let body = response
            .bytes()
            .await
            .with_context(|| format!("failed to read body from {}", request.url))?;
        debug!(url = %request.url, status, bytes = body.len(), "response received");
        Ok(HttpResponse {
            status,
            body: body.to_vec(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct TorCheck {
    #[serde(rename = "IsTor")]
    is_tor: bool,
    #[serde(rename = "IP")]
    ip: String,
}

/// Extract the exit address from an anonymity check response body.
///
/// The Tor Project endpoint answers `{"IsTor":true,"IP":"1.2.3.4"}`; a report of
/// `IsTor: false` means the route is not anonymized. Any other non-empty body
/// is taken verbatim as the observed address.
pub fn parse_anonymity_check(body: &[u8]) -> Result<String> {
    let text = String::from_utf8_lossy(body);
    let text = text.trim();
    if let Ok(check) = serde_json::from_str::<TorCheck>(text) {
        if !check.is_tor {
            bail!("route is not anonymized (exit {} is not a Tor relay)", check.ip);
        }
        return Ok(check.ip);
    }
    if text.is_empty() {
        bail!("anonymity check returned an empty body");
    }
    Ok(text.to_string())
}
