//! HTTP client for the camera server
//!
//! Wraps reqwest::Client with the server base URL. The server exposes two
//! endpoints: `GET /config` (session limits) and `POST /offer` (signaling).

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use std::time::Duration;
use url::Url;

use crate::config::{Config, ServerConfig, SessionLimits};
use crate::session::{SessionDescription, SessionError, Signaling};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Client for one camera server.
pub struct ServerClient {
    http: reqwest::Client,
    base: Url,
}

impl ServerClient {
    /// Build a client for `config.server_url`.
    pub fn new(config: &Config) -> Result<Self> {
        let mut base = Url::parse(&config.server_url)
            .with_context(|| format!("Invalid server URL '{}'", config.server_url))?;
        // Endpoints are relative to the base path, not a sibling of its last segment.
        if !base.path().ends_with('/') {
            let path = format!("{}/", base.path());
            base.set_path(&path);
        }
        if config.accept_invalid_certs {
            tracing::warn!("TLS certificate verification disabled for {}", base);
        }

        let http = reqwest::Client::builder()
            .connect_timeout(CONNECT_TIMEOUT)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .context("Failed to build HTTP client")?;

        Ok(Self { http, base })
    }

    pub fn base_url(&self) -> &Url {
        &self.base
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .with_context(|| format!("Cannot join '{}' onto {}", path, self.base))
    }

    /// GET /config
    pub async fn fetch_config(&self) -> Result<ServerConfig> {
        let url = self.endpoint("config")?;
        tracing::debug!("GET {}", url);

        let resp = self
            .http
            .get(url.clone())
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?;

        check_response(resp, url.as_str())
            .await?
            .json()
            .await
            .context("Server config is not valid JSON")
    }

    /// Fetch session limits once, falling back to `fallback` on any failure.
    pub async fn session_limits(&self, fallback: Duration) -> SessionLimits {
        SessionLimits::resolve(self.fetch_config().await, fallback)
    }

    /// POST /offer. Returns the raw response body.
    pub async fn post_offer(&self, offer: &SessionDescription) -> Result<String> {
        let url = self.endpoint("offer")?;
        tracing::debug!("POST {} ({} byte sdp)", url, offer.sdp.len());

        let resp = self
            .http
            .post(url.clone())
            .json(offer)
            .send()
            .await
            .with_context(|| format!("POST {} failed", url))?;

        check_response(resp, url.as_str())
            .await?
            .text()
            .await
            .context("Failed to read answer body")
    }
}

#[async_trait]
impl Signaling for ServerClient {
    async fn exchange(&self, offer: &SessionDescription) -> Result<SessionDescription, SessionError> {
        let body = self
            .post_offer(offer)
            .await
            .map_err(|e| SessionError::Signaling(format!("{:#}", e)))?;
        serde_json::from_str(&body).map_err(|e| SessionError::MalformedAnswer(e.to_string()))
    }
}

/// Check HTTP response status code and return a clear error on failure.
async fn check_response(resp: reqwest::Response, url: &str) -> Result<reqwest::Response> {
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        bail!("HTTP {} for {}: {}", status.as_u16(), url, body);
    }
    Ok(resp)
}
