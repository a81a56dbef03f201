use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, USER_AGENT};
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::TransportError;
use crate::formats::{
    CheckLockRequest, CheckLockResponse, NavigateRequest, NavigateResponse, ScrapeRequest,
    ScrapeResponse,
};

pub const SCRAPE_PATH: &str = "/scrape";
pub const CHECK_LOCK_PATH: &str = "/check-lock";
pub const NAVIGATE_PATH: &str = "/navigate";

/// The request/response boundary to the scraping service.
///
/// Implementations return `Err` only when no decodable answer was received;
/// an explicit failure status is a successful call carrying that status.
#[async_trait]
pub trait ExtractionBackend: Send + Sync {
    async fn check_lock(
        &self,
        request: &CheckLockRequest,
    ) -> Result<CheckLockResponse, TransportError>;

    async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResponse, TransportError>;

    async fn navigate(
        &self,
        request: &NavigateRequest,
    ) -> Result<NavigateResponse, TransportError>;
}

#[derive(Debug, Clone)]
pub struct HttpBackend {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl HttpBackend {
    pub fn new(base_url: &str, timeout: Duration) -> anyhow::Result<Self> {
        let base_url = base_url.trim().trim_end_matches('/').to_string();
        if base_url.is_empty() {
            anyhow::bail!("backend url is empty");
        }
        url::Url::parse(&base_url).with_context(|| format!("parse backend url: {base_url}"))?;

        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .context("build backend http client")?;
        Ok(Self {
            client,
            base_url,
            timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    async fn post_json<Req, Resp>(&self, path: &str, body: &Req) -> Result<Resp, TransportError>
    where
        Req: Serialize + Sync,
        Resp: DeserializeOwned,
    {
        let endpoint = self.endpoint(path);
        tracing::debug!(%endpoint, "POST");

        let response = self
            .client
            .post(&endpoint)
            .header(USER_AGENT, concat!("webtextextract/", env!("CARGO_PKG_VERSION")))
            .header(ACCEPT, "application/json")
            .json(body)
            .send()
            .await
            .map_err(|err| {
                if err.is_timeout() {
                    TransportError::Timeout(self.timeout)
                } else {
                    TransportError::Connect(format!("POST {endpoint}: {err}"))
                }
            })?;

        // Error statuses still carry a JSON body with a message.
        let status = response.status();
        let raw = response.text().await?;
        serde_json::from_str(&raw).map_err(|err| {
            let snippet: String = raw.chars().take(200).collect();
            TransportError::InvalidResponse(format!(
                "POST {endpoint} ({status}): {err}: {snippet}"
            ))
        })
    }
}

#[async_trait]
impl ExtractionBackend for HttpBackend {
    async fn check_lock(
        &self,
        request: &CheckLockRequest,
    ) -> Result<CheckLockResponse, TransportError> {
        self.post_json(CHECK_LOCK_PATH, request).await
    }

    async fn scrape(&self, request: &ScrapeRequest) -> Result<ScrapeResponse, TransportError> {
        self.post_json(SCRAPE_PATH, request).await
    }

    async fn navigate(
        &self,
        request: &NavigateRequest,
    ) -> Result<NavigateResponse, TransportError> {
        self.post_json(NAVIGATE_PATH, request).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn trims_trailing_slashes_from_base_url() -> anyhow::Result<()> {
        let backend = HttpBackend::new("http://127.0.0.1:10000//", Duration::from_secs(1))?;
        assert_eq!(backend.base_url(), "http://127.0.0.1:10000");
        assert_eq!(backend.endpoint(SCRAPE_PATH), "http://127.0.0.1:10000/scrape");
        Ok(())
    }

    #[test]
    fn rejects_empty_or_invalid_base_url() {
        assert!(HttpBackend::new("  ", Duration::from_secs(1)).is_err());
        assert!(HttpBackend::new("not a url", Duration::from_secs(1)).is_err());
    }
}
