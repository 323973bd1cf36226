//! Trait the orchestrator fetches through, so the traversal logic can run
//! against the live site or an in-memory fixture.

use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use url::Url;

use crate::browser::BrowserClient;
use crate::network::{FetchError, HttpClient, PacingGate, PacingPolicy};

#[async_trait]
pub trait CatalogSource: Send + Sync {
    /// Raw script-wrapped body of a navigation endpoint, e.g. `/get_year_by_make/12`
    async fn fetch_partial(&self, path: &str) -> Result<String, FetchError>;

    /// Rendered markup of a client-rendered page, e.g. `/applications/8430`
    async fn fetch_rendered(&self, path: &str) -> Result<String, FetchError>;

    /// Release transport resources at the end of a run
    async fn shutdown(&self) {}
}

/// The live catalog: plain transport for navigation endpoints, headless
/// browser for pages, one pacing gate shared by both.
pub struct SiteSource {
    base_url: Url,
    http: HttpClient,
    browser: BrowserClient,
}

impl SiteSource {
    pub fn new(
        base_url: &str,
        user_agent: String,
        request_timeout_secs: u64,
        navigation_timeout: Duration,
        pacing: PacingPolicy,
    ) -> Result<Self, FetchError> {
        let base_url = Url::parse(base_url)
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", base_url, e)))?;
        let gate = Arc::new(PacingGate::new(pacing));
        let http = HttpClient::new(user_agent.clone(), request_timeout_secs, Arc::clone(&gate))?;
        let browser = BrowserClient::new(user_agent, navigation_timeout, gate)?;
        Ok(Self {
            base_url,
            http,
            browser,
        })
    }

    fn absolute(&self, path: &str) -> Result<String, FetchError> {
        self.base_url
            .join(path)
            .map(|url| url.to_string())
            .map_err(|e| FetchError::InvalidUrl(format!("{}: {}", path, e)))
    }
}

#[async_trait]
impl CatalogSource for SiteSource {
    async fn fetch_partial(&self, path: &str) -> Result<String, FetchError> {
        let url = self.absolute(path)?;
        Ok(self.http.fetch(&url).await?.content)
    }

    async fn fetch_rendered(&self, path: &str) -> Result<String, FetchError> {
        let url = self.absolute(path)?;
        self.browser.fetch_rendered(&url).await
    }

    async fn shutdown(&self) {
        self.browser.shutdown().await;
    }
}
