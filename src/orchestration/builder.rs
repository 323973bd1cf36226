//! Crawler builder: concrete transports wired behind the source trait.

use std::sync::Arc;
use std::time::Duration;

use crate::catalog_crawler::{CatalogCrawler, CatalogCrawlerConfig};
use crate::network::{FetchError, PacingPolicy};
use crate::source::{CatalogSource, SiteSource};

/// Build a crawler against the live site with the default pacing policy.
#[tracing::instrument(skip(config), fields(base_url = %config.base_url))]
pub fn build_crawler(config: CatalogCrawlerConfig) -> Result<CatalogCrawler, FetchError> {
    let source: Arc<dyn CatalogSource> = Arc::new(SiteSource::new(
        &config.base_url,
        config.user_agent.clone(),
        config.request_timeout_secs,
        Duration::from_secs(config.navigation_timeout_secs),
        PacingPolicy::default(),
    )?);
    Ok(CatalogCrawler::new(config, source))
}
