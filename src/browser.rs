//! Headless-browser transport for the client-rendered list and detail pages.

use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use futures_util::{Stream, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{sleep, timeout};
use tracing::{debug, info, warn};

use crate::network::{FetchError, PacingGate, validate_user_agent};

/// Quiet period after which a rendered document counts as settled
const SETTLE_INTERVAL: Duration = Duration::from_millis(500);

struct BrowserSession {
    browser: Browser,
    handler: JoinHandle<()>,
}

/// Renders pages in a lazily launched headless Chromium.
///
/// Navigation failures are not retried here; callers treat them as fatal
/// for that one page.
pub struct BrowserClient {
    session: tokio::sync::Mutex<Option<BrowserSession>>,
    pacing: Arc<PacingGate>,
    user_agent: String,
    navigation_timeout: Duration,
}

impl BrowserClient {
    pub fn new(
        user_agent: String,
        navigation_timeout: Duration,
        pacing: Arc<PacingGate>,
    ) -> Result<Self, FetchError> {
        validate_user_agent(&user_agent)?;
        Ok(Self {
            session: tokio::sync::Mutex::new(None),
            pacing,
            user_agent,
            navigation_timeout,
        })
    }

    async fn launch(&self) -> Result<BrowserSession, FetchError> {
        let config = BrowserConfig::builder()
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-gpu")
            .arg(format!("--user-agent={}", self.user_agent))
            .request_timeout(self.navigation_timeout)
            .build()
            .map_err(FetchError::Browser)?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .map_err(|e| FetchError::Browser(format!("launch failed: {}", e)))?;

        let handler = tokio::spawn(async move {
            let errors = drive_handler(&mut handler).await;
            debug!(errors, "Browser handler finished");
        });

        info!("Headless browser launched");
        Ok(BrowserSession { browser, handler })
    }

    /// Render `url` and return its markup once the document stops changing
    /// or the navigation timeout elapses.
    pub async fn fetch_rendered(&self, url: &str) -> Result<String, FetchError> {
        let mut guard = self.session.lock().await;
        if guard.is_none() {
            *guard = Some(self.launch().await?);
        }
        let session = guard
            .as_ref()
            .ok_or_else(|| FetchError::Browser("browser session unavailable".to_string()))?;

        self.pacing.wait().await;
        debug!(url, "RENDER");

        let page = session
            .browser
            .new_page("about:blank")
            .await
            .map_err(|e| FetchError::Browser(format!("failed to open tab: {}", e)))?;

        let rendered = timeout(self.navigation_timeout, render(&page, url))
            .await
            .map_err(|_| FetchError::NavigationTimeout(self.navigation_timeout))
            .and_then(|result| result);

        if let Err(e) = page.close().await {
            debug!(url, error = %e, "Tab close failed");
        }

        rendered
    }

    /// Close the browser if it was ever launched
    pub async fn shutdown(&self) {
        let mut guard = self.session.lock().await;
        if let Some(mut session) = guard.take() {
            if let Err(e) = session.browser.close().await {
                warn!(error = %e, "Browser close error");
            }
            let _ = session.browser.wait().await;
            session.handler.abort();
            info!("Headless browser closed");
        }
    }
}

/// Poll the CDP event stream until the connection closes. Event errors,
/// such as messages that fail to deserialize, are logged and skipped.
async fn drive_handler<S, E>(events: &mut S) -> usize
where
    S: Stream<Item = Result<(), E>> + Unpin,
    E: std::fmt::Display,
{
    let mut errors = 0;
    while let Some(event) = events.next().await {
        if let Err(e) = event {
            errors += 1;
            debug!(error = %e, "Browser handler event error");
        }
    }
    errors
}

async fn render(page: &Page, url: &str) -> Result<String, FetchError> {
    page.goto(url)
        .await
        .map_err(|e| FetchError::Browser(format!("navigation to {} failed: {}", url, e)))?;
    page.wait_for_navigation()
        .await
        .map_err(|e| FetchError::Browser(format!("navigation to {} failed: {}", url, e)))?;

    // Client-side rendering keeps mutating the DOM after load; wait until
    // two snapshots one settle interval apart agree.
    let mut previous = snapshot(page).await?;
    loop {
        sleep(SETTLE_INTERVAL).await;
        let current = snapshot(page).await?;
        if current == previous {
            return Ok(current);
        }
        previous = current;
    }
}

async fn snapshot(page: &Page) -> Result<String, FetchError> {
    page.content()
        .await
        .map_err(|e| FetchError::Browser(format!("failed to read content: {}", e)))
}
