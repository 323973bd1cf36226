use rand::Rng;
use std::sync::Arc;
use std::time::Duration;
use tokio::time::{Instant, sleep, timeout};
use tracing::{debug, warn};

use crate::backoff::RetryPolicy;
use crate::config::Config;

/// Tokens that only general-purpose browsers put in their user agent
const BROWSER_TOKENS: [&str; 8] = [
    "Chrome/",
    "Safari/",
    "Firefox/",
    "AppleWebKit/",
    "Gecko/",
    "Edg/",
    "OPR/",
    "Trident/",
];

/// Refuse client identifiers that impersonate a browser.
///
/// `Mozilla/5.0 (compatible; SomeBot/1.0)` is the conventional bot form and
/// is accepted; anything carrying real browser engine tokens is not.
pub fn validate_user_agent(user_agent: &str) -> Result<(), FetchError> {
    let ua = user_agent.trim();
    if ua.is_empty() {
        return Err(FetchError::InvalidUserAgent(
            "user agent must not be empty".to_string(),
        ));
    }
    if let Some(token) = BROWSER_TOKENS.iter().find(|token| ua.contains(*token)) {
        return Err(FetchError::InvalidUserAgent(format!(
            "'{}' mimics a browser (contains {})",
            ua, token
        )));
    }
    if ua.starts_with("Mozilla/") && !ua.contains("compatible;") {
        return Err(FetchError::InvalidUserAgent(format!(
            "'{}' mimics a browser signature",
            ua
        )));
    }
    Ok(())
}

/// Delay schedule applied before every outbound request
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PacingPolicy {
    pub min_delay: Duration,
    pub max_delay: Duration,
    pub jitter_min: Duration,
    pub jitter_max: Duration,
}

impl Default for PacingPolicy {
    fn default() -> Self {
        Self::from_millis(
            Config::MIN_DELAY_MS,
            Config::MAX_DELAY_MS,
            Config::JITTER_MIN_MS,
            Config::JITTER_MAX_MS,
        )
    }
}

impl PacingPolicy {
    pub const fn from_millis(min: u64, max: u64, jitter_min: u64, jitter_max: u64) -> Self {
        Self {
            min_delay: Duration::from_millis(min),
            max_delay: Duration::from_millis(max),
            jitter_min: Duration::from_millis(jitter_min),
            jitter_max: Duration::from_millis(jitter_max),
        }
    }

    /// How long to sleep given the time since the previous request.
    ///
    /// Too soon: uniform in `[min - elapsed, max]`. Otherwise (or on the very
    /// first request) a uniform human jitter; the delay is never zero.
    pub fn delay<R: Rng>(&self, since_last: Option<Duration>, rng: &mut R) -> Duration {
        match since_last {
            Some(elapsed) if elapsed < self.min_delay => {
                let lower = self.min_delay - elapsed;
                uniform(rng, lower, self.max_delay.max(lower))
            }
            _ => uniform(rng, self.jitter_min, self.jitter_max),
        }
    }
}

fn uniform<R: Rng>(rng: &mut R, low: Duration, high: Duration) -> Duration {
    if high <= low {
        return low;
    }
    Duration::from_secs_f64(rng.gen_range(low.as_secs_f64()..=high.as_secs_f64()))
}

/// Serializes all timing decisions for one origin.
///
/// The lock is held across the pacing sleep so concurrent callers queue up
/// behind each other instead of reading the same "last request" instant.
#[derive(Debug)]
pub struct PacingGate {
    policy: PacingPolicy,
    last_request: tokio::sync::Mutex<Option<Instant>>,
}

impl PacingGate {
    pub fn new(policy: PacingPolicy) -> Self {
        Self {
            policy,
            last_request: tokio::sync::Mutex::new(None),
        }
    }

    /// Sleep as the policy demands, then stamp the request start time
    pub async fn wait(&self) -> Duration {
        let mut last = self.last_request.lock().await;
        let since_last = last.map(|at| at.elapsed());
        let delay = {
            let mut rng = rand::thread_rng();
            self.policy.delay(since_last, &mut rng)
        };
        sleep(delay).await;
        *last = Some(Instant::now());
        delay
    }
}

/// Plain HTTP transport with pacing and bounded retries
#[derive(Debug)]
pub struct HttpClient {
    client: reqwest::Client,
    pacing: Arc<PacingGate>,
    retry: RetryPolicy,
    timeout_duration: Duration,
    max_content_size: usize,
}

impl HttpClient {
    /// Build the client; refuses browser-impersonating user agents
    pub fn new(
        user_agent: String,
        timeout_secs: u64,
        pacing: Arc<PacingGate>,
    ) -> Result<Self, FetchError> {
        validate_user_agent(&user_agent)?;

        let client = reqwest::Client::builder()
            .user_agent(&user_agent)
            .timeout(Duration::from_secs(timeout_secs))
            .connect_timeout(Duration::from_secs(Config::CONNECT_TIMEOUT_SECS))
            // One origin, one request at a time
            .pool_max_idle_per_host(1)
            .pool_idle_timeout(Duration::from_secs(30))
            .redirect(reqwest::redirect::Policy::limited(5))
            .build()
            .map_err(|e| FetchError::Client(e.to_string()))?;

        Ok(Self {
            client,
            pacing,
            retry: RetryPolicy::default(),
            timeout_duration: Duration::from_secs(timeout_secs),
            max_content_size: Config::MAX_CONTENT_SIZE,
        })
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Fetch a URL, retrying transport failures, 5xx and 429 with
    /// exponential backoff. The last error is surfaced once attempts run out.
    pub async fn fetch(&self, url: &str) -> Result<FetchResult, FetchError> {
        let max_attempts = self.retry.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            match self.fetch_once(url).await {
                Ok(result) => return Ok(result),
                Err(e) if e.is_retryable() && attempt + 1 < max_attempts => {
                    let backoff = self.retry.backoff.delay(attempt);
                    warn!(
                        url,
                        attempt = attempt + 1,
                        max_attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %e,
                        "Retrying request"
                    );
                    sleep(backoff).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn fetch_once(&self, url: &str) -> Result<FetchResult, FetchError> {
        self.pacing.wait().await;
        debug!(url, "GET");

        let response = timeout(
            self.timeout_duration,
            self.client
                .get(url)
                .header("Accept", "text/html,application/javascript,*/*;q=0.8")
                .header("X-Requested-With", "XMLHttpRequest")
                .send(),
        )
        .await
        .map_err(|_| FetchError::Timeout)?
        .map_err(Self::classify_error)?;

        let status_code = response.status().as_u16();

        if status_code == 429 {
            let retry_after = response
                .headers()
                .get(reqwest::header::RETRY_AFTER)
                .and_then(|h| h.to_str().ok())
                .and_then(|v| v.trim().parse::<u64>().ok());
            if let Some(secs) = retry_after {
                warn!(url, retry_after_secs = secs, "Rate limited; honouring wait hint");
                sleep(Duration::from_secs(secs)).await;
            }
            return Err(FetchError::RateLimited {
                retry_after_secs: retry_after,
            });
        }

        if !response.status().is_success() {
            return Err(FetchError::Status(status_code));
        }

        if let Some(length) = response.content_length() {
            if length as usize > self.max_content_size {
                return Err(FetchError::ContentTooLarge(
                    length as usize,
                    self.max_content_size,
                ));
            }
        }

        let content = timeout(self.timeout_duration, response.text())
            .await
            .map_err(|_| FetchError::Timeout)?
            .map_err(|e| FetchError::Body(e.to_string()))?;

        if content.len() > self.max_content_size {
            return Err(FetchError::ContentTooLarge(
                content.len(),
                self.max_content_size,
            ));
        }

        Ok(FetchResult {
            status_code,
            content,
        })
    }

    fn classify_error(error: reqwest::Error) -> FetchError {
        if error.is_timeout() {
            return FetchError::Timeout;
        }
        FetchError::Network(error.to_string())
    }
}

/// Result of a successful HTTP fetch
#[derive(Debug, Clone)]
pub struct FetchResult {
    pub status_code: u16,
    pub content: String,
}

/// Transport failures from either the plain or the browser transport
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timeout")]
    Timeout,

    #[error("HTTP status {0}")]
    Status(u16),

    #[error("Rate limited (retry after {retry_after_secs:?}s)")]
    RateLimited { retry_after_secs: Option<u64> },

    #[error("Failed to read response body: {0}")]
    Body(String),

    #[error("Content too large: {0} bytes (max: {1} bytes)")]
    ContentTooLarge(usize, usize),

    #[error("Browser error: {0}")]
    Browser(String),

    #[error("Navigation timed out after {0:?}")]
    NavigationTimeout(Duration),

    #[error("Invalid user agent: {0}")]
    InvalidUserAgent(String),

    #[error("HTTP client setup failed: {0}")]
    Client(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl FetchError {
    /// Transport-level failures, timeouts, 5xx and 429 are worth another try
    pub fn is_retryable(&self) -> bool {
        match self {
            FetchError::Network(_) => true,
            FetchError::Timeout => true,
            FetchError::Status(code) => *code >= 500,
            FetchError::RateLimited { .. } => true,
            FetchError::Body(_) => false,
            FetchError::ContentTooLarge(_, _) => false,
            FetchError::Browser(_) => false,
            FetchError::NavigationTimeout(_) => false,
            FetchError::InvalidUserAgent(_) => false,
            FetchError::Client(_) => false,
            FetchError::InvalidUrl(_) => false,
        }
    }
}
