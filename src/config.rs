// Global configuration constants - single source of truth

pub struct Config;

impl Config {
    // Pacing: every request waits at least MIN_DELAY since the previous one
    pub const MIN_DELAY_MS: u64 = 1_000;
    pub const MAX_DELAY_MS: u64 = 3_000;
    pub const JITTER_MIN_MS: u64 = 500;
    pub const JITTER_MAX_MS: u64 = 1_500;

    // Plain-transport retries
    pub const MAX_ATTEMPTS: u32 = 3;
    pub const RETRY_BACKOFF_BASE_MS: u64 = 4_000;
    pub const RETRY_BACKOFF_MAX_MS: u64 = 60_000;

    // Timeouts
    pub const REQUEST_TIMEOUT_SECS: u64 = 30;
    pub const CONNECT_TIMEOUT_SECS: u64 = 10;
    pub const NAVIGATION_TIMEOUT_SECS: u64 = 30;
    pub const MAX_CONTENT_SIZE: usize = 10 * 1024 * 1024; // 10MB

    // Run state
    pub const CHECKPOINT_INTERVAL: usize = 10;
    pub const CHECKPOINTS_KEPT: usize = 3; // per filter scope
    pub const PROGRESS_INTERVAL: usize = 25;

    // Identity
    pub const DEFAULT_USER_AGENT: &'static str =
        "CatalogCrawler/0.1 (+parts catalog indexer; slow and resumable)";
    pub const DEFAULT_SKU_PREFIX: &'static str = "CSF-";

    // Layout of the data directory
    pub const CHECKPOINT_DIR: &'static str = "checkpoints";
    pub const FINGERPRINT_DIR: &'static str = "fingerprints";
    pub const LOG_DIR: &'static str = "logs";
}
