//! Interrupt handling for a running crawl.

use tracing::{error, info, warn};

use crate::catalog_crawler::CatalogCrawler;
use crate::logging::LogGuards;

/// Exit code for a forced quit, as for SIGINT
pub const FORCED_EXIT_CODE: i32 = 130;

/// First Ctrl+C asks the crawler to stop at the next node boundary; the run
/// then checkpoints and returns normally. Second Ctrl+C checkpoints from
/// here, flushes the log files and exits immediately.
///
/// The handler owns the log guards; abort and await the handle once the run
/// is over so they are dropped before the process exits.
pub fn setup_shutdown_handler(
    crawler: CatalogCrawler,
    log_guards: Option<LogGuards>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, stopping after the current page (Ctrl+C again to force quit)");
            crawler.stop().await;

            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("Force quit requested");
                match crawler.save_checkpoint() {
                    Ok(path) => info!(path = %path.display(), "Checkpoint saved before exit"),
                    Err(e) => error!(error = %e, "Failed to save checkpoint before exit"),
                }
                if let Err(e) = crawler.write_results() {
                    error!(error = %e, "Failed to write results before exit");
                }
                drop(log_guards);
                std::process::exit(FORCED_EXIT_CODE);
            }
        }
        // No signal listener: hold the guards until the handle is aborted
        std::future::pending::<()>().await;
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog_crawler::CatalogCrawlerConfig;
    use crate::orchestration::build_crawler;

    #[tokio::test]
    async fn test_aborted_handler_finishes() {
        let crawler = build_crawler(CatalogCrawlerConfig {
            base_url: "https://catalog.test.local/".to_string(),
            ..Default::default()
        })
        .unwrap();
        let handle = setup_shutdown_handler(crawler.clone(), None);
        handle.abort();
        let err = handle.await.unwrap_err();
        assert!(err.is_cancelled());
        // Aborting the listener never stops the crawl itself
        assert!(!crawler.is_running());
    }
}
