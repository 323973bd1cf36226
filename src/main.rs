use catalog_crawler::catalog_crawler::{CatalogCrawlerConfig, CrawlError};
use catalog_crawler::cli::{Cli, Commands};
use catalog_crawler::config::Config;
use catalog_crawler::export;
use catalog_crawler::fingerprint::FingerprintStore;
use catalog_crawler::logging::{LogGuards, init_logging_in_data_dir};
use catalog_crawler::network::FetchError;
use catalog_crawler::orchestration::{build_crawler, setup_shutdown_handler};
use catalog_crawler::state::{CheckpointStore, FilterScope, StateError};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use thiserror::Error;
use tracing::error;

#[derive(Error, Debug)]
pub enum MainError {
    #[error("Crawl error: {0}")]
    Crawl(#[from] CrawlError),

    #[error("Setup error: {0}")]
    Setup(#[from] FetchError),

    #[error("State error: {0}")]
    State(#[from] StateError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Logging error: {0}")]
    Logging(String),

    #[error("Export error: {0}")]
    Export(String),
}

async fn run_crawl_command(
    config: CatalogCrawlerConfig,
    log_guards: LogGuards,
) -> Result<(), MainError> {
    println!(
        "Crawling {} ({} make(s), filter: {})",
        config.base_url,
        config.makes.len(),
        config.scope().key()
    );

    let crawler = build_crawler(config)?;
    let signal_handler = setup_shutdown_handler(crawler.clone(), Some(log_guards));

    let outcome = crawler.run().await;
    if let Err(e) = &outcome {
        error!(error = %e, "Crawl failed");
    }
    // Dropping the handler's future drops the log guards, flushing the files
    signal_handler.abort();
    let _ = signal_handler.await;
    let result = outcome?;

    if !result.catalog_changed {
        println!("Catalog unchanged since the last completed run; nothing to do");
        return Ok(());
    }

    println!(
        "Nodes: {} total, {} skipped (resumed), {} processed, {} failed | Items failed: {}",
        result.nodes_total,
        result.nodes_skipped,
        result.nodes_processed,
        result.nodes_failed,
        result.items_failed
    );
    println!(
        "New parts: {} | Enriched: {} ({} failed) | {}",
        result.new_parts, result.enriched, result.enrichment_failures, result.stats
    );
    println!(
        "{} in {}s, results: {}",
        if result.interrupted { "Interrupted" } else { "Done" },
        result.duration_secs,
        crawler.config().output_dir.display()
    );
    Ok(())
}

fn run_status_command(data_dir: &Path, scope: FilterScope) -> Result<(), MainError> {
    let checkpoints = CheckpointStore::new(data_dir.join(Config::CHECKPOINT_DIR));
    let fingerprints = FingerprintStore::new(data_dir.join(Config::FINGERPRINT_DIR));

    println!("Scope: {}", scope.key());
    match checkpoints.latest(&scope)? {
        Some((path, state)) => {
            println!("Checkpoint: {}", path.display());
            println!(
                "  {} | {} of {} nodes processed | {} parts, {} vehicles | {} pending enrichment | {}",
                state.timestamp,
                state.processed_application_ids.len(),
                state.nodes_total,
                state.parts_seen,
                state.vehicles_seen,
                state.pending_enrichment.len(),
                if state.completed { "completed" } else { "incomplete" }
            );
        }
        None => println!("Checkpoint: none"),
    }
    match fingerprints.load(&scope)? {
        Some(digest) => println!("Fingerprint: {}", digest),
        None => println!("Fingerprint: none"),
    }
    Ok(())
}

fn run_export_command(output_dir: &Path, path: Option<PathBuf>) -> Result<(), MainError> {
    let store = export::load_results(output_dir)?.ok_or_else(|| {
        MainError::Export(format!("no results snapshot in {}", output_dir.display()))
    })?;
    let path = path.unwrap_or_else(|| output_dir.join("compatibility.jsonl"));

    let mut writer = BufWriter::new(File::create(&path)?);
    export::export_compatibility_jsonl(&store, &mut writer)?;
    writer.flush()?;
    println!(
        "Exported {} skus ({} vehicles) to {}",
        store.compatibility().len(),
        store.vehicle_count(),
        path.display()
    );
    Ok(())
}

async fn run(cli: Cli) -> Result<(), MainError> {
    match cli.command {
        Commands::Crawl {
            base_url,
            makes,
            make_filter,
            year_filter,
            resume,
            check_changes,
            enrich,
            checkpoint_interval,
            incremental_export,
            data_dir,
            output_dir,
            user_agent,
            nav_timeout,
            sku_prefix,
        } => {
            let log_guards = init_logging_in_data_dir(&data_dir)
                .map_err(|e| MainError::Logging(e.to_string()))?;

            let config = CatalogCrawlerConfig {
                base_url,
                makes,
                make_filter,
                year_filter,
                resume,
                check_changes,
                enrichment: enrich,
                checkpoint_interval,
                incremental_export,
                user_agent,
                request_timeout_secs: Config::REQUEST_TIMEOUT_SECS,
                navigation_timeout_secs: nav_timeout,
                sku_prefix,
                data_dir: PathBuf::from(data_dir),
                output_dir: PathBuf::from(output_dir),
            };
            run_crawl_command(config, log_guards).await
        }
        Commands::Status {
            data_dir,
            make_filter,
            year_filter,
        } => run_status_command(
            Path::new(&data_dir),
            FilterScope::new(make_filter, year_filter),
        ),
        Commands::ExportJsonl { output_dir, path } => {
            run_export_command(Path::new(&output_dir), path.map(PathBuf::from))
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse_args();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "Fatal");
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
