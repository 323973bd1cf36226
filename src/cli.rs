use clap::{Parser, Subcommand};

use crate::catalog_crawler::EnrichmentMode;
use crate::config::Config;
use crate::models::MakeSpec;

/// Command-line surface of the crawler.
/// Exit codes: 0=success, 1=fatal error, 2=invalid arguments, 130=forced interrupt
#[derive(Parser, Debug)]
#[command(name = "catalog_crawler")]
#[command(about = "Slow, resumable crawler for a script-driven parts catalog")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Enumerate the catalog, scrape list pages and enrich from detail pages.
    Crawl {
        #[arg(long, help = "Catalog site root, e.g. https://catalog.example.com/")]
        base_url: String,

        #[arg(
            long = "make",
            required = true,
            help = "Make to enumerate as ID:NAME (repeatable), e.g. 12:Honda"
        )]
        makes: Vec<MakeSpec>,

        #[arg(long, help = "Only crawl the make with this name")]
        make_filter: Option<String>,

        #[arg(long, help = "Only crawl this model year, e.g. 2025")]
        year_filter: Option<String>,

        #[arg(long, help = "Continue from the latest checkpoint for this filter scope")]
        resume: bool,

        #[arg(long, help = "Skip the run when the catalog hierarchy is unchanged")]
        check_changes: bool,

        #[arg(
            long,
            value_enum,
            default_value = "new",
            help = "Which skus get detail-page enrichment"
        )]
        enrich: EnrichmentMode,

        #[arg(
            long,
            default_value_t = Config::CHECKPOINT_INTERVAL,
            help = "Nodes between checkpoints (0 = only at the end)"
        )]
        checkpoint_interval: usize,

        #[arg(long, help = "Rewrite the results snapshot at every checkpoint")]
        incremental_export: bool,

        #[arg(
            short,
            long,
            default_value = "./data",
            help = "Directory for checkpoints, fingerprints and logs"
        )]
        data_dir: String,

        #[arg(
            short,
            long,
            default_value = "./output",
            help = "Directory for parts.json and compatibility.json"
        )]
        output_dir: String,

        #[arg(
            short,
            long,
            default_value = Config::DEFAULT_USER_AGENT,
            help = "Descriptive client identifier (browser signatures are refused)"
        )]
        user_agent: String,

        #[arg(
            long,
            default_value_t = Config::NAVIGATION_TIMEOUT_SECS,
            help = "Headless-browser navigation timeout in seconds"
        )]
        nav_timeout: u64,

        #[arg(
            long,
            default_value = Config::DEFAULT_SKU_PREFIX,
            help = "Vendor prefix of canonical skus"
        )]
        sku_prefix: String,
    },

    /// Show the latest checkpoint and stored fingerprint for a filter scope.
    Status {
        #[arg(short, long, default_value = "./data", help = "Directory containing run state")]
        data_dir: String,

        #[arg(long, help = "Make filter of the run to inspect")]
        make_filter: Option<String>,

        #[arg(long, help = "Year filter of the run to inspect")]
        year_filter: Option<String>,
    },

    /// Write the compatibility map of the latest results as JSONL, one sku per line.
    ExportJsonl {
        #[arg(
            short,
            long,
            default_value = "./output",
            help = "Directory containing parts.json and compatibility.json"
        )]
        output_dir: String,

        #[arg(long, help = "Destination file (default: <output-dir>/compatibility.jsonl)")]
        path: Option<String>,
    },
}

impl Cli {
    /// On error, clap prints help and exits with code 2.
    pub fn parse_args() -> Self {
        Self::parse()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crawl_command_minimal() {
        let cli = Cli::try_parse_from([
            "catalog_crawler",
            "crawl",
            "--base-url",
            "https://catalog.test.local/",
            "--make",
            "12:Honda",
        ])
        .unwrap();
        match cli.command {
            Commands::Crawl {
                base_url,
                makes,
                enrich,
                checkpoint_interval,
                resume,
                user_agent,
                nav_timeout,
                ..
            } => {
                assert_eq!(base_url, "https://catalog.test.local/");
                assert_eq!(
                    makes,
                    vec![MakeSpec {
                        id: 12,
                        name: "Honda".to_string()
                    }]
                );
                assert_eq!(enrich, EnrichmentMode::New);
                assert_eq!(checkpoint_interval, 10);
                assert!(!resume);
                assert_eq!(user_agent, Config::DEFAULT_USER_AGENT);
                assert_eq!(nav_timeout, 30);
            }
            _ => panic!("Expected Crawl command"),
        }
    }

    #[test]
    fn test_crawl_command_with_options() {
        let cli = Cli::try_parse_from([
            "catalog_crawler",
            "crawl",
            "--base-url",
            "https://catalog.test.local/",
            "--make",
            "12:Honda",
            "--make",
            "3:Acura",
            "--make-filter",
            "Honda",
            "--year-filter",
            "2025",
            "--resume",
            "--check-changes",
            "--enrich",
            "all",
            "--checkpoint-interval",
            "5",
            "--incremental-export",
            "--data-dir",
            "/tmp/data",
        ])
        .unwrap();
        match cli.command {
            Commands::Crawl {
                makes,
                make_filter,
                year_filter,
                resume,
                check_changes,
                enrich,
                checkpoint_interval,
                incremental_export,
                data_dir,
                ..
            } => {
                assert_eq!(makes.len(), 2);
                assert_eq!(makes[1].name, "Acura");
                assert_eq!(make_filter.as_deref(), Some("Honda"));
                assert_eq!(year_filter.as_deref(), Some("2025"));
                assert!(resume);
                assert!(check_changes);
                assert_eq!(enrich, EnrichmentMode::All);
                assert_eq!(checkpoint_interval, 5);
                assert!(incremental_export);
                assert_eq!(data_dir, "/tmp/data");
            }
            _ => panic!("Expected Crawl command"),
        }
    }

    #[test]
    fn test_status_command() {
        let cli = Cli::try_parse_from([
            "catalog_crawler",
            "status",
            "--data-dir",
            "./state",
            "--make-filter",
            "Honda",
        ])
        .unwrap();
        match cli.command {
            Commands::Status {
                data_dir,
                make_filter,
                year_filter,
            } => {
                assert_eq!(data_dir, "./state");
                assert_eq!(make_filter.as_deref(), Some("Honda"));
                assert!(year_filter.is_none());
            }
            _ => panic!("Expected Status command"),
        }
    }

    #[test]
    fn test_export_jsonl_command() {
        let cli = Cli::try_parse_from([
            "catalog_crawler",
            "export-jsonl",
            "-o",
            "./results",
            "--path",
            "/tmp/compat.jsonl",
        ])
        .unwrap();
        match cli.command {
            Commands::ExportJsonl { output_dir, path } => {
                assert_eq!(output_dir, "./results");
                assert_eq!(path.as_deref(), Some("/tmp/compat.jsonl"));
            }
            _ => panic!("Expected ExportJsonl command"),
        }
    }

    #[test]
    fn test_make_is_required() {
        let err = Cli::try_parse_from([
            "catalog_crawler",
            "crawl",
            "--base-url",
            "https://catalog.test.local/",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::MissingRequiredArgument);
    }

    #[test]
    fn test_malformed_make_is_rejected() {
        let err = Cli::try_parse_from([
            "catalog_crawler",
            "crawl",
            "--base-url",
            "https://catalog.test.local/",
            "--make",
            "Honda",
        ])
        .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_unknown_enrichment_mode() {
        let cli = Cli::try_parse_from([
            "catalog_crawler",
            "crawl",
            "--base-url",
            "https://catalog.test.local/",
            "--make",
            "12:Honda",
            "--enrich",
            "some",
        ]);
        assert!(cli.is_err());
    }

    #[test]
    fn test_help_does_not_panic() {
        let err = Cli::try_parse_from(["catalog_crawler", "--help"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::DisplayHelp);
    }
}
