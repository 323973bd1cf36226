//! Logging setup: daily-rotated text and JSON files plus a terminal layer.
//!
//! - `crawler.log` - human-readable text, ANSI disabled
//! - `crawler.json.log` - one JSON object per event, with span context
//!
//! `RUST_LOG` controls filtering (default `info`), e.g.
//! `RUST_LOG=catalog_crawler=debug,chromiumoxide=warn`.

use std::path::Path;
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_subscriber::{EnvFilter, Layer, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;

pub const TEXT_LOG_FILE: &str = "crawler.log";
pub const JSON_LOG_FILE: &str = "crawler.json.log";

/// Flushes buffered log lines to the files when dropped; hold it until exit
#[must_use = "log lines still buffered are lost once the guards are dropped"]
pub struct LogGuards {
    _text: WorkerGuard,
    _json: WorkerGuard,
}

fn rolling_writer(log_dir: &Path, file_name: &str) -> (NonBlocking, WorkerGuard) {
    tracing_appender::non_blocking(tracing_appender::rolling::daily(log_dir, file_name))
}

/// Install the global subscriber. Fails if one is already installed.
pub fn init_logging<P: AsRef<Path>>(log_dir: P) -> Result<LogGuards, Box<dyn std::error::Error>> {
    let log_path = log_dir.as_ref();
    std::fs::create_dir_all(log_path)?;

    let env_filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new("info"))?;

    let (text_writer, text_guard) = rolling_writer(log_path, TEXT_LOG_FILE);
    let (json_writer, json_guard) = rolling_writer(log_path, JSON_LOG_FILE);

    let text_layer = fmt::layer()
        .with_writer(text_writer)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true)
        .with_ansi(false)
        .compact()
        .with_filter(env_filter.clone());

    let json_layer = fmt::layer()
        .json()
        .with_writer(json_writer)
        .with_target(true)
        .with_line_number(true)
        .with_current_span(true)
        .with_span_list(true)
        .with_filter(env_filter.clone());

    let stdout_layer = fmt::layer()
        .with_target(false)
        .with_thread_ids(false)
        .with_line_number(false)
        .compact()
        .with_filter(env_filter);

    tracing_subscriber::registry()
        .with(text_layer)
        .with(json_layer)
        .with(stdout_layer)
        .try_init()?;

    tracing::info!("Logging to {}", log_path.display());
    tracing::debug!(
        "Text logs: {}, JSON logs: {}",
        log_path.join(TEXT_LOG_FILE).display(),
        log_path.join(JSON_LOG_FILE).display()
    );

    Ok(LogGuards {
        _text: text_guard,
        _json: json_guard,
    })
}

/// Log into the `logs/` subdirectory of a data directory
pub fn init_logging_in_data_dir<P: AsRef<Path>>(
    data_dir: P,
) -> Result<LogGuards, Box<dyn std::error::Error>> {
    init_logging(data_dir.as_ref().join(Config::LOG_DIR))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_logging_initialization() {
        let temp_dir = TempDir::new().unwrap();
        // The global subscriber can only be installed once per process, so a
        // second init in the same test binary may fail; the directory must
        // exist either way.
        let _ = init_logging_in_data_dir(temp_dir.path());
        assert!(temp_dir.path().join("logs").exists());
    }

    #[test]
    fn test_dropping_guard_flushes_buffered_lines() {
        use std::io::Write;

        let temp_dir = TempDir::new().unwrap();
        let (mut writer, guard) = rolling_writer(temp_dir.path(), TEXT_LOG_FILE);
        writer.write_all(b"last line before exit\n").unwrap();
        drop(guard);

        let contents: String = std::fs::read_dir(temp_dir.path())
            .unwrap()
            .map(|entry| entry.unwrap().path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.starts_with(TEXT_LOG_FILE))
            })
            .map(|path| std::fs::read_to_string(path).unwrap())
            .collect();
        assert!(contents.contains("last line before exit"));
    }
}
