use anyhow::Context;
use clap::Parser;
use tracing::debug;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

use wager_advisor::cli::{self, Cli, OutputMode};
use wager_advisor::config::{AppConfig, LoggingConfig};

const LOG_FILE_PREFIX: &str = "wager-advisor";

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut app = AppConfig::load_from(&cli.config)
        .with_context(|| format!("loading configuration from {}", cli.config.display()))?;
    if let Some(bankroll) = cli.bankroll {
        app.engine.bankroll = bankroll;
    }

    init_logging(&app.logging);
    debug!(config_dir = %cli.config.display(), bankroll = %app.engine.bankroll, "configuration loaded");

    cli::run(&cli.command, app.engine, OutputMode::from_json_flag(cli.json))
}

fn init_logging(cfg: &LoggingConfig) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("{},wager_advisor=debug", cfg.level)));

    // Daily rotating file, only when the configured directory accepts it
    let file_layer = cfg.dir.as_deref().and_then(|dir| match file_appender(dir) {
        Ok(appender) => {
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            // Keep the guard alive for the rest of the process
            Box::leak(Box::new(guard));

            Some(
                tracing_subscriber::fmt::layer()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true),
            )
        }
        Err(e) => {
            eprintln!("Warning: Could not write to log directory {dir} ({e:#}), file logging disabled");
            None
        }
    });

    // Console goes to stderr so JSON output on stdout stays parseable
    let console_layer = if cfg.json {
        tracing_subscriber::fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_target(true)
            .boxed()
    } else {
        tracing_subscriber::fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(true)
            .with_thread_ids(false)
            .with_file(false)
            .with_line_number(false)
            .boxed()
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console_layer)
        .with(file_layer)
        .try_init();
}

/// `rolling::daily` panics when the first file cannot be opened; the builder
/// reports it instead.
fn file_appender(dir: &str) -> anyhow::Result<RollingFileAppender> {
    std::fs::create_dir_all(dir).with_context(|| format!("creating {dir}"))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
        .with_context(|| format!("opening a log file in {dir}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unwritable_log_dir_is_an_error() {
        assert!(file_appender("/proc").is_err());
        assert!(file_appender("/dev/null/logs").is_err());
    }

    #[test]
    fn test_log_dir_is_created() {
        let dir = std::env::temp_dir().join(format!("wager-advisor-logs-{}", std::process::id()));
        let path = dir.to_string_lossy().into_owned();
        assert!(file_appender(&path).is_ok());
        assert!(dir.is_dir());
        let _ = std::fs::remove_dir_all(&dir);
    }
}
