//! Logging system configuration and initialization
//!
//! - console output on stderr, so stdout stays free for the run summary
//! - optional file output through `tracing-appender` (daily or no rotation)
//! - optional JSON formatting for the file layer
//! - `RUST_LOG` overrides the configured level

use anyhow::{Context, Result};
use chrono::Utc;
use once_cell::sync::OnceCell;
use tracing::info;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{
    fmt::{self, time::FormatTime},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter, Layer, Registry,
};

pub use crate::infrastructure::config::LoggingConfig;
use crate::infrastructure::config::defaults;

// Keeps the non-blocking file writer alive for the whole process
static LOG_GUARD: OnceCell<WorkerGuard> = OnceCell::new();

/// Timestamps in UTC with millisecond precision
struct UtcTimer;

impl FormatTime for UtcTimer {
    fn format_time(&self, w: &mut fmt::format::Writer<'_>) -> std::fmt::Result {
        write!(w, "{}", Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"))
    }
}

/// Filter directives derived from the configuration.
///
/// HTML parsing and HTTP internals are clamped unless `trace` is requested.
pub fn filter_directives(config: &LoggingConfig) -> Vec<String> {
    let level = config.level.to_lowercase();
    let mut directives = vec![level.clone()];

    if level != "trace" {
        directives.extend(
            [
                "reqwest=warn",
                "hyper=warn",
                "hyper_util=warn",
                "h2=warn",
                "rustls=warn",
                "html5ever=error",
                "selectors=error",
                "tokio=info",
                "runtime=warn",
            ]
            .iter()
            .map(|d| (*d).to_string()),
        );
    }

    let mut modules: Vec<_> = config.module_filters.iter().collect();
    modules.sort();
    directives.extend(modules.into_iter().map(|(target, lvl)| format!("{target}={lvl}")));
    directives
}

fn build_filter(config: &LoggingConfig) -> Result<EnvFilter> {
    if let Ok(filter) = EnvFilter::try_from_default_env() {
        return Ok(filter);
    }

    let mut directives = filter_directives(config).into_iter();
    let base = directives.next().unwrap_or_else(|| defaults::LOG_LEVEL.to_string());
    let mut filter = EnvFilter::new(base);
    for directive in directives {
        filter = filter.add_directive(
            directive
                .parse()
                .with_context(|| format!("invalid log directive '{directive}'"))?,
        );
    }
    Ok(filter)
}

/// Initialize logging with custom configuration
pub fn init_logging_with_config(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(config)?;

    let file_layer = if config.file_output {
        std::fs::create_dir_all(&config.log_dir).with_context(|| {
            format!("failed to create log directory {}", config.log_dir.display())
        })?;

        let appender = match config.rotation.as_str() {
            "daily" => rolling::daily(&config.log_dir, defaults::LOG_FILE_PREFIX),
            _ => rolling::never(&config.log_dir, defaults::LOG_FILE_PREFIX),
        };
        let (writer, guard) = non_blocking(appender);
        // A second initialization fails below; the first guard stays in place
        let _ = LOG_GUARD.set(guard);

        let layer = fmt::layer()
            .with_writer(writer)
            .with_timer(UtcTimer)
            .with_ansi(false);
        Some(if config.json_format {
            layer
                .json()
                .with_target(true)
                .with_thread_ids(true)
                .with_file(true)
                .with_line_number(true)
                .boxed()
        } else {
            layer.with_target(true).boxed()
        })
    } else {
        None
    };

    let console_layer = config.console_output.then(|| {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_timer(UtcTimer)
            .with_target(false)
            .boxed()
    });

    Registry::default()
        .with(file_layer)
        .with(console_layer)
        .with(filter)
        .try_init()
        .context("logging already initialized")?;

    info!(
        "logging initialized: level={}, console={}, file={}",
        config.level, config.console_output, config.file_output
    );
    Ok(())
}
