//! Shop Harvest command line entry point
//!
//! Exit codes: 0 when at least one record was produced, 1 when every site
//! came back empty, 2 on configuration or setup errors.

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use shop_harvest_lib::crawling::{Aggregation, Aggregator, Paginator, SessionSettings, SiteScraper};
use shop_harvest_lib::domain::{Clock, RunSummary, SystemClock};
use shop_harvest_lib::infrastructure::config::defaults;
use shop_harvest_lib::infrastructure::{
    export_all, init_logging_with_config, AppConfig, ExportFormat, HttpPageFetcher, SiteCatalog,
};

const EXIT_NO_RECORDS: u8 = 1;
const EXIT_FATAL: u8 = 2;

#[derive(Parser, Debug)]
#[command(name = "shop-harvest")]
#[command(about = "Search several online shops for one query and export the listings")]
#[command(version)]
struct Cli {
    /// Search query
    #[arg(default_value = defaults::QUERY)]
    query: String,

    #[arg(long, value_delimiter = ',', help = "Comma-separated site ids, in scrape order")]
    sites: Option<Vec<String>>,

    #[arg(long, help = "Maximum result pages per site")]
    max_pages: Option<u32>,

    #[arg(long, help = "Maximum records per site")]
    max_items: Option<usize>,

    #[arg(long, help = "Sites scraped at once (1 = sequential)")]
    concurrency: Option<usize>,

    #[arg(
        long,
        value_name = "BOOL",
        help = "Run browser-backed fetchers headless (true or false)"
    )]
    headless: Option<bool>,

    #[arg(short, long, help = "Configuration file (TOML, YAML or JSON)")]
    config: Option<PathBuf>,

    #[arg(short, long, help = "Directory for exported files")]
    output_dir: Option<PathBuf>,

    #[arg(long, help = "Base name of exported files")]
    basename: Option<String>,

    #[arg(long, value_delimiter = ',', help = "Export formats: json, csv")]
    format: Option<Vec<ExportFormat>>,

    #[arg(long, help = "Print the known sites and exit")]
    list_sites: bool,
}

impl Cli {
    /// Command line flags win over file and environment values
    fn apply_overrides(&self, config: &mut AppConfig) {
        if let Some(sites) = &self.sites {
            config.scrape.sites.clone_from(sites);
        }
        if let Some(max_pages) = self.max_pages {
            config.scrape.max_pages_per_site = max_pages;
        }
        if let Some(max_items) = self.max_items {
            config.scrape.max_items_per_site = max_items;
        }
        if let Some(concurrency) = self.concurrency {
            config.scrape.concurrency = concurrency;
        }
        if let Some(headless) = self.headless {
            config.scrape.headless = headless;
        }
        if let Some(output_dir) = &self.output_dir {
            config.export.output_dir.clone_from(output_dir);
        }
        if let Some(basename) = &self.basename {
            config.export.basename.clone_from(basename);
        }
        if let Some(formats) = &self.format {
            config.export.formats.clone_from(formats);
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(code) => code,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("error: {e:#}");
            ExitCode::from(EXIT_FATAL)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    let mut config =
        AppConfig::load(cli.config.as_deref()).context("failed to load configuration")?;
    cli.apply_overrides(&mut config);
    config.validate().context("invalid configuration")?;

    let catalog = SiteCatalog::builtin().with_custom(&config.custom_sites);
    if cli.list_sites {
        for site in catalog.definitions() {
            println!("{:<12} {}", site.id, site.display_name);
        }
        return Ok(ExitCode::SUCCESS);
    }

    init_logging_with_config(&config.logging).context("failed to initialize logging")?;

    let sites = catalog.compile(&config.scrape.sites, config.site_limits())?;
    let fetcher = Arc::new(HttpPageFetcher::new(&config.http)?);
    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let paginator = Paginator::new(fetcher, SessionSettings::from_config(&config));
    let scrapers = sites
        .into_iter()
        .map(|site| SiteScraper::new(site, paginator.clone(), clock.clone()))
        .collect();

    let cancel = CancellationToken::new();
    let interrupt = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                warn!("interrupt received, stopping all sessions");
                cancel.cancel();
            }
        })
    };

    let Aggregation { results, summary } = Aggregator::new(config.scrape.concurrency, clock)
        .collect(scrapers, &cli.query, cancel)
        .await;
    interrupt.abort();

    print_summary(&summary);

    let records = results.into_records();
    let written = export_all(
        &records,
        &config.export.formats,
        &config.export.output_dir,
        &config.export.basename,
    )?;
    for path in &written {
        println!("saved {}", path.display());
    }
    if written.is_empty() {
        info!("nothing exported");
    }

    Ok(if summary.produced_records() {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(EXIT_NO_RECORDS)
    })
}

fn print_summary(summary: &RunSummary) {
    println!("query: {}", summary.query);
    println!(
        "{:<12} {:<10} {:>7} {:>8} {:>5} {:>7} {:>9}",
        "site", "outcome", "records", "rejected", "pages", "retries", "elapsed"
    );
    for report in &summary.reports {
        println!(
            "{:<12} {:<10} {:>7} {:>8} {:>5} {:>7} {:>8.1}s",
            report.site_id,
            report.outcome.as_str(),
            report.items,
            report.rejected,
            report.pages_fetched,
            report.retries,
            report.elapsed.as_secs_f64()
        );
    }
    println!(
        "total: {} records ({} duplicates dropped)",
        summary.total_records, summary.duplicates_dropped
    );
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn headless_flag_can_switch_it_off() {
        let mut config = AppConfig::default();
        assert!(config.scrape.headless);

        Cli::try_parse_from(["shop-harvest", "--headless", "false"])
            .unwrap()
            .apply_overrides(&mut config);
        assert!(!config.scrape.headless);

        Cli::try_parse_from(["shop-harvest", "--headless=true"])
            .unwrap()
            .apply_overrides(&mut config);
        assert!(config.scrape.headless);
    }

    #[test]
    fn omitted_flags_keep_configured_values() {
        let mut config = AppConfig::default();
        config.scrape.headless = false;
        config.scrape.concurrency = 4;

        let cli = Cli::try_parse_from(["shop-harvest", "linen shirt", "--sites", "ebay,etsy"]).unwrap();
        cli.apply_overrides(&mut config);

        assert_eq!(cli.query, "linen shirt");
        assert!(!config.scrape.headless);
        assert_eq!(config.scrape.concurrency, 4);
        assert_eq!(config.scrape.sites, ["ebay", "etsy"]);
    }
}
