//! Application configuration
//!
//! Layered loading with the `config` crate: compiled-in defaults, then an
//! optional TOML file, then `SHOP_HARVEST_*` environment variables (sections
//! separated by `__`, e.g. `SHOP_HARVEST_SCRAPE__CONCURRENCY=4`).

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use super::export::ExportFormat;
use super::site_config::{SiteDefinition, SiteLimits};

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to load configuration: {source}")]
    Load {
        #[from]
        source: config::ConfigError,
    },

    #[error("configuration validation failed: {message}")]
    Validation { message: String },
}

impl ConfigError {
    fn invalid(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }
}

/// Default configuration values
pub mod defaults {
    /// Config file looked up when no explicit path is given (extension optional)
    pub const CONFIG_FILE: &str = "config/default";

    /// Environment variable prefix
    pub const ENV_PREFIX: &str = "SHOP_HARVEST";

    pub const QUERY: &str = "shirts";

    /// Sites scraped when none are requested
    pub const SITES: [&str; 4] = ["ebay", "etsy", "shein", "asos"];

    pub const MAX_PAGES_PER_SITE: u32 = 3;
    pub const MAX_ITEMS_PER_SITE: usize = 20;
    pub const CONCURRENCY: usize = 1;

    /// Randomized pause between two fetch attempts
    pub const MIN_DELAY_MS: u64 = 2_000;
    pub const MAX_DELAY_MS: u64 = 5_000;

    pub const BLOCKED_RETRY_BUDGET: u32 = 3;
    pub const FAILED_RETRY_BUDGET: u32 = 3;

    /// Blocked backoff doubles from the base up to the cap
    pub const BLOCKED_BASE_DELAY_MS: u64 = 10_000;
    pub const BLOCKED_MAX_DELAY_MS: u64 = 60_000;

    /// Failed backoff grows linearly by the step up to the cap
    pub const FAILED_STEP_MS: u64 = 5_000;
    pub const FAILED_MAX_DELAY_MS: u64 = 30_000;

    /// Upper bound of the random jitter added to blocked backoff
    pub const JITTER_MS: u64 = 10_000;

    pub const FETCH_TIMEOUT_SECS: u64 = 30;
    pub const SESSION_TIMEOUT_SECS: u64 = 600;

    pub const REQUESTS_PER_SECOND: u32 = 2;
    pub const ACCEPT_LANGUAGE: &str = "en-US,en;q=0.9";

    pub const OUTPUT_DIR: &str = ".";
    pub const BASENAME: &str = "products";

    pub const LOG_LEVEL: &str = "info";
    pub const LOG_DIR: &str = "logs";
    pub const LOG_FILE_PREFIX: &str = "shop-harvest.log";

    /// Browser user agents rotated per request
    pub const USER_AGENTS: [&str; 5] = [
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64; rv:121.0) Gecko/20100101 Firefox/121.0",
        "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 (KHTML, like Gecko) Version/17.2 Safari/605.1.15",
        "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36 Edg/120.0.0.0",
    ];
}

/// Complete application configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub scrape: ScrapeConfig,
    #[serde(default)]
    pub pacing: PacingConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    /// User-defined sites; an id matching a built-in site replaces it
    #[serde(default)]
    pub custom_sites: Vec<SiteDefinition>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScrapeConfig {
    pub sites: Vec<String>,
    pub max_pages_per_site: u32,
    pub max_items_per_site: usize,
    /// Sites scraped at once; 1 is strictly sequential
    pub concurrency: usize,
    /// Forwarded to the fetch collaborator as a hint
    pub headless: bool,
}

impl Default for ScrapeConfig {
    fn default() -> Self {
        Self {
            sites: defaults::SITES.iter().map(|s| (*s).to_string()).collect(),
            max_pages_per_site: defaults::MAX_PAGES_PER_SITE,
            max_items_per_site: defaults::MAX_ITEMS_PER_SITE,
            concurrency: defaults::CONCURRENCY,
            headless: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    pub min_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            min_delay_ms: defaults::MIN_DELAY_MS,
            max_delay_ms: defaults::MAX_DELAY_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    /// Blocked attempts on one page before the site is given up as blocked
    pub blocked_budget: u32,
    /// Failed attempts on one page before the site is given up as failed
    pub failed_budget: u32,
    pub blocked_base_delay_ms: u64,
    pub blocked_max_delay_ms: u64,
    pub failed_step_ms: u64,
    pub failed_max_delay_ms: u64,
    pub jitter_ms: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            blocked_budget: defaults::BLOCKED_RETRY_BUDGET,
            failed_budget: defaults::FAILED_RETRY_BUDGET,
            blocked_base_delay_ms: defaults::BLOCKED_BASE_DELAY_MS,
            blocked_max_delay_ms: defaults::BLOCKED_MAX_DELAY_MS,
            failed_step_ms: defaults::FAILED_STEP_MS,
            failed_max_delay_ms: defaults::FAILED_MAX_DELAY_MS,
            jitter_ms: defaults::JITTER_MS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeoutConfig {
    /// Bound on a single fetch attempt
    pub fetch_secs: u64,
    /// Wall-clock bound on one site session
    pub session_secs: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            fetch_secs: defaults::FETCH_TIMEOUT_SECS,
            session_secs: defaults::SESSION_TIMEOUT_SECS,
        }
    }
}

impl TimeoutConfig {
    pub const fn fetch(&self) -> Duration {
        Duration::from_secs(self.fetch_secs)
    }

    pub const fn session(&self) -> Duration {
        Duration::from_secs(self.session_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    pub user_agents: Vec<String>,
    /// Global request ceiling shared by every site
    pub requests_per_second: u32,
    pub accept_language: String,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            user_agents: defaults::USER_AGENTS.iter().map(|s| (*s).to_string()).collect(),
            requests_per_second: defaults::REQUESTS_PER_SECOND,
            accept_language: defaults::ACCEPT_LANGUAGE.to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub output_dir: PathBuf,
    /// File name without extension
    pub basename: String,
    pub formats: Vec<ExportFormat>,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from(defaults::OUTPUT_DIR),
            basename: defaults::BASENAME.to_string(),
            formats: vec![ExportFormat::Json, ExportFormat::Csv],
        }
    }
}

/// Logging configuration settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// "error", "warn", "info", "debug" or "trace"; `RUST_LOG` wins when set
    pub level: String,
    pub json_format: bool,
    pub console_output: bool,
    pub file_output: bool,
    pub log_dir: PathBuf,
    /// "daily" or "never"
    pub rotation: String,
    /// Per-target levels, e.g. `reqwest = "warn"`
    pub module_filters: HashMap<String, String>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: defaults::LOG_LEVEL.to_string(),
            json_format: false,
            console_output: true,
            file_output: false,
            log_dir: PathBuf::from(defaults::LOG_DIR),
            rotation: "never".to_string(),
            module_filters: HashMap::new(),
        }
    }
}

const LOG_LEVELS: [&str; 5] = ["error", "warn", "info", "debug", "trace"];

impl AppConfig {
    /// Load defaults, then `path` (or `config/default.*` if present), then the environment
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let file = match path {
            Some(path) => config::File::from(path).required(true),
            None => config::File::with_name(defaults::CONFIG_FILE).required(false),
        };

        let settings = config::Config::builder()
            .add_source(config::Config::try_from(&Self::default())?)
            .add_source(file)
            .add_source(
                config::Environment::with_prefix(defaults::ENV_PREFIX)
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true)
                    .list_separator(",")
                    .with_list_parse_key("scrape.sites")
                    .with_list_parse_key("export.formats"),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.scrape.concurrency == 0 {
            return Err(ConfigError::invalid("scrape.concurrency must be at least 1"));
        }
        if self.scrape.max_pages_per_site == 0 || self.scrape.max_items_per_site == 0 {
            return Err(ConfigError::invalid(
                "scrape.max_pages_per_site and scrape.max_items_per_site must be at least 1",
            ));
        }
        if self.scrape.sites.iter().all(|s| s.trim().is_empty()) {
            return Err(ConfigError::invalid("scrape.sites must name at least one site"));
        }
        if self.pacing.min_delay_ms > self.pacing.max_delay_ms {
            return Err(ConfigError::invalid(
                "pacing.min_delay_ms cannot be greater than pacing.max_delay_ms",
            ));
        }
        if self.retry.blocked_budget == 0 || self.retry.failed_budget == 0 {
            return Err(ConfigError::invalid("retry budgets must be at least 1"));
        }
        if self.retry.blocked_base_delay_ms > self.retry.blocked_max_delay_ms {
            return Err(ConfigError::invalid(
                "retry.blocked_base_delay_ms cannot be greater than retry.blocked_max_delay_ms",
            ));
        }
        if self.timeouts.fetch_secs == 0 || self.timeouts.session_secs == 0 {
            return Err(ConfigError::invalid("timeouts must be greater than 0"));
        }
        if self.http.requests_per_second == 0 {
            return Err(ConfigError::invalid("http.requests_per_second must be at least 1"));
        }
        if self.export.basename.trim().is_empty() {
            return Err(ConfigError::invalid("export.basename cannot be empty"));
        }
        if !LOG_LEVELS.contains(&self.logging.level.to_lowercase().as_str()) {
            return Err(ConfigError::invalid(format!(
                "logging.level '{}' is not one of {}",
                self.logging.level,
                LOG_LEVELS.join(", ")
            )));
        }
        if !matches!(self.logging.rotation.as_str(), "daily" | "never") {
            return Err(ConfigError::invalid("logging.rotation must be 'daily' or 'never'"));
        }
        Ok(())
    }

    pub const fn site_limits(&self) -> SiteLimits {
        SiteLimits {
            max_pages: self.scrape.max_pages_per_site,
            max_items: self.scrape.max_items_per_site,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_are_valid() {
        let config = AppConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.scrape.sites, vec!["ebay", "etsy", "shein", "asos"]);
        assert_eq!(config.export.basename, "products");
    }

    #[test]
    fn rejects_zero_concurrency() {
        let mut config = AppConfig::default();
        config.scrape.concurrency = 0;
        assert!(matches!(config.validate(), Err(ConfigError::Validation { .. })));
    }

    #[test]
    fn rejects_inverted_pacing() {
        let mut config = AppConfig::default();
        config.pacing.min_delay_ms = 6_000;
        config.pacing.max_delay_ms = 1_000;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_retry_budget() {
        let mut config = AppConfig::default();
        config.retry.blocked_budget = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_unknown_log_level() {
        let mut config = AppConfig::default();
        config.logging.level = "verbose".to_string();
        assert!(config.validate().is_err());
    }

    #[test]
    fn file_overrides_defaults() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
[scrape]
sites = ["amazon", "hm"]
max_items_per_site = 7

[pacing]
min_delay_ms = 10
max_delay_ms = 20

[[custom_sites]]
id = "boutique"
display_name = "Boutique"
search_url = "https://boutique.example/search?q={{query}}"

[custom_sites.pagination]
kind = "query_param"
name = "p"

[custom_sites.listing]
candidates = [".product"]

[[custom_sites.listing.fields.name]]
kind = "text"
selector = ".product-name"
"#
        )
        .unwrap();

        let config = AppConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.scrape.sites, vec!["amazon", "hm"]);
        assert_eq!(config.scrape.max_items_per_site, 7);
        assert_eq!(config.scrape.max_pages_per_site, defaults::MAX_PAGES_PER_SITE);
        assert_eq!(config.pacing.max_delay_ms, 20);
        assert_eq!(config.custom_sites.len(), 1);
        assert_eq!(config.custom_sites[0].listing.min_name_length, 3);
    }

    #[test]
    fn missing_explicit_file_is_an_error() {
        let result = AppConfig::load(Some(Path::new("/nonexistent/shop-harvest.toml")));
        assert!(matches!(result, Err(ConfigError::Load { .. })));
    }
}
