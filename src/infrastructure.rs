//! Infrastructure layer for configuration, HTML parsing, fetching and export
//!
//! Site definitions are data; everything that touches the network, the file
//! system or the process environment lives here.

pub mod config;
pub mod export;
pub mod http_client;
pub mod logging;
pub mod parsing;
pub mod scrape_error;
pub mod site_catalog;
pub mod site_config;

// Re-export commonly used items
pub use config::{AppConfig, ConfigError};
pub use export::{export_all, CsvExporter, ExportFormat, Exporter, JsonExporter};
pub use http_client::HttpPageFetcher;
pub use logging::init_logging_with_config;
pub use scrape_error::{ScrapeError, ScrapeResult};
pub use site_catalog::SiteCatalog;
pub use site_config::{SiteConfig, SiteDefinition, SiteLimits};
