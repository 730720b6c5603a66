//! Crawling module - pagination, per-site sessions and aggregation
//!
//! - `backoff`: pacing and retry delay policies
//! - `fetch_state`: pure per-session state machine
//! - `paginator`: drives fetches through a [`PageFetcher`](crate::domain::PageFetcher)
//! - `site_scraper`: one site's record stream
//! - `aggregator`: bounded-parallel fan-in with dedup

pub mod aggregator;
pub mod backoff;
pub mod fetch_state;
pub mod paginator;
pub mod site_scraper;

pub use aggregator::{Aggregation, Aggregator, ResultSet};
pub use backoff::{PacingPolicy, RetryPolicy};
pub use fetch_state::{AttemptOutcome, FetchState, SessionLimits, Step};
pub use paginator::{PageSource, Paginator, PaginatorEvent, SessionSettings, SessionSummary};
pub use site_scraper::{SiteEvent, SiteScraper};
