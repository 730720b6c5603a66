//! Per-site scraping configuration
//!
//! A [`SiteDefinition`] is plain data (built-in catalog entry or a table in
//! the config file). [`SiteConfig::compile`] validates it once and produces
//! the immutable form shared by a site session.

use serde::{Deserialize, Serialize};
use url::Url;

use super::parsing::{ListingParser, ListingSelectors, PageVerdict};
use super::scrape_error::{ScrapeError, ScrapeResult};
use crate::domain::{Clock, PageSnapshot};

/// Placeholder replaced by the encoded query in `search_url`
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// How whitespace in the query is written into the search URL
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryEncoding {
    /// Form encoding, spaces as `+`
    #[default]
    Plus,
    /// Spaces as `%20`
    Percent,
    /// Words joined with `-`, for path segments like `wholesale-t-shirts.html`
    Hyphen,
}

impl QueryEncoding {
    pub fn encode(self, query: &str) -> String {
        let form: String = url::form_urlencoded::byte_serialize(query.trim().as_bytes()).collect();
        match self {
            Self::Plus => form,
            Self::Percent => form.replace('+', "%20"),
            Self::Hyphen => query
                .split_whitespace()
                .map(|word| url::form_urlencoded::byte_serialize(word.as_bytes()).collect::<String>())
                .collect::<Vec<_>>()
                .join("-"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum PaginationSpec {
    /// Page N carries `name=first+N-1`
    QueryParam {
        name: String,
        #[serde(default = "default_first_page")]
        first: u32,
        /// Leave the parameter off the first page
        #[serde(default)]
        omit_on_first: bool,
    },
    /// Follow the `href` of the first matching next link
    NextControl { selectors: Vec<String> },
}

const fn default_first_page() -> u32 {
    1
}

impl PaginationSpec {
    pub fn query_param(name: &str) -> Self {
        Self::QueryParam {
            name: name.to_string(),
            first: 1,
            omit_on_first: false,
        }
    }

    pub fn query_param_after_first(name: &str) -> Self {
        Self::QueryParam {
            name: name.to_string(),
            first: 1,
            omit_on_first: true,
        }
    }

    pub fn next_control(selectors: &[&str]) -> Self {
        Self::NextControl {
            selectors: selectors.iter().map(|s| (*s).to_string()).collect(),
        }
    }
}

/// Serializable description of one target site
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteDefinition {
    pub id: String,
    pub display_name: String,
    /// Search URL template containing `{query}`
    pub search_url: String,
    #[serde(default)]
    pub query_encoding: QueryEncoding,
    pub pagination: PaginationSpec,
    pub listing: ListingSelectors,
}

/// Session limits applied on top of a definition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SiteLimits {
    pub max_pages: u32,
    pub max_items: usize,
}

/// Compiled, immutable site configuration
#[derive(Debug, Clone)]
pub struct SiteConfig {
    pub id: String,
    pub display_name: String,
    search_url: String,
    query_encoding: QueryEncoding,
    pagination: PaginationSpec,
    parser: ListingParser,
    wait_for: Option<String>,
    pub max_pages: u32,
    pub max_items: usize,
}

impl SiteConfig {
    pub fn compile(definition: &SiteDefinition, limits: SiteLimits) -> ScrapeResult<Self> {
        let id = definition.id.trim();
        if id.is_empty() {
            return Err(ScrapeError::fatal_config("<unnamed>", "site id is empty"));
        }
        if limits.max_pages == 0 || limits.max_items == 0 {
            return Err(ScrapeError::fatal_config(id, "max_pages and max_items must be at least 1"));
        }
        if !definition.search_url.contains(QUERY_PLACEHOLDER) {
            return Err(ScrapeError::fatal_config(
                id,
                format!("search_url has no {QUERY_PLACEHOLDER} placeholder"),
            ));
        }

        let sample = definition
            .search_url
            .replace(QUERY_PLACEHOLDER, &definition.query_encoding.encode("sample query"));
        match Url::parse(&sample) {
            Ok(url) if matches!(url.scheme(), "http" | "https") => {}
            Ok(url) => {
                return Err(ScrapeError::fatal_config(
                    id,
                    format!("unsupported scheme '{}' in search_url", url.scheme()),
                ));
            }
            Err(e) => {
                return Err(ScrapeError::fatal_config(id, format!("invalid search_url: {e}")));
            }
        }

        let next_link: &[String] = match &definition.pagination {
            PaginationSpec::QueryParam { name, .. } if name.trim().is_empty() => {
                return Err(ScrapeError::fatal_config(id, "pagination parameter name is empty"));
            }
            PaginationSpec::QueryParam { .. } => &[],
            PaginationSpec::NextControl { selectors } if selectors.is_empty() => {
                return Err(ScrapeError::fatal_config(id, "next-control pagination has no selectors"));
            }
            PaginationSpec::NextControl { selectors } => selectors,
        };

        Ok(Self {
            id: id.to_string(),
            display_name: definition.display_name.clone(),
            search_url: definition.search_url.clone(),
            query_encoding: definition.query_encoding,
            pagination: definition.pagination.clone(),
            parser: ListingParser::compile(id, &definition.listing, next_link)?,
            wait_for: definition.listing.candidates.first().cloned(),
            max_pages: limits.max_pages,
            max_items: limits.max_items,
        })
    }

    pub fn search_url(&self, query: &str) -> String {
        self.search_url
            .replace(QUERY_PLACEHOLDER, &self.query_encoding.encode(query))
    }

    /// URL of page `page` (1-based) when it can be computed up front.
    ///
    /// Next-control sites only know page 1; later pages come from the
    /// previous page's next link.
    pub fn page_url(&self, query: &str, page: u32) -> Option<String> {
        let base = self.search_url(query);
        match &self.pagination {
            PaginationSpec::QueryParam {
                name,
                first,
                omit_on_first,
            } => {
                if page <= 1 && *omit_on_first {
                    return Some(base);
                }
                let value = first.saturating_add(page.saturating_sub(1));
                let mut url = Url::parse(&base).ok()?;
                url.query_pairs_mut().append_pair(name, &value.to_string());
                Some(url.to_string())
            }
            PaginationSpec::NextControl { .. } => (page <= 1).then_some(base),
        }
    }

    pub const fn follows_next_links(&self) -> bool {
        matches!(self.pagination, PaginationSpec::NextControl { .. })
    }

    /// Selector a rendering collaborator waits for before snapshotting
    pub fn wait_for(&self) -> Option<&str> {
        self.wait_for.as_deref()
    }

    pub fn analyze(&self, snapshot: &PageSnapshot, budget: usize, clock: &dyn Clock) -> PageVerdict {
        self.parser.analyze(snapshot, budget, clock)
    }
}
