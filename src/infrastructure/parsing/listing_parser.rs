//! Listing page parser
//!
//! Turns one fetched search-results page into a [`PageVerdict`]. The parsed
//! document never outlives [`ListingParser::analyze`], so callers can hold
//! the verdict across await points.

use scraper::{Html, Selector};
use tracing::{debug, warn};
use url::Url;

use super::config::ListingSelectors;
use super::normalizer::ItemNormalizer;
use super::strategy::compile_selector;
use crate::domain::{Clock, PageSnapshot, Record};
use crate::infrastructure::scrape_error::{ScrapeError, ScrapeResult};

/// Records and navigation hints extracted from one page
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ParsedPage {
    pub records: Vec<Record>,
    pub rejected: usize,
    /// Absolute URL of the next page when the site exposes a next link
    pub next_url: Option<String>,
    /// The page declares itself the last one
    pub last_page: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PageVerdict {
    /// Captcha or bot wall detected in the body
    Blocked { marker: String },
    /// End-of-results marker or no candidate nodes at all
    Empty,
    Parsed(ParsedPage),
}

const NON_VISIBLE: [&str; 4] = ["script", "style", "noscript", "template"];

#[derive(Debug, Clone)]
pub struct ListingParser {
    site_id: String,
    candidates: Vec<(Selector, String)>,
    normalizer: ItemNormalizer,
    blocked_markers: Vec<String>,
    end_markers: Vec<String>,
    last_page: Vec<Selector>,
    next_link: Vec<Selector>,
}

impl ListingParser {
    /// `next_link` selectors are only given for next-control pagination
    pub fn compile(
        site_id: &str,
        listing: &ListingSelectors,
        next_link: &[String],
    ) -> ScrapeResult<Self> {
        if listing.candidates.is_empty() {
            return Err(ScrapeError::fatal_config(site_id, "no candidate selectors"));
        }

        let candidates = listing
            .candidates
            .iter()
            .map(|s| compile_selector(s, site_id).map(|sel| (sel, s.clone())))
            .collect::<ScrapeResult<Vec<_>>>()?;

        Ok(Self {
            site_id: site_id.to_string(),
            candidates,
            normalizer: ItemNormalizer::compile(
                site_id,
                &listing.fields,
                &listing.exclusions,
                listing.min_name_length,
            )?,
            blocked_markers: lowercase_all(&listing.blocked_markers),
            end_markers: lowercase_all(&listing.end_markers),
            last_page: compile_selectors(&listing.last_page, site_id)?,
            next_link: compile_selectors(next_link, site_id)?,
        })
    }

    /// Classify a successful page and extract at most `budget` records.
    ///
    /// Markers are only consulted where they cannot be confused with a real
    /// listing: end markers win over candidates, blocked markers only count
    /// when no candidate matched.
    pub fn analyze(&self, snapshot: &PageSnapshot, budget: usize, clock: &dyn Clock) -> PageVerdict {
        let document = Html::parse_document(&snapshot.body);
        let text = visible_text(&document);

        if let Some(marker) = self.end_markers.iter().find(|m| text.contains(m.as_str())) {
            debug!("{}: end-of-results marker '{}' on {}", self.site_id, marker, snapshot.url);
            return PageVerdict::Empty;
        }

        let page_url = Url::parse(&snapshot.url).ok();

        let Some((selector, source)) = self
            .candidates
            .iter()
            .find(|(selector, _)| document.select(selector).next().is_some())
        else {
            if let Some(marker) = self
                .blocked_markers
                .iter()
                .find(|m| text.contains(m.as_str()))
            {
                warn!("{}: blocked marker '{}' on {}", self.site_id, marker, snapshot.url);
                return PageVerdict::Blocked {
                    marker: marker.clone(),
                };
            }
            debug!("{}: no candidate nodes on {}", self.site_id, snapshot.url);
            return PageVerdict::Empty;
        };

        debug!(
            "{}: {} candidates via '{}'",
            self.site_id,
            document.select(selector).count(),
            source
        );

        let mut page = ParsedPage::default();
        for node in document.select(selector) {
            if page.records.len() >= budget {
                break;
            }
            match self.normalizer.normalize(node, page_url.as_ref(), clock) {
                Ok(record) => page.records.push(record),
                Err(rejection) => {
                    debug!("{}", rejection.into_error(&self.site_id));
                    page.rejected += 1;
                }
            }
        }

        page.last_page = self
            .last_page
            .iter()
            .any(|selector| document.select(selector).next().is_some());

        page.next_url = self.next_link.iter().find_map(|selector| {
            document
                .select(selector)
                .find_map(|el| el.value().attr("href"))
                .and_then(|href| resolve_href(href, page_url.as_ref()))
        });

        PageVerdict::Parsed(page)
    }
}

fn compile_selectors(sources: &[String], site_id: &str) -> ScrapeResult<Vec<Selector>> {
    sources.iter().map(|s| compile_selector(s, site_id)).collect()
}

fn lowercase_all(markers: &[String]) -> Vec<String> {
    markers
        .iter()
        .map(|m| collapse_whitespace(&m.to_lowercase()))
        .filter(|m| !m.is_empty())
        .collect()
}

/// Lowercased text a reader would see: entities decoded, scripts and styles skipped
fn visible_text(document: &Html) -> String {
    let mut raw = String::new();
    for node in document.root_element().descendants() {
        let Some(text) = node.value().as_text() else {
            continue;
        };
        let hidden = node.ancestors().any(|ancestor| {
            ancestor
                .value()
                .as_element()
                .is_some_and(|el| NON_VISIBLE.contains(&el.name()))
        });
        if !hidden {
            raw.push_str(text);
        }
    }
    collapse_whitespace(&raw.to_lowercase())
}

fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn resolve_href(href: &str, base: Option<&Url>) -> Option<String> {
    let href = href.trim();
    if href.is_empty() || href.starts_with('#') || href.starts_with("javascript:") {
        return None;
    }
    match base {
        Some(base) => base.join(href).ok().map(|u| u.to_string()),
        None => Url::parse(href).ok().map(|u| u.to_string()),
    }
}
