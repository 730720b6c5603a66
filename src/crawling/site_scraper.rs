//! One site, one query, one session

use std::sync::Arc;

use async_stream::stream;
use futures::{pin_mut, Stream, StreamExt};
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use super::paginator::{PageSource, Paginator, PaginatorEvent};
use crate::domain::{Clock, PageSnapshot, Record, SiteReport};
use crate::infrastructure::parsing::PageVerdict;
use crate::infrastructure::site_config::SiteConfig;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SiteEvent {
    Record(Record),
    /// Always the last event of a session
    Finished(SiteReport),
}

/// Binds a compiled site to a query for the paginator
struct SitePages<'a> {
    site: &'a SiteConfig,
    query: &'a str,
    clock: &'a dyn Clock,
}

impl PageSource for SitePages<'_> {
    fn site_id(&self) -> &str {
        &self.site.id
    }

    fn page_url(&self, page: u32) -> Option<String> {
        self.site.page_url(self.query, page)
    }

    fn follows_next_links(&self) -> bool {
        self.site.follows_next_links()
    }

    fn wait_for(&self) -> Option<&str> {
        self.site.wait_for()
    }

    fn max_pages(&self) -> u32 {
        self.site.max_pages
    }

    fn max_items(&self) -> usize {
        self.site.max_items
    }

    fn handle(&self, snapshot: &PageSnapshot, budget: usize) -> PageVerdict {
        self.site.analyze(snapshot, budget, self.clock)
    }
}

#[derive(Clone)]
pub struct SiteScraper {
    site: Arc<SiteConfig>,
    paginator: Paginator,
    clock: Arc<dyn Clock>,
}

impl SiteScraper {
    pub fn new(site: SiteConfig, paginator: Paginator, clock: Arc<dyn Clock>) -> Self {
        Self {
            site: Arc::new(site),
            paginator,
            clock,
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site.id
    }

    /// Scrape `query` on this site.
    ///
    /// Records are yielded as soon as their page is normalized. The stream
    /// never errors; a blocked or failed site just ends early with its
    /// outcome in the final [`SiteEvent::Finished`].
    pub fn run<'a>(
        &'a self,
        query: &'a str,
        cancel: CancellationToken,
    ) -> impl Stream<Item = SiteEvent> + Send + 'a {
        stream! {
            let started = Instant::now();
            let pages = SitePages {
                site: &self.site,
                query,
                clock: self.clock.as_ref(),
            };
            let events = self.paginator.run(&pages, cancel);
            pin_mut!(events);

            while let Some(event) = events.next().await {
                match event {
                    PaginatorEvent::Page { records, .. } => {
                        for record in records {
                            yield SiteEvent::Record(record);
                        }
                    }
                    PaginatorEvent::Finished(summary) => {
                        yield SiteEvent::Finished(SiteReport {
                            site_id: self.site.id.clone(),
                            outcome: summary.outcome,
                            items: summary.items,
                            rejected: summary.rejected,
                            pages_fetched: summary.pages_fetched,
                            retries: summary.retries,
                            elapsed: started.elapsed(),
                        });
                        break;
                    }
                }
            }
        }
    }
}
