//! Multi-site aggregation
//!
//! A dispatcher hands out semaphore permits in site order and spawns one task
//! per site. Every task sends its events over a single channel; the collecting
//! task is the only writer of the [`ResultSet`].

use std::sync::Arc;

use futures::{pin_mut, StreamExt};
use indexmap::map::Entry;
use indexmap::IndexMap;
use tokio::sync::{mpsc, OwnedSemaphorePermit, Semaphore};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use super::site_scraper::{SiteEvent, SiteScraper};
use crate::domain::{Clock, Record, RecordKey, RunSummary, SiteOutcome, SiteReport};

const EVENT_BUFFER: usize = 256;

/// Deduplicated records in arrival order
#[derive(Debug, Clone, Default)]
pub struct ResultSet {
    records: IndexMap<RecordKey, Record>,
    duplicates: usize,
}

impl ResultSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a record unless its key is already present; the first one wins
    pub fn insert(&mut self, record: Record) -> bool {
        match self.records.entry(record.key()) {
            Entry::Occupied(_) => {
                self.duplicates += 1;
                false
            }
            Entry::Vacant(slot) => {
                slot.insert(record);
                true
            }
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> impl Iterator<Item = &Record> {
        self.records.values()
    }

    pub fn into_records(self) -> Vec<Record> {
        self.records.into_values().collect()
    }

    pub const fn duplicates_dropped(&self) -> usize {
        self.duplicates
    }

    /// Group records by the position of their source in `order`.
    ///
    /// Stable, so arrival order inside one site is kept. Unknown sources go
    /// last.
    pub fn sort_by_site_order(&mut self, order: &[String]) {
        let rank = |record: &Record| {
            order
                .iter()
                .position(|id| *id == record.source)
                .unwrap_or(order.len())
        };
        self.records.sort_by(|_, a, _, b| rank(a).cmp(&rank(b)));
    }
}

/// Result of one aggregated run
#[derive(Debug, Clone)]
pub struct Aggregation {
    pub results: ResultSet,
    pub summary: RunSummary,
}

pub struct Aggregator {
    concurrency: usize,
    clock: Arc<dyn Clock>,
}

impl Aggregator {
    /// `concurrency` is clamped to at least one session at a time
    pub fn new(concurrency: usize, clock: Arc<dyn Clock>) -> Self {
        Self {
            concurrency: concurrency.max(1),
            clock,
        }
    }

    pub const fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run every scraper for `query` and merge their records.
    ///
    /// Never fails: each site ends with a report, including sites that were
    /// never started because `cancel` fired first.
    pub async fn collect(
        &self,
        scrapers: Vec<SiteScraper>,
        query: &str,
        cancel: CancellationToken,
    ) -> Aggregation {
        let run_id = Uuid::new_v4();
        let started_at = self.clock.now();
        let order: Vec<String> = scrapers.iter().map(|s| s.site_id().to_string()).collect();
        info!(
            "run {} started: query '{}', sites [{}], concurrency {}",
            run_id,
            query,
            order.join(", "),
            self.concurrency
        );

        let (tx, mut rx) = mpsc::channel::<(usize, SiteEvent)>(EVENT_BUFFER);
        let dispatcher = tokio::spawn(dispatch(
            scrapers,
            Arc::from(query),
            Arc::new(Semaphore::new(self.concurrency)),
            cancel.clone(),
            tx,
        ));

        let mut results = ResultSet::new();
        let mut reports: Vec<Option<SiteReport>> = vec![None; order.len()];
        while let Some((index, event)) = rx.recv().await {
            match event {
                SiteEvent::Record(record) => {
                    let source = record.source.clone();
                    if !results.insert(record) {
                        debug!("{}: duplicate record dropped", source);
                    }
                }
                SiteEvent::Finished(report) => {
                    info!(
                        "{}: {} with {} records ({} rejected, {} pages, {} retries) in {:?}",
                        report.site_id,
                        report.outcome,
                        report.items,
                        report.rejected,
                        report.pages_fetched,
                        report.retries,
                        report.elapsed
                    );
                    if let Some(slot) = reports.get_mut(index) {
                        *slot = Some(report);
                    }
                }
            }
        }

        if let Err(e) = dispatcher.await {
            error!("site dispatcher stopped abnormally: {}", e);
        }

        let missing_outcome = if cancel.is_cancelled() {
            SiteOutcome::Cancelled
        } else {
            SiteOutcome::Failed
        };
        let reports: Vec<SiteReport> = reports
            .into_iter()
            .zip(&order)
            .map(|(report, site_id)| {
                report.unwrap_or_else(|| {
                    warn!("{}: no session report, recording {}", site_id, missing_outcome);
                    SiteReport::not_started(site_id.clone(), missing_outcome)
                })
            })
            .collect();

        results.sort_by_site_order(&order);
        let summary = RunSummary {
            run_id,
            query: query.to_string(),
            started_at,
            finished_at: self.clock.now(),
            reports,
            total_records: results.len(),
            duplicates_dropped: results.duplicates_dropped(),
        };
        info!(
            "run {} finished: {} records, {} duplicates dropped",
            run_id, summary.total_records, summary.duplicates_dropped
        );

        Aggregation { results, summary }
    }
}

/// Start sessions in site order as permits become available
async fn dispatch(
    scrapers: Vec<SiteScraper>,
    query: Arc<str>,
    semaphore: Arc<Semaphore>,
    cancel: CancellationToken,
    tx: mpsc::Sender<(usize, SiteEvent)>,
) {
    let mut sessions = Vec::with_capacity(scrapers.len());

    for (index, scraper) in scrapers.into_iter().enumerate() {
        let permit = tokio::select! {
            biased;
            () = cancel.cancelled() => {
                info!("cancelled before starting {}", scraper.site_id());
                break;
            }
            permit = semaphore.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => break,
            },
        };
        sessions.push(tokio::spawn(run_site(
            scraper,
            index,
            query.clone(),
            cancel.clone(),
            tx.clone(),
            permit,
        )));
    }
    drop(tx);

    for session in sessions {
        if let Err(e) = session.await {
            error!("site session panicked: {}", e);
        }
    }
}

#[instrument(skip_all, fields(site = %scraper.site_id()))]
async fn run_site(
    scraper: SiteScraper,
    index: usize,
    query: Arc<str>,
    cancel: CancellationToken,
    tx: mpsc::Sender<(usize, SiteEvent)>,
    _permit: OwnedSemaphorePermit,
) {
    info!("session started");
    let events = scraper.run(&query, cancel);
    pin_mut!(events);

    while let Some(event) = events.next().await {
        if tx.send((index, event)).await.is_err() {
            warn!("collector gone, abandoning session");
            break;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::FieldValue;
    use chrono::{TimeZone, Utc};

    fn record(source: &str, name: &str, url: Option<&str>) -> Record {
        Record {
            source: source.to_string(),
            name: name.to_string(),
            price: FieldValue::Present("$10".to_string()),
            rating: FieldValue::Unavailable,
            review_count: FieldValue::Unavailable,
            image_url: FieldValue::Unavailable,
            detail_url: url.map_or(FieldValue::Unavailable, |u| FieldValue::Present(u.to_string())),
            retrieved_at: Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap(),
        }
    }

    #[test]
    fn same_source_and_link_is_kept_once() {
        let mut results = ResultSet::new();
        assert!(results.insert(record("X", "First", Some("http://a/1"))));
        assert!(!results.insert(record("X", "Second", Some("http://a/1"))));
        assert_eq!(results.len(), 1);
        assert_eq!(results.duplicates_dropped(), 1);
        assert_eq!(results.records().next().unwrap().name, "First");
    }

    #[test]
    fn same_link_on_different_sites_is_distinct() {
        let mut results = ResultSet::new();
        assert!(results.insert(record("X", "Tee", Some("http://a/1"))));
        assert!(results.insert(record("Y", "Tee", Some("http://a/1"))));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn records_without_link_dedup_on_name_and_price() {
        let mut results = ResultSet::new();
        assert!(results.insert(record("X", "Plain Tee", None)));
        assert!(!results.insert(record("X", "Plain Tee", None)));
        assert!(results.insert(record("X", "Other Tee", None)));
        assert_eq!(results.len(), 2);
    }

    #[test]
    fn sorting_groups_by_site_and_keeps_arrival_order() {
        let mut results = ResultSet::new();
        results.insert(record("b", "b1", Some("http://b/1")));
        results.insert(record("a", "a1", Some("http://a/1")));
        results.insert(record("b", "b2", Some("http://b/2")));
        results.insert(record("a", "a2", Some("http://a/2")));

        results.sort_by_site_order(&["a".to_string(), "b".to_string()]);
        let names: Vec<String> = results.into_records().into_iter().map(|r| r.name).collect();
        assert_eq!(names, ["a1", "a2", "b1", "b2"]);
    }

    #[test]
    fn concurrency_is_at_least_one() {
        let aggregator = Aggregator::new(0, Arc::new(crate::domain::SystemClock));
        assert_eq!(aggregator.concurrency(), 1);
    }
}
