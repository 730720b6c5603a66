//! Paginated fetch driver
//!
//! Builds page URLs, issues fetches through the [`PageFetcher`], classifies
//! each attempt and lets [`FetchState`] decide what happens next. Every sleep
//! races the cancellation token and the session deadline.

use std::sync::Arc;
use std::time::Duration;

use async_stream::stream;
use futures::Stream;
use tokio::time::{sleep, sleep_until, timeout, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::backoff::{PacingPolicy, RetryPolicy};
use super::fetch_state::{AttemptOutcome, FetchState, SessionLimits, Step};
use crate::domain::{FetchRequest, PageFetcher, PageSnapshot, Record, SiteOutcome};
use crate::infrastructure::config::AppConfig;
use crate::infrastructure::parsing::PageVerdict;
use crate::infrastructure::scrape_error::ScrapeError;

/// Timing and retry settings shared by every session of a run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionSettings {
    pub pacing: PacingPolicy,
    pub retry: RetryPolicy,
    pub fetch_timeout: Duration,
    pub session_timeout: Duration,
    pub headless: bool,
}

impl SessionSettings {
    pub fn from_config(config: &AppConfig) -> Self {
        Self {
            pacing: PacingPolicy::from_config(&config.pacing),
            retry: RetryPolicy::from_config(&config.retry),
            fetch_timeout: config.timeouts.fetch(),
            session_timeout: config.timeouts.session(),
            headless: config.scrape.headless,
        }
    }
}

/// One site's pages as seen by the paginator
pub trait PageSource: Send + Sync {
    fn site_id(&self) -> &str;

    /// URL of a 1-based page, when computable without the previous page
    fn page_url(&self, page: u32) -> Option<String>;

    fn follows_next_links(&self) -> bool;

    fn wait_for(&self) -> Option<&str>;

    fn max_pages(&self) -> u32;

    fn max_items(&self) -> usize;

    /// Classify a 2xx snapshot and extract at most `budget` records
    fn handle(&self, snapshot: &PageSnapshot, budget: usize) -> PageVerdict;
}

/// Final counters of one pagination session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSummary {
    pub outcome: SiteOutcome,
    pub pages_fetched: u32,
    pub items: usize,
    pub rejected: usize,
    pub retries: u32,
    pub attempts: u32,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaginatorEvent {
    Page { page: u32, records: Vec<Record> },
    Finished(SessionSummary),
}

enum Attempt {
    Page {
        records: Vec<Record>,
        rejected: usize,
        last_page: bool,
        next_url: Option<String>,
    },
    Empty,
    Blocked {
        status: Option<u16>,
        retry_after: Option<Duration>,
    },
    Failed {
        reason: String,
    },
}

enum Interrupted {
    Cancelled,
    TimedOut,
}

impl From<Interrupted> for SiteOutcome {
    fn from(value: Interrupted) -> Self {
        match value {
            Interrupted::Cancelled => Self::Cancelled,
            Interrupted::TimedOut => Self::TimedOut,
        }
    }
}

#[derive(Clone)]
pub struct Paginator {
    fetcher: Arc<dyn PageFetcher>,
    settings: SessionSettings,
}

impl Paginator {
    pub fn new(fetcher: Arc<dyn PageFetcher>, settings: SessionSettings) -> Self {
        Self { fetcher, settings }
    }

    /// Drive one session. Yields each parsed page's records, then exactly one
    /// [`PaginatorEvent::Finished`].
    pub fn run<'a>(
        &'a self,
        source: &'a dyn PageSource,
        cancel: CancellationToken,
    ) -> impl Stream<Item = PaginatorEvent> + Send + 'a {
        stream! {
            let site_id = source.site_id();
            let deadline = Instant::now() + self.settings.session_timeout;
            let limits = SessionLimits {
                max_pages: source.max_pages(),
                max_items: source.max_items(),
                follows_next: source.follows_next_links(),
            };
            let mut state = FetchState::new();
            let mut url = source.page_url(1);
            let mut backoff = Duration::ZERO;

            let outcome = loop {
                if cancel.is_cancelled() {
                    break SiteOutcome::Cancelled;
                }
                if Instant::now() >= deadline {
                    break SiteOutcome::TimedOut;
                }
                let Some(target) = url.clone() else {
                    break SiteOutcome::Completed;
                };

                let wait = if state.total_attempts == 0 {
                    backoff
                } else {
                    backoff + self.settings.pacing.next_delay()
                };
                if let Err(interrupted) = self.pause(wait, deadline, &cancel).await {
                    break interrupted.into();
                }

                debug!("{}: fetching page {} ({})", site_id, state.current_page, target);
                let request = FetchRequest {
                    url: target,
                    wait_for: source.wait_for().map(str::to_string),
                    timeout: self.settings.fetch_timeout,
                    headless: self.settings.headless,
                };
                let attempt = match self.attempt(source, &request, &state, &limits, deadline, &cancel).await {
                    Ok(attempt) => attempt,
                    Err(interrupted) => break interrupted.into(),
                };

                let page = state.current_page;
                let (classified, records, next_url) = match attempt {
                    Attempt::Page { records, rejected, last_page, next_url } => {
                        let classified = AttemptOutcome::Parsed {
                            records: records.len(),
                            rejected,
                            last_page,
                            has_next: next_url.is_some(),
                        };
                        (classified, records, next_url)
                    }
                    Attempt::Empty => (AttemptOutcome::Empty, Vec::new(), None),
                    Attempt::Blocked { status, retry_after } => {
                        warn!("{}", ScrapeError::page_blocked(site_id, page, status));
                        (AttemptOutcome::Blocked { retry_after }, Vec::new(), None)
                    }
                    Attempt::Failed { reason } => {
                        warn!("{}", ScrapeError::page_failed(site_id, page, reason));
                        (AttemptOutcome::Failed, Vec::new(), None)
                    }
                };

                let jitter = self.settings.retry.sample_jitter();
                let step = state.apply(&classified, &limits, &self.settings.retry, jitter, Instant::now());

                if !records.is_empty() {
                    info!("{}: page {} yielded {} records", site_id, page, records.len());
                    yield PaginatorEvent::Page { page, records };
                }

                match step {
                    Step::NextPage => {
                        backoff = Duration::ZERO;
                        url = if limits.follows_next {
                            next_url
                        } else {
                            source.page_url(state.current_page)
                        };
                    }
                    Step::Retry { delay } => {
                        debug!("{}: retrying page {} in {:?}", site_id, page, delay);
                        backoff = delay;
                    }
                    Step::Finish(outcome) => break outcome,
                }
            };

            if outcome.is_success() {
                info!(
                    "{}: completed after {} pages, {} records",
                    site_id, state.pages_fetched, state.items_collected
                );
            } else {
                error!(
                    "{} ({} records kept)",
                    ScrapeError::SiteTerminated {
                        site_id: site_id.to_string(),
                        outcome,
                    },
                    state.items_collected
                );
            }

            yield PaginatorEvent::Finished(SessionSummary {
                outcome,
                pages_fetched: state.pages_fetched,
                items: state.items_collected,
                rejected: state.rejected,
                retries: state.retries,
                attempts: state.total_attempts,
            });
        }
    }

    /// Sleep for `duration` unless cancelled or past the session deadline
    async fn pause(
        &self,
        duration: Duration,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<(), Interrupted> {
        if duration.is_zero() {
            return Ok(());
        }
        tokio::select! {
            biased;
            () = cancel.cancelled() => Err(Interrupted::Cancelled),
            () = sleep_until(deadline) => Err(Interrupted::TimedOut),
            () = sleep(duration) => Ok(()),
        }
    }

    async fn attempt(
        &self,
        source: &dyn PageSource,
        request: &FetchRequest,
        state: &FetchState,
        limits: &SessionLimits,
        deadline: Instant,
        cancel: &CancellationToken,
    ) -> Result<Attempt, Interrupted> {
        let fetched = tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Interrupted::Cancelled),
            () = sleep_until(deadline) => return Err(Interrupted::TimedOut),
            result = timeout(request.timeout, self.fetcher.fetch(request)) => result,
        };

        let snapshot = match fetched {
            Err(_) => {
                return Ok(Attempt::Failed {
                    reason: format!("attempt timed out after {:?}", request.timeout),
                });
            }
            Ok(Err(failure)) => {
                return Ok(Attempt::Failed {
                    reason: failure.to_string(),
                });
            }
            Ok(Ok(snapshot)) => snapshot,
        };

        if snapshot.is_block_status() {
            return Ok(Attempt::Blocked {
                status: Some(snapshot.status),
                retry_after: snapshot.retry_after,
            });
        }
        if !snapshot.is_success() {
            return Ok(Attempt::Failed {
                reason: format!("HTTP {}", snapshot.status),
            });
        }

        Ok(match source.handle(&snapshot, state.remaining_budget(limits)) {
            PageVerdict::Blocked { .. } => Attempt::Blocked {
                status: None,
                retry_after: snapshot.retry_after,
            },
            PageVerdict::Empty => Attempt::Empty,
            PageVerdict::Parsed(parsed) => Attempt::Page {
                records: parsed.records,
                rejected: parsed.rejected,
                last_page: parsed.last_page,
                next_url: parsed.next_url,
            },
        })
    }
}
