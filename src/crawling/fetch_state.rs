//! Per-session fetch state machine
//!
//! [`FetchState::apply`] is the only place where pagination decisions are
//! made. It performs no I/O; the paginator feeds it attempt outcomes and acts
//! on the returned [`Step`].

use std::time::Duration;

use tokio::time::Instant;

use super::backoff::RetryPolicy;
use crate::domain::SiteOutcome;

/// Classified result of one fetch attempt
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Parsed {
        records: usize,
        rejected: usize,
        last_page: bool,
        has_next: bool,
    },
    Blocked {
        retry_after: Option<Duration>,
    },
    Empty,
    Failed,
}

/// What the paginator does next
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// Fetch `current_page` after the usual pacing delay
    NextPage,
    /// Fetch the same page again after `delay` plus pacing
    Retry { delay: Duration },
    Finish(SiteOutcome),
}

/// Limits that end a session
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    pub max_pages: u32,
    pub max_items: usize,
    /// Pagination follows next links, so a page without one is the last
    pub follows_next: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchState {
    /// 1-based page to fetch next
    pub current_page: u32,
    /// Unsuccessful attempts in a row, of either kind
    pub consecutive_failures: u32,
    /// Blocked attempts on the current page; drives the blocked budget
    pub blocked_streak: u32,
    /// Failed attempts on the current page; drives the failed budget
    pub failed_streak: u32,
    pub backoff_until: Option<Instant>,
    pub attempts_for_page: u32,
    pub pages_fetched: u32,
    pub items_collected: usize,
    pub rejected: usize,
    pub retries: u32,
    pub total_attempts: u32,
}

impl FetchState {
    pub fn new() -> Self {
        Self {
            current_page: 1,
            ..Self::default()
        }
    }

    /// Records still allowed before `max_items` is reached
    pub fn remaining_budget(&self, limits: &SessionLimits) -> usize {
        limits.max_items.saturating_sub(self.items_collected)
    }

    /// Advance the state with the outcome of one attempt.
    ///
    /// `jitter` is the random component added to blocked backoff and `now`
    /// anchors `backoff_until`.
    pub fn apply(
        &mut self,
        outcome: &AttemptOutcome,
        limits: &SessionLimits,
        policy: &RetryPolicy,
        jitter: Duration,
        now: Instant,
    ) -> Step {
        self.total_attempts += 1;
        self.attempts_for_page += 1;
        self.backoff_until = None;

        match outcome {
            AttemptOutcome::Parsed {
                records,
                rejected,
                last_page,
                has_next,
            } => {
                self.reset_failures();
                self.attempts_for_page = 0;
                self.pages_fetched += 1;
                self.items_collected += records;
                self.rejected += rejected;
                self.current_page += 1;

                let exhausted = self.current_page > limits.max_pages
                    || self.items_collected >= limits.max_items
                    || *last_page
                    || (limits.follows_next && !has_next);
                if exhausted {
                    Step::Finish(SiteOutcome::Completed)
                } else {
                    Step::NextPage
                }
            }
            AttemptOutcome::Empty => {
                self.reset_failures();
                self.pages_fetched += 1;
                Step::Finish(SiteOutcome::Completed)
            }
            AttemptOutcome::Blocked { retry_after } => {
                self.consecutive_failures += 1;
                self.blocked_streak += 1;
                if self.blocked_streak >= policy.blocked_budget {
                    return Step::Finish(SiteOutcome::Blocked);
                }
                let delay = policy.blocked_delay(self.blocked_streak, *retry_after, jitter);
                self.schedule_retry(delay, now)
            }
            AttemptOutcome::Failed => {
                self.consecutive_failures += 1;
                self.failed_streak += 1;
                if self.failed_streak >= policy.failed_budget {
                    return Step::Finish(SiteOutcome::Failed);
                }
                let delay = policy.failed_delay(self.failed_streak);
                self.schedule_retry(delay, now)
            }
        }
    }

    fn reset_failures(&mut self) {
        self.consecutive_failures = 0;
        self.blocked_streak = 0;
        self.failed_streak = 0;
    }

    fn schedule_retry(&mut self, delay: Duration, now: Instant) -> Step {
        self.retries += 1;
        self.backoff_until = Some(now + delay);
        Step::Retry { delay }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const LIMITS: SessionLimits = SessionLimits {
        max_pages: 3,
        max_items: 10,
        follows_next: false,
    };

    fn policy() -> RetryPolicy {
        RetryPolicy {
            blocked_base: Duration::from_secs(10),
            blocked_max: Duration::from_secs(60),
            failed_step: Duration::from_secs(5),
            failed_max: Duration::from_secs(30),
            ..RetryPolicy::immediate(3, 3)
        }
    }

    fn parsed(records: usize) -> AttemptOutcome {
        AttemptOutcome::Parsed {
            records,
            rejected: 0,
            last_page: false,
            has_next: true,
        }
    }

    fn apply(state: &mut FetchState, outcome: AttemptOutcome) -> Step {
        state.apply(&outcome, &LIMITS, &policy(), Duration::ZERO, Instant::now())
    }

    #[test]
    fn three_blocks_with_budget_three_end_blocked() {
        let mut state = FetchState::new();
        let blocked = || AttemptOutcome::Blocked { retry_after: None };
        assert_eq!(apply(&mut state, blocked()), Step::Retry { delay: Duration::from_secs(10) });
        assert_eq!(apply(&mut state, blocked()), Step::Retry { delay: Duration::from_secs(20) });
        assert_eq!(apply(&mut state, blocked()), Step::Finish(SiteOutcome::Blocked));
        assert_eq!(state.retries, 2);
        assert_eq!(state.total_attempts, 3);
    }

    #[test]
    fn blocked_after_progress_keeps_collected_items() {
        let mut state = FetchState::new();
        assert_eq!(apply(&mut state, parsed(4)), Step::NextPage);
        for _ in 0..2 {
            apply(&mut state, AttemptOutcome::Blocked { retry_after: None });
        }
        assert_eq!(
            apply(&mut state, AttemptOutcome::Blocked { retry_after: None }),
            Step::Finish(SiteOutcome::Blocked)
        );
        assert_eq!(state.items_collected, 4);
        assert_eq!(state.current_page, 2);
    }

    #[test]
    fn blocked_and_failed_budgets_are_counted_apart() {
        let mut state = FetchState::new();
        assert_eq!(apply(&mut state, AttemptOutcome::Failed), Step::Retry { delay: Duration::from_secs(5) });
        assert_eq!(apply(&mut state, AttemptOutcome::Failed), Step::Retry { delay: Duration::from_secs(10) });
        assert_eq!(
            apply(&mut state, AttemptOutcome::Blocked { retry_after: None }),
            Step::Retry { delay: Duration::from_secs(10) }
        );
        assert_eq!(
            apply(&mut state, AttemptOutcome::Blocked { retry_after: None }),
            Step::Retry { delay: Duration::from_secs(20) }
        );
        assert_eq!(apply(&mut state, AttemptOutcome::Failed), Step::Finish(SiteOutcome::Failed));
        assert_eq!(state.consecutive_failures, 5);
        assert_eq!(state.total_attempts, 5);
    }

    #[test]
    fn success_resets_failures() {
        let mut state = FetchState::new();
        apply(&mut state, AttemptOutcome::Failed);
        apply(&mut state, AttemptOutcome::Failed);
        assert_eq!(state.consecutive_failures, 2);
        assert_eq!(apply(&mut state, parsed(1)), Step::NextPage);
        assert_eq!(state.consecutive_failures, 0);
        assert_eq!(state.failed_streak, 0);
        assert_eq!(state.attempts_for_page, 0);
    }

    #[test]
    fn failed_backoff_is_linear() {
        let mut state = FetchState::new();
        let now = Instant::now();
        let step = state.apply(&AttemptOutcome::Failed, &LIMITS, &policy(), Duration::ZERO, now);
        assert_eq!(step, Step::Retry { delay: Duration::from_secs(5) });
        assert_eq!(state.backoff_until, Some(now + Duration::from_secs(5)));
        let step = state.apply(&AttemptOutcome::Failed, &LIMITS, &policy(), Duration::ZERO, now);
        assert_eq!(step, Step::Retry { delay: Duration::from_secs(10) });
    }

    #[test]
    fn empty_page_completes() {
        let mut state = FetchState::new();
        assert_eq!(apply(&mut state, AttemptOutcome::Empty), Step::Finish(SiteOutcome::Completed));
        assert_eq!(state.items_collected, 0);
    }

    #[test]
    fn page_limit_completes() {
        let mut state = FetchState::new();
        assert_eq!(apply(&mut state, parsed(1)), Step::NextPage);
        assert_eq!(apply(&mut state, parsed(1)), Step::NextPage);
        assert_eq!(apply(&mut state, parsed(1)), Step::Finish(SiteOutcome::Completed));
        assert_eq!(state.pages_fetched, 3);
    }

    #[test]
    fn item_limit_completes() {
        let mut state = FetchState::new();
        assert_eq!(apply(&mut state, parsed(10)), Step::Finish(SiteOutcome::Completed));
    }

    #[test]
    fn last_page_indicator_completes() {
        let mut state = FetchState::new();
        let outcome = AttemptOutcome::Parsed {
            records: 2,
            rejected: 1,
            last_page: true,
            has_next: true,
        };
        assert_eq!(apply(&mut state, outcome), Step::Finish(SiteOutcome::Completed));
        assert_eq!(state.rejected, 1);
    }

    #[test]
    fn missing_next_link_completes_next_control_sessions() {
        let limits = SessionLimits {
            follows_next: true,
            ..LIMITS
        };
        let mut state = FetchState::new();
        let outcome = AttemptOutcome::Parsed {
            records: 2,
            rejected: 0,
            last_page: false,
            has_next: false,
        };
        let step = state.apply(&outcome, &limits, &policy(), Duration::ZERO, Instant::now());
        assert_eq!(step, Step::Finish(SiteOutcome::Completed));
    }

    fn outcome_strategy() -> impl Strategy<Value = AttemptOutcome> {
        prop_oneof![
            (0usize..4, any::<bool>(), any::<bool>()).prop_map(|(records, last_page, has_next)| {
                AttemptOutcome::Parsed {
                    records,
                    rejected: 0,
                    last_page,
                    has_next,
                }
            }),
            Just(AttemptOutcome::Empty),
            Just(AttemptOutcome::Failed),
            proptest::option::of(0u64..120)
                .prop_map(|s| AttemptOutcome::Blocked { retry_after: s.map(Duration::from_secs) }),
        ]
    }

    proptest! {
        #[test]
        fn sessions_terminate_within_attempt_bound(
            max_pages in 1u32..6,
            blocked_budget in 1u32..5,
            failed_budget in 1u32..5,
            follows_next in any::<bool>(),
            outcomes in proptest::collection::vec(outcome_strategy(), 200),
        ) {
            let limits = SessionLimits { max_pages, max_items: 1_000, follows_next };
            let policy = RetryPolicy::immediate(blocked_budget, failed_budget);
            let bound = max_pages * policy.attempts_per_page();
            let mut state = FetchState::new();
            let mut finished = false;

            for outcome in &outcomes {
                match state.apply(outcome, &limits, &policy, Duration::ZERO, Instant::now()) {
                    Step::Finish(_) => {
                        finished = true;
                        break;
                    }
                    Step::NextPage | Step::Retry { .. } => {}
                }
                prop_assert!(state.total_attempts < bound);
            }

            prop_assert!(finished);
            prop_assert!(state.total_attempts <= bound);
            prop_assert!(state.pages_fetched <= max_pages);
        }
    }
}
