use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Why a site session reached its terminal state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteOutcome {
    /// Results ran out, or a page/item limit was reached
    Completed,
    /// Anti-bot defenses exhausted the blocked retry budget
    Blocked,
    /// Network or render errors exhausted the failure retry budget
    Failed,
    /// The session's wall-clock budget ran out
    TimedOut,
    /// The caller cancelled the run
    Cancelled,
}

impl SiteOutcome {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Completed => "completed",
            Self::Blocked => "blocked",
            Self::Failed => "failed",
            Self::TimedOut => "timed-out",
            Self::Cancelled => "cancelled",
        }
    }

    pub const fn is_success(self) -> bool {
        matches!(self, Self::Completed)
    }
}

impl fmt::Display for SiteOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Per-site observability summary
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteReport {
    pub site_id: String,
    pub outcome: SiteOutcome,
    /// Records yielded by the site (before cross-run dedup)
    pub items: usize,
    /// Candidate nodes the normalizer rejected
    pub rejected: usize,
    pub pages_fetched: u32,
    /// Fetch attempts beyond the first for any page
    pub retries: u32,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
}

impl SiteReport {
    /// Report for a site that never started a session
    pub fn not_started(site_id: impl Into<String>, outcome: SiteOutcome) -> Self {
        Self {
            site_id: site_id.into(),
            outcome,
            items: 0,
            rejected: 0,
            pages_fetched: 0,
            retries: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Summary of one aggregated run over all requested sites
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub query: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub reports: Vec<SiteReport>,
    pub total_records: usize,
    pub duplicates_dropped: usize,
}

impl RunSummary {
    pub fn report_for(&self, site_id: &str) -> Option<&SiteReport> {
        self.reports.iter().find(|r| r.site_id == site_id)
    }

    pub const fn produced_records(&self) -> bool {
        self.total_records > 0
    }
}

mod duration_millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(u64::try_from(value.as_millis()).unwrap_or(u64::MAX))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_uses_kebab_case_on_the_wire() {
        let json = serde_json::to_string(&SiteOutcome::TimedOut).unwrap();
        assert_eq!(json, "\"timed-out\"");
        assert_eq!(SiteOutcome::TimedOut.to_string(), "timed-out");
    }

    #[test]
    fn not_started_report_is_empty() {
        let report = SiteReport::not_started("etsy", SiteOutcome::Cancelled);
        assert_eq!(report.items, 0);
        assert_eq!(report.pages_fetched, 0);
        assert!(!report.outcome.is_success());
    }
}
