//! Fetch collaborator contract
//!
//! The pipeline only ever sees a [`PageSnapshot`]; whether it came from a
//! plain HTTP client or a rendering browser is the collaborator's business.

use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

/// One page request issued by the paginator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    /// Selector a rendering collaborator should wait for before snapshotting
    pub wait_for: Option<String>,
    /// Upper bound for this attempt, including readiness waits
    pub timeout: Duration,
    /// Hint for browser-backed collaborators; plain HTTP ignores it
    pub headless: bool,
}

/// Raw page content returned by a fetch collaborator
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PageSnapshot {
    /// Final URL after redirects, used to resolve relative links
    pub url: String,
    pub status: u16,
    pub body: String,
    /// Server supplied `Retry-After`, if any
    pub retry_after: Option<Duration>,
}

impl PageSnapshot {
    pub fn ok(url: impl Into<String>, body: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            status: 200,
            body: body.into(),
            retry_after: None,
        }
    }

    pub fn with_status(url: impl Into<String>, status: u16) -> Self {
        Self {
            url: url.into(),
            status,
            body: String::new(),
            retry_after: None,
        }
    }

    pub const fn is_success(&self) -> bool {
        self.status >= 200 && self.status < 300
    }

    /// 403 and 429 are treated as anti-automation responses
    pub const fn is_block_status(&self) -> bool {
        matches!(self.status, 403 | 429)
    }
}

/// Structured fetch failure; status-coded responses come back as snapshots
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum FetchFailure {
    #[error("fetch timed out after {0:?}")]
    Timeout(Duration),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("render error: {0}")]
    Render(String),
}

#[async_trait]
pub trait PageFetcher: Send + Sync {
    async fn fetch(&self, request: &FetchRequest) -> Result<PageSnapshot, FetchFailure>;
}
