//! Layered error taxonomy for the extraction pipeline
//!
//! Only [`ScrapeError::FatalConfig`] aborts a run. Every other variant is
//! absorbed by the layer that produced it and surfaces as a counter or a log
//! entry.

use thiserror::Error;

use crate::domain::SiteOutcome;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScrapeError {
    #[error("field '{field}' unavailable on site {site_id}")]
    FieldUnavailable { site_id: String, field: String },

    #[error("item rejected on site {site_id}: {reason}")]
    ItemRejected { site_id: String, reason: String },

    #[error("page {page} of {site_id} blocked (status {status:?})")]
    PageBlocked {
        site_id: String,
        page: u32,
        status: Option<u16>,
    },

    #[error("page {page} of {site_id} failed: {reason}")]
    PageFailed {
        site_id: String,
        page: u32,
        reason: String,
    },

    #[error("session for {site_id} terminated: {outcome}")]
    SiteTerminated {
        site_id: String,
        outcome: SiteOutcome,
    },

    #[error("invalid configuration for {site_id}: {message}")]
    FatalConfig { site_id: String, message: String },
}

impl ScrapeError {
    pub fn fatal_config(site_id: &str, message: impl Into<String>) -> Self {
        Self::FatalConfig {
            site_id: site_id.to_string(),
            message: message.into(),
        }
    }

    pub fn invalid_selector(site_id: &str, selector: &str, reason: &str) -> Self {
        Self::fatal_config(site_id, format!("invalid CSS selector '{selector}': {reason}"))
    }

    pub fn page_blocked(site_id: &str, page: u32, status: Option<u16>) -> Self {
        Self::PageBlocked {
            site_id: site_id.to_string(),
            page,
            status,
        }
    }

    pub fn page_failed(site_id: &str, page: u32, reason: impl Into<String>) -> Self {
        Self::PageFailed {
            site_id: site_id.to_string(),
            page,
            reason: reason.into(),
        }
    }

    /// Only configuration errors stop the whole operation
    pub const fn is_fatal(&self) -> bool {
        matches!(self, Self::FatalConfig { .. })
    }
}

pub type ScrapeResult<T> = Result<T, ScrapeError>;
