//! HTML extraction for search-results pages
//!
//! Selector strategies are compiled once per site. Each fetched page is
//! parsed synchronously into plain records, so no DOM handle ever crosses an
//! await point.

pub mod config;
pub mod extractor;
pub mod listing_parser;
pub mod normalizer;
pub mod strategy;

pub use config::{ExclusionSpec, FieldSelectors, ListingSelectors};
pub use extractor::extract;
pub use listing_parser::{ListingParser, PageVerdict, ParsedPage};
pub use normalizer::{ItemNormalizer, Rejection};
pub use strategy::{SelectorStrategy, StrategySpec};
