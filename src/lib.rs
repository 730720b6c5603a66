//! Shop Harvest - multi-site product listing harvester
//!
//! Searches several e-commerce sites for one query, extracts a normalized
//! [`Record`](domain::Record) per listing and merges the results into one
//! deduplicated set ready for JSON or CSV export.

pub mod crawling;
pub mod domain;
pub mod infrastructure;
