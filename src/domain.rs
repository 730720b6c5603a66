//! Domain module - records, outcomes and collaborator contracts
//!
//! Everything here is free of I/O. Each module is its own file in the
//! domain/ directory; commonly used items are re-exported below.

pub mod clock;
pub mod fetch;
pub mod outcome;
pub mod record;

pub use clock::{Clock, FixedClock, SystemClock};
pub use fetch::{FetchFailure, FetchRequest, PageFetcher, PageSnapshot};
pub use outcome::{RunSummary, SiteOutcome, SiteReport};
pub use record::{FieldValue, Record, RecordKey, UNAVAILABLE_MARKER};
