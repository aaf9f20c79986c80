//! Listing acquisition pipeline for the procurement API
//!
//! Builds on `mp-auth` for bearer tokens and adds everything that talks to
//! the listing endpoints:
//!
//! - `executor`: one authenticated GET with timeout, classification and
//!   exponential-backoff retry
//! - `crawl`: sequential page-by-page search until the server says stop
//! - `enrich`: eligibility filter plus windowed, barrier-synchronized detail
//!   fetches
//! - `health`: session verdict from credential expiry signals and an
//!   optional live probe
//!
//! Progress leaves the pipeline only through a `ProgressSink`, so the same
//! core can feed a terminal, a log aggregator or an event stream.

pub mod api;
pub mod crawl;
pub mod enrich;
pub mod error;
pub mod executor;
pub mod health;
pub mod listing;
pub mod metrics;
pub mod progress;

#[cfg(test)]
mod test_support;

pub use api::{DATE_FORMAT, Endpoints, SearchFilters};
pub use crawl::{CrawlOutcome, Crawler, StopReason};
pub use enrich::{EnrichOutcome, Enricher, is_eligible};
pub use error::{Error, ErrorClass, FetchError, Result};
pub use executor::{Executor, RetryPolicy};
pub use health::{
    ExpirySignal, HealthReport, HealthThresholds, LiveProbe, ProbeOutcome, SessionHealth, Verdict,
    classify, collect_signals,
};
pub use listing::{
    EnrichedListing, Institution, LineItem, Listing, ListingDetail, PageResult, parse_timestamp,
};
pub use progress::{ChannelProgress, NoopProgress, ProgressEvent, ProgressSink, TracingProgress};
