//! Detail enrichment for listings nobody has bid on yet
//!
//! Eligible listings are fetched in windows of `concurrency` requests. All
//! requests of a window settle before the next window starts, so no more
//! than `concurrency` detail requests are ever in flight.
//!
//! A 401 aborts the run and discards what was enriched so far. Any other
//! per-listing failure drops that listing and the run continues. Within a
//! window results arrive in completion order.

use std::sync::Arc;

use chrono::{DateTime, FixedOffset, Offset, TimeDelta, Utc};
use futures_util::StreamExt;
use futures_util::stream::FuturesUnordered;
use mp_auth::TokenManager;
use serde::Serialize;
use tracing::{instrument, warn};

use crate::api::Endpoints;
use crate::error::{ErrorClass, Result};
use crate::executor::{Executor, RetryPolicy};
use crate::listing::{EnrichedListing, Listing, ListingDetail};
use crate::metrics;
use crate::progress::{NoopProgress, ProgressEvent, ProgressSink};

pub const DEFAULT_CONCURRENCY: usize = 5;
pub const DEFAULT_WINDOW_HOURS: i64 = 72;

/// A listing qualifies when it has no offers at all (both counts known and
/// zero) and closes between `now` and `now + window`, inclusive. Anything
/// unknown or unparseable is excluded.
///
/// Closing times without an offset are local to the API; `naive_offset`
/// says which local time that is.
pub fn is_eligible(
    listing: &Listing,
    now: DateTime<Utc>,
    window: TimeDelta,
    naive_offset: FixedOffset,
) -> bool {
    if listing.own_offers != Some(0) || listing.total_offers != Some(0) {
        return false;
    }
    let Some(closing) = listing.closing_at(naive_offset) else {
        return false;
    };
    let remaining = closing - now;
    remaining >= TimeDelta::zero() && remaining <= window
}

#[derive(Debug, Clone, Serialize)]
pub struct EnrichOutcome {
    pub eligible: usize,
    pub enriched: Vec<EnrichedListing>,
    /// Codes of eligible listings whose detail could not be fetched
    pub dropped: Vec<String>,
}

pub struct Enricher {
    tokens: Arc<TokenManager>,
    executor: Executor,
    endpoints: Endpoints,
    policy: RetryPolicy,
    concurrency: usize,
    window: TimeDelta,
    naive_offset: FixedOffset,
    progress: Arc<dyn ProgressSink>,
}

impl Enricher {
    /// `concurrency` below 1 is treated as 1.
    pub fn new(
        tokens: Arc<TokenManager>,
        executor: Executor,
        endpoints: Endpoints,
        policy: RetryPolicy,
        concurrency: usize,
    ) -> Self {
        Self {
            tokens,
            executor,
            endpoints,
            policy,
            concurrency: concurrency.max(1),
            window: TimeDelta::hours(DEFAULT_WINDOW_HOURS),
            naive_offset: Utc.fix(),
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_eligibility_window(mut self, window: TimeDelta) -> Self {
        self.window = window;
        self
    }

    /// Offset for closing timestamps sent without one. Defaults to UTC.
    pub fn with_naive_offset(mut self, offset: FixedOffset) -> Self {
        self.naive_offset = offset;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    #[instrument(skip_all, fields(listings = listings.len(), concurrency = self.concurrency))]
    pub async fn enrich(&self, listings: &[Listing]) -> Result<EnrichOutcome> {
        let now = Utc::now();
        let eligible: Vec<&Listing> = listings
            .iter()
            .filter(|l| is_eligible(l, now, self.window, self.naive_offset))
            .collect();

        let mut enriched = Vec::with_capacity(eligible.len());
        let mut dropped = Vec::new();

        for (index, window) in eligible.chunks(self.concurrency).enumerate() {
            let number = index + 1;
            self.progress.emit(ProgressEvent::WindowStarted {
                window: number,
                size: window.len(),
            });
            let (enriched_before, dropped_before) = (enriched.len(), dropped.len());

            let token = self.tokens.get_valid_token().await?;
            let token = token.as_str();
            let mut in_flight: FuturesUnordered<_> = window
                .iter()
                .map(|&listing| async move {
                    let url = self.endpoints.detail(&listing.id);
                    let detail = self
                        .executor
                        .execute(&url, token, &self.policy)
                        .await
                        .and_then(|body| ListingDetail::from_response(&body));
                    (listing, detail)
                })
                .collect();

            while let Some((listing, detail)) = in_flight.next().await {
                match detail {
                    Ok(detail) => {
                        metrics::record_enrichment("enriched");
                        enriched.push(EnrichedListing {
                            listing: listing.clone(),
                            detail,
                        });
                    }
                    Err(e) if e.class() == ErrorClass::FatalAuth => {
                        warn!(id = %listing.id, "session rejected during enrichment, aborting");
                        self.tokens.invalidate().await;
                        return Err(e.into());
                    }
                    Err(e) => {
                        metrics::record_enrichment("dropped");
                        warn!(id = %listing.id, error = %e, "dropping listing without detail");
                        dropped.push(listing.id.clone());
                    }
                }
            }

            self.progress.emit(ProgressEvent::WindowFinished {
                window: number,
                enriched: enriched.len() - enriched_before,
                dropped: dropped.len() - dropped_before,
            });
        }

        self.progress.emit(ProgressEvent::EnrichmentFinished {
            eligible: eligible.len(),
            enriched: enriched.len(),
            dropped: dropped.len(),
        });

        Ok(EnrichOutcome {
            eligible: eligible.len(),
            enriched,
            dropped,
        })
    }
}
