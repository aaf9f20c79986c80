//! Sequential page-by-page search
//!
//! One page in flight at a time. The crawl stops at the first of:
//!
//! - `max_pages` pages requested
//! - the server-reported `pageCount` reached
//! - a page with zero listings
//! - a response without `payload.resultados` (end of data, not an error)
//!
//! Any request failure aborts the whole crawl, and so does a result entry
//! that is not a listing. A 401 also drops the manager's cached token so the
//! next caller rereads the credential file.

use std::sync::Arc;
use std::time::Duration;

use mp_auth::TokenManager;
use serde::Serialize;
use tracing::{debug, instrument};

use crate::api::{Endpoints, SearchFilters};
use crate::error::{ErrorClass, Result};
use crate::executor::{Executor, RetryPolicy};
use crate::listing::{Listing, PageResult};
use crate::metrics;
use crate::progress::{NoopProgress, ProgressEvent, ProgressSink};

/// Politeness delay between consecutive page requests
pub const DEFAULT_PAGE_DELAY: Duration = Duration::from_secs(1);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    MaxPages,
    LastPage,
    EmptyPage,
    MissingPayload,
}

#[derive(Debug, Clone, Serialize)]
pub struct CrawlOutcome {
    /// Listings in server order, page by page
    pub listings: Vec<Listing>,
    pub pages_requested: u32,
    pub reported_total: Option<u64>,
    pub stop_reason: StopReason,
}

pub struct Crawler {
    tokens: Arc<TokenManager>,
    executor: Executor,
    endpoints: Endpoints,
    policy: RetryPolicy,
    page_delay: Duration,
    progress: Arc<dyn ProgressSink>,
}

impl Crawler {
    pub fn new(
        tokens: Arc<TokenManager>,
        executor: Executor,
        endpoints: Endpoints,
        policy: RetryPolicy,
    ) -> Self {
        Self {
            tokens,
            executor,
            endpoints,
            policy,
            page_delay: DEFAULT_PAGE_DELAY,
            progress: Arc::new(NoopProgress),
        }
    }

    pub fn with_page_delay(mut self, delay: Duration) -> Self {
        self.page_delay = delay;
        self
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    #[instrument(skip_all, fields(from = %filters.from, to = %filters.to, max_pages = max_pages))]
    pub async fn crawl(&self, filters: &SearchFilters, max_pages: u32) -> Result<CrawlOutcome> {
        let mut listings = Vec::new();
        let mut reported_total = None;
        let mut pages_requested = 0;
        let mut stop_reason = StopReason::MaxPages;

        for page in 1..=max_pages {
            if page > 1 && !self.page_delay.is_zero() {
                tokio::time::sleep(self.page_delay).await;
            }

            let token = self.tokens.get_valid_token().await?;
            let url = self.endpoints.search(filters, page);
            pages_requested = page;
            let body = match self.executor.execute(&url, &token, &self.policy).await {
                Ok(body) => body,
                Err(e) => {
                    if e.class() == ErrorClass::FatalAuth {
                        self.tokens.invalidate().await;
                    }
                    return Err(e.into());
                }
            };
            metrics::record_page();

            let Some(result) = PageResult::from_response(page, &body)? else {
                debug!(page, "response has no result payload, treating as end of data");
                stop_reason = StopReason::MissingPayload;
                break;
            };

            self.progress.emit(ProgressEvent::PageFetched {
                page,
                items: result.items.len(),
                reported_page_count: result.reported_page_count,
            });

            if result.items.is_empty() {
                stop_reason = StopReason::EmptyPage;
                break;
            }
            if result.reported_total.is_some() {
                reported_total = result.reported_total;
            }
            listings.extend(result.items);

            if result.reported_page_count.is_some_and(|count| page >= count) {
                stop_reason = StopReason::LastPage;
                break;
            }
        }

        self.progress.emit(ProgressEvent::CrawlFinished {
            pages: pages_requested,
            listings: listings.len(),
            reason: stop_reason,
        });

        Ok(CrawlOutcome {
            listings,
            pages_requested,
            reported_total,
            stop_reason,
        })
    }
}
