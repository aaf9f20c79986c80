//! Progress reporting seam
//!
//! The crawler and the enrichment batcher report through a `ProgressSink`
//! instead of logging user-facing progress themselves.

use serde::Serialize;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

use crate::crawl::StopReason;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum ProgressEvent {
    PageFetched {
        page: u32,
        items: usize,
        reported_page_count: Option<u32>,
    },
    CrawlFinished {
        pages: u32,
        listings: usize,
        reason: StopReason,
    },
    WindowStarted {
        window: usize,
        size: usize,
    },
    WindowFinished {
        window: usize,
        enriched: usize,
        dropped: usize,
    },
    EnrichmentFinished {
        eligible: usize,
        enriched: usize,
        dropped: usize,
    },
}

pub trait ProgressSink: Send + Sync {
    fn emit(&self, event: ProgressEvent);
}

/// Drops every event.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopProgress;

impl ProgressSink for NoopProgress {
    fn emit(&self, _event: ProgressEvent) {}
}

/// Logs each event at info level.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingProgress;

impl ProgressSink for TracingProgress {
    fn emit(&self, event: ProgressEvent) {
        match event {
            ProgressEvent::PageFetched {
                page,
                items,
                reported_page_count,
            } => info!(page, items, ?reported_page_count, "page fetched"),
            ProgressEvent::CrawlFinished {
                pages,
                listings,
                reason,
            } => info!(pages, listings, ?reason, "crawl finished"),
            ProgressEvent::WindowStarted { window, size } => {
                info!(window, size, "enrichment window started")
            }
            ProgressEvent::WindowFinished {
                window,
                enriched,
                dropped,
            } => info!(window, enriched, dropped, "enrichment window finished"),
            ProgressEvent::EnrichmentFinished {
                eligible,
                enriched,
                dropped,
            } => info!(eligible, enriched, dropped, "enrichment finished"),
        }
    }
}

/// Forwards events into an unbounded channel. A closed receiver is ignored.
#[derive(Debug, Clone)]
pub struct ChannelProgress {
    tx: UnboundedSender<ProgressEvent>,
}

impl ChannelProgress {
    pub fn new(tx: UnboundedSender<ProgressEvent>) -> Self {
        Self { tx }
    }
}

impl ProgressSink for ChannelProgress {
    fn emit(&self, event: ProgressEvent) {
        let _ = self.tx.send(event);
    }
}
