//! The `run` and `check-session` commands
//!
//! Both build their collaborators from `Config` and return a serializable
//! report; printing and exit codes are left to `main`.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Offset, TimeDelta, Utc};
use mp_auth::{CredentialStore, OAuthClient, TokenManager};
use mp_harvest::{
    CrawlOutcome, Crawler, EnrichOutcome, Enricher, Endpoints, Executor, HealthReport,
    HealthThresholds, LiveProbe, ProgressSink, RetryPolicy, SearchFilters, SessionHealth,
};
use serde::Serialize;
use tracing::{debug, info};

use crate::config::Config;
use crate::error::{Error, Result};

const USER_AGENT: &str = concat!("mp-harvest/", env!("CARGO_PKG_VERSION"));

/// Everything one `run` produced.
#[derive(Debug, Serialize)]
pub struct RunReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub from: NaiveDate,
    pub to: NaiveDate,
    pub crawl: CrawlOutcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enrichment: Option<EnrichOutcome>,
}

pub fn http_client() -> Result<reqwest::Client> {
    reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .build()
        .map_err(|e| Error::HttpClient(e.to_string()))
}

pub fn search_filters(config: &Config, today: NaiveDate) -> SearchFilters {
    let crawl = &config.crawl;
    SearchFilters {
        order_by: crawl.order_by.clone(),
        page_size: crawl.page_size,
        status: crawl.status.clone(),
        region: crawl.region.clone(),
        my_categories: crawl.my_categories,
        ..SearchFilters::last_days(crawl.days_back, today)
    }
}

fn token_manager(config: &Config, client: reqwest::Client) -> Arc<TokenManager> {
    Arc::new(TokenManager::new(
        CredentialStore::new(&config.credentials.path),
        client,
        OAuthClient {
            token_endpoint: config.api.token_endpoint.clone(),
            client_id: config.api.client_id.clone(),
        },
        Duration::from_secs(config.credentials.min_validity_secs),
    ))
}

/// Crawl, then enrich when enabled.
pub async fn run(
    config: &Config,
    run_id: &str,
    progress: Arc<dyn ProgressSink>,
) -> Result<RunReport> {
    let started_at = Utc::now();
    let client = http_client()?;
    let endpoints = Endpoints::new(&config.api.search_url, &config.api.detail_url)?;
    let executor = Executor::new(client.clone());
    let tokens = token_manager(config, client);

    let report = tokens.inspect_token().await;
    debug!(
        access_remaining = ?report.access.seconds_remaining,
        refresh_remaining = ?report.refresh.seconds_remaining,
        "credential state before run"
    );

    let filters = search_filters(config, started_at.date_naive());
    let crawl = &config.crawl;
    let crawler = Crawler::new(
        tokens.clone(),
        executor.clone(),
        endpoints.clone(),
        RetryPolicy::from_millis(crawl.timeout_ms, crawl.max_retries, crawl.backoff_base_ms),
    )
    .with_page_delay(Duration::from_millis(crawl.page_delay_ms))
    .with_progress(progress.clone());
    let outcome = crawler.crawl(&filters, crawl.max_pages).await?;

    let enrichment = if config.enrichment.enabled {
        let e = &config.enrichment;
        let enricher = Enricher::new(
            tokens,
            executor,
            endpoints,
            RetryPolicy::from_millis(e.timeout_ms, e.max_retries, e.backoff_base_ms),
            e.concurrency,
        )
        .with_eligibility_window(TimeDelta::hours(e.window_hours))
        .with_naive_offset(e.closing_offset().unwrap_or(Utc.fix()))
        .with_progress(progress);
        Some(enricher.enrich(&outcome.listings).await?)
    } else {
        None
    };

    info!(
        listings = outcome.listings.len(),
        enriched = enrichment.as_ref().map(|e| e.enriched.len()),
        "run complete"
    );

    Ok(RunReport {
        run_id: run_id.to_string(),
        started_at,
        finished_at: Utc::now(),
        from: filters.from,
        to: filters.to,
        crawl: outcome,
        enrichment,
    })
}

/// Classify the stored session, probing it live when configured.
pub async fn check_session(config: &Config) -> Result<HealthReport> {
    let health = &config.health;
    let mut checker = SessionHealth::new(
        CredentialStore::new(&config.credentials.path),
        HealthThresholds {
            warn_hours: health.warn_hours,
            critical_hours: health.critical_hours,
        },
    );

    if health.live_probe {
        let endpoints = Endpoints::new(&config.api.search_url, &config.api.detail_url)?;
        let filters = SearchFilters {
            page_size: 1,
            ..search_filters(config, Utc::now().date_naive())
        };
        checker = checker.with_probe(LiveProbe::new(
            Executor::new(http_client()?),
            endpoints.search(&filters, 1),
            RetryPolicy::from_millis(health.probe_timeout_ms, 0, 0),
        ));
    }

    Ok(checker.check().await)
}
