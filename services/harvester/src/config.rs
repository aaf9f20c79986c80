//! Configuration types and loading
//!
//! Config precedence: CLI args > env vars > config file > defaults.
//! Every section is optional; an empty file yields the defaults below.
//! `MP_CREDENTIALS_PATH` overrides `credentials.path`.

use chrono::FixedOffset;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Env var overriding the credential bundle location
pub const CREDENTIALS_PATH_ENV: &str = "MP_CREDENTIALS_PATH";

const DEFAULT_SEARCH_URL: &str =
    "https://servicios-compra-agil.mercadopublico.cl/v1/compra-agil/solicitud";
const DEFAULT_DETAIL_URL: &str =
    "https://servicios-compra-agil.mercadopublico.cl/v1/compra-agil/solicitud/";

/// Root configuration
#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub credentials: CredentialsConfig,
    pub api: ApiConfig,
    pub crawl: CrawlConfig,
    pub enrichment: EnrichmentConfig,
    pub health: HealthConfig,
    pub output: OutputConfig,
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CredentialsConfig {
    pub path: PathBuf,
    pub min_validity_secs: u64,
}

impl Default for CredentialsConfig {
    fn default() -> Self {
        Self {
            path: PathBuf::from("storage_state.json"),
            min_validity_secs: mp_auth::DEFAULT_MIN_VALIDITY_SECS,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    pub search_url: String,
    /// Listing code is appended as a path segment
    pub detail_url: String,
    pub token_endpoint: String,
    pub client_id: String,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            search_url: DEFAULT_SEARCH_URL.into(),
            detail_url: DEFAULT_DETAIL_URL.into(),
            token_endpoint: mp_auth::DEFAULT_TOKEN_ENDPOINT.into(),
            client_id: mp_auth::DEFAULT_CLIENT_ID.into(),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct CrawlConfig {
    pub max_pages: u32,
    pub days_back: u32,
    pub page_size: u32,
    pub order_by: String,
    pub status: String,
    pub region: Option<String>,
    pub my_categories: Option<bool>,
    pub page_delay_ms: u64,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
}

impl Default for CrawlConfig {
    fn default() -> Self {
        Self {
            max_pages: 10,
            days_back: 3,
            page_size: 50,
            order_by: "recent".into(),
            status: "2".into(),
            region: None,
            my_categories: None,
            page_delay_ms: 1_000,
            timeout_ms: 30_000,
            max_retries: 3,
            backoff_base_ms: 1_000,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct EnrichmentConfig {
    pub enabled: bool,
    pub concurrency: usize,
    pub timeout_ms: u64,
    pub max_retries: u32,
    pub backoff_base_ms: u64,
    pub window_hours: i64,
    /// UTC offset of closing timestamps the API sends without one
    pub closing_utc_offset_hours: i32,
}

impl Default for EnrichmentConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            concurrency: 5,
            timeout_ms: 15_000,
            max_retries: 3,
            backoff_base_ms: 1_000,
            window_hours: 72,
            closing_utc_offset_hours: -3,
        }
    }
}

impl EnrichmentConfig {
    pub fn closing_offset(&self) -> Option<FixedOffset> {
        self.closing_utc_offset_hours
            .checked_mul(3600)
            .and_then(FixedOffset::east_opt)
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    pub warn_hours: f64,
    pub critical_hours: f64,
    pub live_probe: bool,
    pub probe_timeout_ms: u64,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            warn_hours: 24.0,
            critical_hours: 6.0,
            live_probe: false,
            probe_timeout_ms: 10_000,
        }
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    /// Prometheus text-file collector target, written at the end of a run
    pub metrics_textfile: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a TOML file, validate it, then overlay
    /// environment variables.
    pub fn load(path: &Path) -> common::Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&contents)?;
        config.validate()?;

        if let Ok(p) = std::env::var(CREDENTIALS_PATH_ENV)
            && !p.trim().is_empty()
        {
            config.credentials.path = PathBuf::from(p);
        }

        Ok(config)
    }

    /// Reject out-of-range values rather than clamping them.
    pub fn validate(&self) -> common::Result<()> {
        let min_validity = self.credentials.min_validity_secs;
        if min_validity > 86_400 {
            return Err(common::Error::out_of_range(
                "credentials.min_validity_secs",
                min_validity,
                "0..=86400",
            ));
        }

        for (field, url) in [
            ("api.search_url", &self.api.search_url),
            ("api.detail_url", &self.api.detail_url),
            ("api.token_endpoint", &self.api.token_endpoint),
        ] {
            if !url.starts_with("http://") && !url.starts_with("https://") {
                return Err(common::Error::Config(format!(
                    "{field} must start with http:// or https://, got: {url}"
                )));
            }
        }
        if self.api.client_id.trim().is_empty() {
            return Err(common::Error::Config("api.client_id must not be empty".into()));
        }

        let crawl = &self.crawl;
        if !(1..=50).contains(&crawl.max_pages) {
            return Err(common::Error::out_of_range("crawl.max_pages", crawl.max_pages, "1..=50"));
        }
        if !(1..=90).contains(&crawl.days_back) {
            return Err(common::Error::out_of_range("crawl.days_back", crawl.days_back, "1..=90"));
        }
        if !(1..=100).contains(&crawl.page_size) {
            return Err(common::Error::out_of_range("crawl.page_size", crawl.page_size, "1..=100"));
        }
        if crawl.timeout_ms == 0 {
            return Err(common::Error::Config("crawl.timeout_ms must be greater than 0".into()));
        }

        let enrichment = &self.enrichment;
        if enrichment.concurrency == 0 {
            return Err(common::Error::Config(
                "enrichment.concurrency must be greater than 0".into(),
            ));
        }
        if enrichment.timeout_ms == 0 {
            return Err(common::Error::Config(
                "enrichment.timeout_ms must be greater than 0".into(),
            ));
        }
        if !(1..=8_760).contains(&enrichment.window_hours) {
            return Err(common::Error::out_of_range(
                "enrichment.window_hours",
                enrichment.window_hours,
                "1..=8760",
            ));
        }
        if !(-12..=14).contains(&enrichment.closing_utc_offset_hours)
            || enrichment.closing_offset().is_none()
        {
            return Err(common::Error::out_of_range(
                "enrichment.closing_utc_offset_hours",
                enrichment.closing_utc_offset_hours,
                "-12..=14",
            ));
        }

        let health = &self.health;
        if !health.warn_hours.is_finite() || !health.critical_hours.is_finite() {
            return Err(common::Error::Config(format!(
                "health thresholds must be finite numbers, got health.warn_hours = {} and health.critical_hours = {}",
                health.warn_hours, health.critical_hours
            )));
        }
        if health.critical_hours < 0.0 || health.warn_hours < 0.0 {
            return Err(common::Error::Config(
                "health thresholds must not be negative".into(),
            ));
        }
        if health.critical_hours > health.warn_hours {
            return Err(common::Error::Config(format!(
                "health.critical_hours ({}) must not exceed health.warn_hours ({})",
                health.critical_hours, health.warn_hours
            )));
        }
        if health.live_probe && health.probe_timeout_ms == 0 {
            return Err(common::Error::Config(
                "health.probe_timeout_ms must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Resolve config file path from CLI arg or CONFIG_PATH env var.
    pub fn resolve_path(cli_path: Option<&str>) -> PathBuf {
        if let Some(p) = cli_path {
            return PathBuf::from(p);
        }
        if let Ok(p) = std::env::var("CONFIG_PATH") {
            return PathBuf::from(p);
        }
        PathBuf::from("mp-harvest.toml")
    }
}
