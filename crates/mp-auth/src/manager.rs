//! Access token lifecycle
//!
//! `TokenManager` is the one place that decides whether the stored access
//! token can be sent. The credential file is the source of truth; the copy
//! held here is only a cache and is dropped by `invalidate()`.
//!
//! The cache mutex is held across load, refresh and persist, so within one
//! process there is never more than one refresh grant in flight.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use common::Secret;
use serde::Serialize;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::constants::{ACCESS_TOKEN_NAMES, REFRESH_TOKEN_NAMES};
use crate::credentials::{CredentialRecord, CredentialStore};
use crate::error::{Error, Result};
use crate::jwt;
use crate::token::{self, OAuthClient};

/// Where a token's expiry came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpirySource {
    /// `exp` claim inside the token itself (authoritative)
    Payload,
    /// The record's `expires` attribute (may be session-scoped or stale)
    Record,
    Unknown,
}

/// Derived view of one token record. Never persisted.
#[derive(Debug, Clone, Serialize)]
pub struct TokenState {
    pub present: bool,
    pub expires_at: Option<i64>,
    pub seconds_remaining: Option<i64>,
    pub is_expired: bool,
    pub is_expiring_soon: bool,
    pub source: ExpirySource,
}

impl TokenState {
    pub fn absent() -> Self {
        Self {
            present: false,
            expires_at: None,
            seconds_remaining: None,
            is_expired: true,
            is_expiring_soon: true,
            source: ExpirySource::Unknown,
        }
    }

    /// Derive state for `record` at unix time `now`.
    ///
    /// A present token with no readable expiry is neither expired nor
    /// expiring soon, but it is not `usable` either.
    pub fn from_record(record: Option<&CredentialRecord>, now: i64, min_validity_secs: i64) -> Self {
        let Some(record) = record.filter(|r| !r.value.is_empty()) else {
            return Self::absent();
        };
        let (expires_at, source) = match jwt::expiry(&record.value) {
            Some(exp) => (Some(exp), ExpirySource::Payload),
            None => match record.expires_at() {
                Some(exp) => (Some(exp), ExpirySource::Record),
                None => (None, ExpirySource::Unknown),
            },
        };
        let remaining = expires_at.map(|exp| exp - now);
        Self {
            present: true,
            expires_at,
            seconds_remaining: remaining,
            is_expired: remaining.is_some_and(|r| r <= 0),
            is_expiring_soon: remaining.is_some_and(|r| r <= min_validity_secs),
            source,
        }
    }

    /// Strictly more than `min_validity_secs` left.
    pub fn is_usable(&self, min_validity_secs: i64) -> bool {
        self.seconds_remaining.is_some_and(|r| r > min_validity_secs)
    }
}

/// Read-only report for status output. `error` is set when the bundle
/// could not be read; the token states are then `absent`.
#[derive(Debug, Clone, Serialize)]
pub struct TokenReport {
    pub access: TokenState,
    pub refresh: TokenState,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

struct CachedToken {
    token: Secret<String>,
    expires_at: i64,
}

/// Hands out access tokens with at least `min_validity` left.
pub struct TokenManager {
    store: CredentialStore,
    http_client: reqwest::Client,
    oauth: OAuthClient,
    min_validity: Duration,
    cached: Mutex<Option<CachedToken>>,
}

impl TokenManager {
    pub fn new(
        store: CredentialStore,
        http_client: reqwest::Client,
        oauth: OAuthClient,
        min_validity: Duration,
    ) -> Self {
        Self {
            store,
            http_client,
            oauth,
            min_validity,
            cached: Mutex::new(None),
        }
    }

    pub fn store(&self) -> &CredentialStore {
        &self.store
    }

    pub fn min_validity(&self) -> Duration {
        self.min_validity
    }

    /// Return an access token valid for more than `min_validity`.
    ///
    /// No network traffic when the stored token is still good. Otherwise one
    /// refresh grant is attempted; any failure of that grant is
    /// `AuthExpired` and is not retried.
    pub async fn get_valid_token(&self) -> Result<String> {
        let min = self.min_validity_secs();
        let mut cached = self.cached.lock().await;

        let now = now_epoch();
        if let Some(c) = cached.as_ref()
            && c.expires_at - now > min
        {
            return Ok(c.token.expose().clone());
        }

        let mut bundle = self.store.load().await?;
        let access_record = bundle.find(ACCESS_TOKEN_NAMES);
        let access = TokenState::from_record(access_record, now, min);
        if let (Some(record), true, Some(expires_at)) =
            (access_record, access.is_usable(min), access.expires_at)
        {
            debug!(seconds_remaining = access.seconds_remaining, "stored access token is valid");
            *cached = Some(CachedToken {
                token: Secret::new(record.value.clone()),
                expires_at,
            });
            return Ok(record.value.clone());
        }

        let (prior_refresh, domain) = match bundle.find(REFRESH_TOKEN_NAMES) {
            Some(r) if !r.value.is_empty() => (r.value.clone(), r.domain.clone()),
            _ => {
                warn!("access token unusable and no refresh token stored");
                return Err(Error::AuthExpired("no refresh token in credential bundle".into()));
            }
        };
        if jwt::expiry(&prior_refresh).is_some_and(|exp| exp <= now) {
            warn!("refresh token has expired");
            return Err(Error::AuthExpired("refresh token has expired".into()));
        }

        info!(
            seconds_remaining = access.seconds_remaining,
            "access token expiring, running refresh grant"
        );
        let refreshed = match token::refresh_grant(&self.http_client, &self.oauth, &prior_refresh).await {
            Ok(t) => {
                metrics::counter!("mp_token_refresh_total", "result" => "success").increment(1);
                t
            }
            Err(e) => {
                let result = if e.requires_reauth() { "rejected" } else { "error" };
                metrics::counter!("mp_token_refresh_total", "result" => result).increment(1);
                *cached = None;
                return Err(e);
            }
        };

        let now = now_epoch();
        let access_expires = jwt::expiry(&refreshed.access_token)
            .or_else(|| refreshed.expires_in.map(|s| now + s as i64));
        let remaining = access_expires.map(|exp| exp - now);
        let Some(expires_at) = access_expires.filter(|_| remaining.is_some_and(|r| r > min)) else {
            return Err(Error::AuthExpired(format!(
                "refreshed access token lifetime {remaining:?}s does not exceed the {min}s minimum"
            )));
        };

        let rotated = refreshed.refresh_token.is_some();
        let refresh_value = refreshed.refresh_token.unwrap_or(prior_refresh);
        let refresh_expires = jwt::expiry(&refresh_value)
            .or_else(|| refreshed.refresh_expires_in.map(|s| now + s as i64));

        bundle.set_value(
            ACCESS_TOKEN_NAMES,
            refreshed.access_token.clone(),
            Some(expires_at),
            &domain,
        );
        bundle.set_value(REFRESH_TOKEN_NAMES, refresh_value, refresh_expires, &domain);
        self.store.save(&bundle).await?;

        info!(seconds_remaining = remaining, rotated, "access token refreshed");
        *cached = Some(CachedToken {
            token: Secret::new(refreshed.access_token.clone()),
            expires_at,
        });
        Ok(refreshed.access_token)
    }

    /// Drop the cached token so the next call rereads the credential file.
    pub async fn invalidate(&self) {
        *self.cached.lock().await = None;
        debug!("cached access token invalidated");
    }

    /// Best-effort token state from the credential file. Never refreshes
    /// and never fails.
    pub async fn inspect_token(&self) -> TokenReport {
        let min = self.min_validity_secs();
        match self.store.load().await {
            Ok(bundle) => {
                let now = now_epoch();
                TokenReport {
                    access: TokenState::from_record(bundle.find(ACCESS_TOKEN_NAMES), now, min),
                    refresh: TokenState::from_record(bundle.find(REFRESH_TOKEN_NAMES), now, min),
                    error: None,
                }
            }
            Err(e) => TokenReport {
                access: TokenState::absent(),
                refresh: TokenState::absent(),
                error: Some(e.to_string()),
            },
        }
    }

    fn min_validity_secs(&self) -> i64 {
        i64::try_from(self.min_validity.as_secs()).unwrap_or(i64::MAX)
    }
}

/// Current unix time in seconds.
pub fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs() as i64
}
