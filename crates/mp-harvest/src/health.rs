//! Session health verdict
//!
//! Up to three expiry signals are read from the credential bundle:
//!
//! | Signal         | Record                 | Expiry taken from        |
//! |----------------|------------------------|--------------------------|
//! | `access_token` | access token           | JWT `exp`, else `expires`|
//! | `session`      | SSO session record     | record `expires`         |
//! | `identity`     | SSO identity record    | JWT `exp`                |
//!
//! None of them alone proves the session usable, so the verdict follows the
//! smallest remaining time. With no readable signal at all the verdict is
//! `Warn`: unknown is not the same as broken. A live probe that fails turns
//! any verdict into `Critical`.

use chrono::{DateTime, Utc};
use mp_auth::{
    ACCESS_TOKEN_NAMES, CredentialBundle, CredentialStore, IDENTITY_RECORD_NAMES,
    SESSION_RECORD_NAMES, TokenState, jwt, now_epoch,
};
use reqwest::Url;
use serde::Serialize;
use tracing::{debug, instrument, warn};

use crate::executor::{Executor, RetryPolicy};

const SECS_PER_HOUR: f64 = 3600.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Verdict {
    Ok,
    Warn,
    Critical,
}

impl Verdict {
    pub fn exit_code(self) -> u8 {
        match self {
            Verdict::Ok => 0,
            Verdict::Warn => 1,
            Verdict::Critical => 2,
        }
    }
}

/// Hour thresholds, both inclusive.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct HealthThresholds {
    pub warn_hours: f64,
    pub critical_hours: f64,
}

impl Default for HealthThresholds {
    fn default() -> Self {
        Self {
            warn_hours: 24.0,
            critical_hours: 6.0,
        }
    }
}

/// Verdict for the minimum remaining hours across all readable signals.
pub fn classify(min_hours: Option<f64>, thresholds: &HealthThresholds) -> Verdict {
    match min_hours {
        None => Verdict::Warn,
        Some(h) if h <= 0.0 || h <= thresholds.critical_hours => Verdict::Critical,
        Some(h) if h <= thresholds.warn_hours => Verdict::Warn,
        Some(_) => Verdict::Ok,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ExpirySignal {
    pub name: &'static str,
    pub present: bool,
    /// `None` when the record is missing or carries no readable expiry
    pub hours_remaining: Option<f64>,
}

impl ExpirySignal {
    fn new(name: &'static str, present: bool, expires_at: Option<i64>, now: i64) -> Self {
        Self {
            name,
            present,
            hours_remaining: expires_at.map(|exp| (exp - now) as f64 / SECS_PER_HOUR),
        }
    }
}

/// Read the three expiry signals from `bundle` at unix time `now`.
pub fn collect_signals(bundle: &CredentialBundle, now: i64) -> Vec<ExpirySignal> {
    let access = TokenState::from_record(bundle.find(ACCESS_TOKEN_NAMES), now, 0);
    let session = bundle.find(SESSION_RECORD_NAMES);
    let identity = bundle.find(IDENTITY_RECORD_NAMES);
    vec![
        ExpirySignal::new("access_token", access.present, access.expires_at, now),
        ExpirySignal::new(
            "session",
            session.is_some(),
            session.and_then(|r| r.expires_at()),
            now,
        ),
        ExpirySignal::new(
            "identity",
            identity.is_some(),
            identity.and_then(|r| jwt::expiry(&r.value)),
            now,
        ),
    ]
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProbeOutcome {
    pub ok: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// One authenticated GET used to observe the session directly.
#[derive(Debug, Clone)]
pub struct LiveProbe {
    executor: Executor,
    url: Url,
    policy: RetryPolicy,
}

impl LiveProbe {
    pub fn new(executor: Executor, url: Url, policy: RetryPolicy) -> Self {
        Self {
            executor,
            url,
            policy,
        }
    }

    /// Probe with the stored token as-is. No token is a failed probe.
    pub async fn run(&self, token: Option<&str>) -> ProbeOutcome {
        let Some(token) = token.filter(|t| !t.is_empty()) else {
            return ProbeOutcome {
                ok: false,
                error: Some("no access token to probe with".into()),
            };
        };
        match self.executor.execute(&self.url, token, &self.policy).await {
            Ok(_) => ProbeOutcome {
                ok: true,
                error: None,
            },
            Err(e) => {
                warn!(error = %e, "live probe failed");
                ProbeOutcome {
                    ok: false,
                    error: Some(e.to_string()),
                }
            }
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub verdict: Verdict,
    pub min_hours: Option<f64>,
    pub signals: Vec<ExpirySignal>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub probe: Option<ProbeOutcome>,
    /// Why the bundle could not be read
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub checked_at: DateTime<Utc>,
}

impl HealthReport {
    pub fn exit_code(&self) -> u8 {
        self.verdict.exit_code()
    }
}

pub struct SessionHealth {
    store: CredentialStore,
    thresholds: HealthThresholds,
    probe: Option<LiveProbe>,
}

impl SessionHealth {
    pub fn new(store: CredentialStore, thresholds: HealthThresholds) -> Self {
        Self {
            store,
            thresholds,
            probe: None,
        }
    }

    pub fn with_probe(mut self, probe: LiveProbe) -> Self {
        self.probe = Some(probe);
        self
    }

    /// Never fails: an unreadable bundle yields no signals and sets `error`.
    #[instrument(skip_all, fields(path = %self.store.path().display()))]
    pub async fn check(&self) -> HealthReport {
        let now = now_epoch();
        let (bundle, error) = match self.store.load().await {
            Ok(bundle) => (Some(bundle), None),
            Err(e) => {
                warn!(error = %e, "credential bundle unreadable");
                (None, Some(e.to_string()))
            }
        };

        let signals = bundle
            .as_ref()
            .map(|b| collect_signals(b, now))
            .unwrap_or_default();
        let min_hours = signals
            .iter()
            .filter_map(|s| s.hours_remaining)
            .reduce(f64::min);
        let mut verdict = classify(min_hours, &self.thresholds);
        debug!(?min_hours, ?verdict, "signal verdict");

        let probe = match &self.probe {
            Some(probe) => {
                let token = bundle
                    .as_ref()
                    .and_then(|b| b.find(ACCESS_TOKEN_NAMES))
                    .map(|r| r.value.as_str());
                let outcome = probe.run(token).await;
                if !outcome.ok {
                    verdict = Verdict::Critical;
                }
                Some(outcome)
            }
            None => None,
        };

        HealthReport {
            verdict,
            min_hours,
            signals,
            probe,
            error,
            checked_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{credential_file, fast_policy, jwt_expiring_in, serve};
    use axum::Router;
    use axum::http::StatusCode;
    use axum::response::IntoResponse;
    use axum::routing::get;
    use serde_json::json;

    const HOUR: i64 = 3600;

    fn records(access_h: i64, session_h: i64, identity_h: i64) -> Vec<serde_json::Value> {
        let now = crate::test_support::now_epoch();
        vec![
            json!({"name": "access_token", "value": jwt_expiring_in(access_h * HOUR)}),
            json!({"name": "KEYCLOAK_SESSION", "value": "s", "expires": now + session_h * HOUR}),
            json!({"name": "KEYCLOAK_IDENTITY", "value": jwt_expiring_in(identity_h * HOUR)}),
        ]
    }

    /// Probe target answering 200 when `accept`, 401 otherwise.
    async fn probe(accept: bool) -> LiveProbe {
        let app = Router::new().route(
            "/search",
            get(move || async move {
                if accept {
                    axum::Json(json!({"payload": {"resultados": []}})).into_response()
                } else {
                    StatusCode::UNAUTHORIZED.into_response()
                }
            }),
        );
        let url = Url::parse(&format!("{}/search", serve(app).await)).unwrap();
        LiveProbe::new(Executor::new(reqwest::Client::new()), url, fast_policy(0))
    }

    #[test]
    fn thresholds_with_defaults() {
        let t = HealthThresholds::default();
        assert_eq!(classify(Some(5.0), &t), Verdict::Critical);
        assert_eq!(classify(Some(6.0), &t), Verdict::Critical);
        assert_eq!(classify(Some(-2.0), &t), Verdict::Critical);
        assert_eq!(classify(Some(10.0), &t), Verdict::Warn);
        assert_eq!(classify(Some(24.0), &t), Verdict::Warn);
        assert_eq!(classify(Some(48.0), &t), Verdict::Ok);
        assert_eq!(classify(None, &t), Verdict::Warn);
    }

    #[test]
    fn zero_critical_threshold_still_flags_expired() {
        let t = HealthThresholds {
            warn_hours: 1.0,
            critical_hours: 0.0,
        };
        assert_eq!(classify(Some(0.0), &t), Verdict::Critical);
        assert_eq!(classify(Some(0.5), &t), Verdict::Warn);
    }

    #[test]
    fn exit_codes() {
        assert_eq!(Verdict::Ok.exit_code(), 0);
        assert_eq!(Verdict::Warn.exit_code(), 1);
        assert_eq!(Verdict::Critical.exit_code(), 2);
    }

    #[test]
    fn signals_prefer_jwt_and_ignore_session_scoped_records() {
        let now = 1_700_000_000;
        let bundle: CredentialBundle = serde_json::from_value(json!({"cookies": [
            {"name": "token", "value": "opaque", "expires": now + 2 * HOUR},
            {"name": "KEYCLOAK_SESSION_LEGACY", "value": "s", "expires": -1},
            {"name": "KEYCLOAK_IDENTITY", "value": "not-a-jwt", "expires": now + 99 * HOUR}
        ]}))
        .unwrap();

        let signals = collect_signals(&bundle, now);
        assert_eq!(signals[0].hours_remaining, Some(2.0));
        assert!(signals[1].present);
        assert_eq!(signals[1].hours_remaining, None);
        // identity expiry is only read from the token itself
        assert!(signals[2].present);
        assert_eq!(signals[2].hours_remaining, None);
    }

    #[tokio::test]
    async fn minimum_signal_decides() {
        let dir = tempfile::tempdir().unwrap();
        let store = credential_file(&dir, records(30, 10, 48)).await;

        let report = SessionHealth::new(store, HealthThresholds::default()).check().await;

        assert_eq!(report.verdict, Verdict::Warn);
        let min = report.min_hours.unwrap();
        assert!((9.9..=10.0).contains(&min), "min_hours = {min}");
        assert!(report.probe.is_none());
        assert!(report.error.is_none());
    }

    #[tokio::test]
    async fn short_signal_is_critical_and_long_ones_ok() {
        let dir = tempfile::tempdir().unwrap();
        let store = credential_file(&dir, records(5, 100, 100)).await;
        let report = SessionHealth::new(store, HealthThresholds::default()).check().await;
        assert_eq!(report.verdict, Verdict::Critical);

        let dir = tempfile::tempdir().unwrap();
        let store = credential_file(&dir, records(48, 72, 96)).await;
        let report = SessionHealth::new(store, HealthThresholds::default()).check().await;
        assert_eq!(report.verdict, Verdict::Ok);
    }

    #[tokio::test]
    async fn no_signals_is_warn() {
        let dir = tempfile::tempdir().unwrap();
        let store = credential_file(&dir, vec![json!({"name": "other", "value": "x"})]).await;
        let report = SessionHealth::new(store, HealthThresholds::default()).check().await;
        assert_eq!(report.verdict, Verdict::Warn);
        assert_eq!(report.min_hours, None);
    }

    #[tokio::test]
    async fn unreadable_bundle_is_warn_with_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = CredentialStore::new(dir.path().join("missing.json"));
        let report = SessionHealth::new(store, HealthThresholds::default()).check().await;
        assert_eq!(report.verdict, Verdict::Warn);
        assert!(report.signals.is_empty());
        assert!(report.error.is_some());
    }

    #[tokio::test]
    async fn failing_probe_forces_critical() {
        let dir = tempfile::tempdir().unwrap();
        let store = credential_file(&dir, records(48, 72, 96)).await;

        let report = SessionHealth::new(store, HealthThresholds::default())
            .with_probe(probe(false).await)
            .check()
            .await;

        assert_eq!(report.verdict, Verdict::Critical);
        assert_eq!(report.exit_code(), 2);
        let probe = report.probe.unwrap();
        assert!(!probe.ok);
        assert!(probe.error.unwrap().contains("401"));
    }

    #[tokio::test]
    async fn passing_probe_keeps_signal_verdict() {
        let dir = tempfile::tempdir().unwrap();
        let store = credential_file(&dir, records(48, 72, 96)).await;

        let report = SessionHealth::new(store, HealthThresholds::default())
            .with_probe(probe(true).await)
            .check()
            .await;

        assert_eq!(report.verdict, Verdict::Ok);
        assert!(report.probe.unwrap().ok);
    }

    #[tokio::test]
    async fn probe_without_token_fails() {
        let outcome = probe(true).await.run(None).await;
        assert!(!outcome.ok);
    }
}
