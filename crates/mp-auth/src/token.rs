//! OAuth refresh-token grant
//!
//! One POST to the Keycloak token endpoint. Any answer other than a 200 with
//! an `access_token` is a dead session: refresh tokens may rotate, so a
//! failed grant is never repeated here.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::constants::{DEFAULT_CLIENT_ID, DEFAULT_TOKEN_ENDPOINT, REFRESH_TIMEOUT_SECS};
use crate::error::{Error, Result};

/// Where and as whom to run the refresh grant.
#[derive(Debug, Clone)]
pub struct OAuthClient {
    pub token_endpoint: String,
    pub client_id: String,
}

impl Default for OAuthClient {
    fn default() -> Self {
        Self {
            token_endpoint: DEFAULT_TOKEN_ENDPOINT.to_string(),
            client_id: DEFAULT_CLIENT_ID.to_string(),
        }
    }
}

/// Token endpoint response.
///
/// `access_token` is optional here so that its absence can be reported as an
/// expired session rather than a generic decode failure. Durations are
/// deltas in seconds from the response time.
#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshResponse {
    #[serde(default)]
    pub access_token: Option<String>,
    #[serde(default)]
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub refresh_expires_in: Option<u64>,
}

/// A refresh response that is known to carry a usable access token.
#[derive(Debug)]
pub struct RefreshedTokens {
    pub access_token: String,
    /// `None` when the server did not rotate the refresh token
    pub refresh_token: Option<String>,
    pub expires_in: Option<u64>,
    pub refresh_expires_in: Option<u64>,
}

/// Exchange a refresh token for a new access token.
///
/// Transport failures surface as `Http`; every server-side rejection
/// (non-200, unparseable body, missing `access_token`) as `AuthExpired`.
pub async fn refresh_grant(
    client: &reqwest::Client,
    oauth: &OAuthClient,
    refresh: &str,
) -> Result<RefreshedTokens> {
    let response = client
        .post(&oauth.token_endpoint)
        .timeout(Duration::from_secs(REFRESH_TIMEOUT_SECS))
        .form(&[
            ("grant_type", "refresh_token"),
            ("client_id", oauth.client_id.as_str()),
            ("refresh_token", refresh),
        ])
        .send()
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    let body = response
        .text()
        .await
        .unwrap_or_else(|_| String::from("<no body>"));

    if status != reqwest::StatusCode::OK {
        warn!(status = status.as_u16(), "token endpoint rejected refresh grant");
        return Err(Error::AuthExpired(format!(
            "token refresh returned {status}: {}",
            truncate(&body, 200)
        )));
    }

    let parsed: RefreshResponse = serde_json::from_str(&body)
        .map_err(|e| Error::AuthExpired(format!("invalid refresh response: {e}")))?;

    let access_token = parsed
        .access_token
        .filter(|t| !t.is_empty())
        .ok_or_else(|| Error::AuthExpired("refresh response has no access_token".into()))?;

    debug!(
        rotated = parsed.refresh_token.is_some(),
        expires_in = parsed.expires_in,
        "refresh grant succeeded"
    );

    Ok(RefreshedTokens {
        access_token,
        refresh_token: parsed.refresh_token.filter(|t| !t.is_empty()),
        expires_in: parsed.expires_in,
        refresh_expires_in: parsed.refresh_expires_in,
    })
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::StatusCode;
    use axum::routing::post;
    use tokio::net::TcpListener;

    async fn serve(status: StatusCode, body: &'static str) -> String {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let app = Router::new().route("/token", post(move || async move { (status, body) }));
        tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });
        format!("http://{addr}/token")
    }

    fn oauth(endpoint: String) -> OAuthClient {
        OAuthClient {
            token_endpoint: endpoint,
            client_id: "test-client".into(),
        }
    }

    #[test]
    fn response_tolerates_missing_optional_fields() {
        let parsed: RefreshResponse = serde_json::from_str(r#"{"access_token":"at"}"#).unwrap();
        assert_eq!(parsed.access_token.as_deref(), Some("at"));
        assert!(parsed.refresh_token.is_none());
        assert!(parsed.expires_in.is_none());
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("añoñoño", 3), "año");
        assert_eq!(truncate("short", 200), "short");
    }

    #[tokio::test]
    async fn success_with_rotation() {
        let url = serve(
            StatusCode::OK,
            r#"{"access_token":"at_new","refresh_token":"rt_new","expires_in":300,"refresh_expires_in":1800}"#,
        )
        .await;
        let tokens = refresh_grant(&reqwest::Client::new(), &oauth(url), "rt_old")
            .await
            .unwrap();
        assert_eq!(tokens.access_token, "at_new");
        assert_eq!(tokens.refresh_token.as_deref(), Some("rt_new"));
        assert_eq!(tokens.refresh_expires_in, Some(1800));
    }

    #[tokio::test]
    async fn non_200_is_auth_expired() {
        let url = serve(StatusCode::BAD_REQUEST, r#"{"error":"invalid_grant"}"#).await;
        let err = refresh_grant(&reqwest::Client::new(), &oauth(url), "rt_old")
            .await
            .unwrap_err();
        assert!(err.requires_reauth(), "got: {err}");
        assert!(err.to_string().contains("invalid_grant"));
    }

    #[tokio::test]
    async fn malformed_body_is_auth_expired() {
        let url = serve(StatusCode::OK, "<html>maintenance</html>").await;
        let err = refresh_grant(&reqwest::Client::new(), &oauth(url), "rt_old")
            .await
            .unwrap_err();
        assert!(err.requires_reauth(), "got: {err}");
    }

    #[tokio::test]
    async fn missing_access_token_is_auth_expired() {
        let url = serve(StatusCode::OK, r#"{"refresh_token":"rt_new"}"#).await;
        let err = refresh_grant(&reqwest::Client::new(), &oauth(url), "rt_old")
            .await
            .unwrap_err();
        assert!(err.requires_reauth(), "got: {err}");
    }

    #[tokio::test]
    async fn unreachable_endpoint_is_http_error() {
        let err = refresh_grant(
            &reqwest::Client::new(),
            &oauth("http://127.0.0.1:1/token".into()),
            "rt_old",
        )
        .await
        .unwrap_err();
        assert!(matches!(err, Error::Http(_)), "got: {err}");
    }
}
