//! Shared fixtures for pipeline tests: a loopback mock API and a credential
//! bundle holding a long-lived token.

use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use axum::Router;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use mp_auth::{CredentialStore, OAuthClient, TokenManager};
use tokio::net::TcpListener;

use crate::executor::RetryPolicy;

/// Serve `app` on an ephemeral loopback port and return its base URL.
pub(crate) async fn serve(app: Router) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{addr}")
}

pub(crate) fn now_epoch() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs() as i64
}

/// Unsigned JWT whose payload `exp` is `secs` from now.
pub(crate) fn jwt_expiring_in(secs: i64) -> String {
    let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"none"}"#);
    let payload = URL_SAFE_NO_PAD.encode(
        serde_json::json!({"sub": "buyer-1", "exp": now_epoch() + secs}).to_string(),
    );
    format!("{header}.{payload}.sig")
}

/// Write a credential bundle from raw record JSON values.
pub(crate) async fn credential_file(
    dir: &tempfile::TempDir,
    records: Vec<serde_json::Value>,
) -> CredentialStore {
    let path = dir.path().join("storage_state.json");
    tokio::fs::write(&path, serde_json::json!({ "cookies": records }).to_string())
        .await
        .unwrap();
    CredentialStore::new(path)
}

/// Token manager over a bundle whose access token is good for an hour.
/// The token endpoint is unreachable, so any refresh attempt would fail.
pub(crate) async fn token_manager(dir: &tempfile::TempDir) -> Arc<TokenManager> {
    let store = credential_file(
        dir,
        vec![
            serde_json::json!({"name": "access_token", "value": jwt_expiring_in(3600)}),
            serde_json::json!({"name": "refresh_token", "value": "rt_1"}),
        ],
    )
    .await;
    Arc::new(TokenManager::new(
        store,
        reqwest::Client::new(),
        OAuthClient {
            token_endpoint: "http://127.0.0.1:1/token".into(),
            client_id: "compra-agil".into(),
        },
        Duration::from_secs(300),
    ))
}

/// Short timeouts and millisecond backoff.
pub(crate) fn fast_policy(max_retries: u32) -> RetryPolicy {
    RetryPolicy::from_millis(2_000, max_retries, 1)
}
