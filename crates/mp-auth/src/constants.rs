//! Procurement API OAuth constants
//!
//! The client is a public Keycloak client; none of these values are secrets.
//! Record names are alias lists: lookups take the first alias that matches,
//! in list order.

/// Default Keycloak token endpoint for the refresh grant
pub const DEFAULT_TOKEN_ENDPOINT: &str =
    "https://accounts.mercadopublico.cl/auth/realms/mercadopublico/protocol/openid-connect/token";

/// Default public OAuth client id used by the buyer-facing web app
pub const DEFAULT_CLIENT_ID: &str = "compra-agil";

/// Minimum remaining validity of a returned access token, in seconds
pub const DEFAULT_MIN_VALIDITY_SECS: u64 = 300;

/// Timeout for a single refresh grant request, in seconds
pub const REFRESH_TIMEOUT_SECS: u64 = 15;

/// Accepted names for the access token record, highest priority first
pub const ACCESS_TOKEN_NAMES: &[&str] = &["access_token", "token"];

/// Accepted names for the refresh token record
pub const REFRESH_TOKEN_NAMES: &[&str] = &["refresh_token"];

/// Long-lived SSO session record; only its `expires` attribute is meaningful
pub const SESSION_RECORD_NAMES: &[&str] = &["KEYCLOAK_SESSION", "KEYCLOAK_SESSION_LEGACY"];

/// SSO identity record; carries a JWT whose payload `exp` is meaningful
pub const IDENTITY_RECORD_NAMES: &[&str] = &["KEYCLOAK_IDENTITY", "KEYCLOAK_IDENTITY_LEGACY"];
