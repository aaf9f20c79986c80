//! Credential handling for the procurement API
//!
//! Owns everything between the persisted credential bundle and a bearer
//! token that is safe to send. The interactive login that first produces the
//! bundle lives outside this crate; here we only read it, judge it, refresh
//! it and write it back.
//!
//! Token flow:
//! 1. `credentials::CredentialStore::load()` reads the whole bundle
//! 2. `TokenState::from_record()` derives expiry, preferring the JWT `exp`
//! 3. `TokenManager::get_valid_token()` returns the stored token or runs one
//!    refresh grant via `token::refresh_grant()`
//! 4. The refreshed bundle is rewritten atomically via `CredentialStore::save()`

pub mod constants;
pub mod credentials;
pub mod error;
pub mod jwt;
pub mod manager;
pub mod token;

pub use constants::*;
pub use credentials::{CredentialBundle, CredentialRecord, CredentialStore};
pub use error::{Error, Result};
pub use manager::{ExpirySource, TokenManager, TokenReport, TokenState, now_epoch};
pub use token::{OAuthClient, RefreshResponse, RefreshedTokens, refresh_grant};
