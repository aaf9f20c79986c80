//! Error types for credential and token operations

/// Errors from credential storage and the token lifecycle.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The session can only be restored by logging in again.
    #[error("authentication expired, manual re-authentication required: {0}")]
    AuthExpired(String),

    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("credential parse error: {0}")]
    CredentialParse(String),

    #[error("I/O error: {0}")]
    Io(String),
}

impl Error {
    /// Whether recovery needs a human to re-run the login flow.
    pub fn requires_reauth(&self) -> bool {
        matches!(self, Error::AuthExpired(_))
    }
}

/// Result alias for auth operations.
pub type Result<T> = std::result::Result<T, Error>;
