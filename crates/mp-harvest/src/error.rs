//! Error types for the acquisition pipeline

/// How a failed request should be treated.
///
/// Only `Transient` is retried. `FatalAuth` additionally aborts any
/// enclosing crawl or enrichment run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Timeout, connection fault or 5xx
    Transient,
    /// 4xx other than 401, or a status outside the expected set
    FatalClient,
    /// 401: only a manual re-authentication helps
    FatalAuth,
    /// 200 with a body that breaks the data contract
    FatalParse,
}

/// Outcome of a failed request, one variant per observable condition.
#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(String),

    #[error("server error {status}: {body}")]
    Server { status: u16, body: String },

    #[error("client error {status}: {body}")]
    Client { status: u16, body: String },

    /// Neither success nor an error status, e.g. 204 or a redirect.
    #[error("unexpected HTTP status {status}: {body}")]
    Http { status: u16, body: String },

    #[error("authentication expired: {0}")]
    AuthExpired(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}

impl FetchError {
    pub fn class(&self) -> ErrorClass {
        match self {
            FetchError::Network(_) | FetchError::Server { .. } => ErrorClass::Transient,
            FetchError::Client { .. } | FetchError::Http { .. } => ErrorClass::FatalClient,
            FetchError::AuthExpired(_) => ErrorClass::FatalAuth,
            FetchError::Malformed(_) => ErrorClass::FatalParse,
        }
    }

    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Transient
    }

    /// Short label for metrics.
    pub fn label(&self) -> &'static str {
        match self {
            FetchError::Network(_) => "network",
            FetchError::Server { .. } => "server",
            FetchError::Client { .. } => "client",
            FetchError::Http { .. } => "http",
            FetchError::AuthExpired(_) => "auth_expired",
            FetchError::Malformed(_) => "malformed",
        }
    }
}

/// Errors from pipeline operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Auth(#[from] mp_auth::Error),

    #[error("invalid endpoint URL {url}: {reason}")]
    InvalidEndpoint { url: String, reason: String },
}

impl Error {
    /// Whether the run failed because the session is gone for good.
    pub fn requires_reauth(&self) -> bool {
        match self {
            Error::Fetch(e) => e.class() == ErrorClass::FatalAuth,
            Error::Auth(e) => e.requires_reauth(),
            Error::InvalidEndpoint { .. } => false,
        }
    }
}

/// Result alias for pipeline operations.
pub type Result<T> = std::result::Result<T, Error>;
