//! Run errors and their process exit codes

use thiserror::Error;

/// Exit code for a failure that only a manual re-login can fix
pub const EXIT_REAUTH: u8 = 2;
/// Exit code for every other failure
pub const EXIT_FAILURE: u8 = 1;

#[derive(Error, Debug)]
pub enum Error {
    #[error(transparent)]
    Pipeline(#[from] mp_harvest::Error),

    #[error("failed to build HTTP client: {0}")]
    HttpClient(String),

    #[error("failed to write output: {0}")]
    Output(String),
}

impl Error {
    /// `2` when the session must be re-established by hand, `1` otherwise.
    pub fn exit_code(&self) -> u8 {
        match self {
            Error::Pipeline(e) if e.requires_reauth() => EXIT_REAUTH,
            _ => EXIT_FAILURE,
        }
    }
}

/// Result alias using service Error
pub type Result<T> = std::result::Result<T, Error>;
