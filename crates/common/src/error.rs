//! Configuration error types

use thiserror::Error;

/// Errors raised while loading or validating configuration.
#[derive(Error, Debug)]
pub enum Error {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),
}

impl Error {
    /// Build a `Config` error for a value outside its accepted range.
    pub fn out_of_range(field: &str, value: impl std::fmt::Display, range: &str) -> Self {
        Error::Config(format!("{field} must be within {range}, got {value}"))
    }
}

/// Result alias using the configuration Error
pub type Result<T> = std::result::Result<T, Error>;
