//! Shared types for the procurement harvester workspace
//!
//! Holds the pieces every crate needs but none owns: a redacting wrapper
//! for bearer tokens and the configuration error type used while loading
//! `mp-harvest.toml`.

mod error;
mod secret;

pub use error::{Error, Result};
pub use secret::Secret;
