//! Error types for the broadcaster cache
//!
//! The cache data path (add / retrieve / clear / exclude) is total and never
//! fails. Only configuration and scheduler provisioning return errors.

use thiserror::Error;

/// Result type alias using our Error type
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while configuring or scheduling the cache
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Scheduler could not be provisioned
    #[error("Scheduler error: {0}")]
    Scheduler(String),
}
