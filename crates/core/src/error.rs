//! Error types for the core domain.

use thiserror::Error;

/// Core domain error type.
#[derive(Debug, Error)]
pub enum Error {
    #[error("invalid version name: {0}")]
    InvalidVersionName(String),

    #[error("version name overflow after {0}")]
    VersionNameOverflow(String),
}

/// Result type alias for core operations.
pub type Result<T> = std::result::Result<T, Error>;
