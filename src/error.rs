//! Error taxonomy shared by every layer of the fee engine.

use thiserror::Error;

/// Errors raised while fetching pricing data or computing fees.
///
/// The type is `Clone` because a single failed load is handed to every caller
/// waiting on the same in-flight cache entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FeeError {
    #[error("remote read failed: {0}")]
    /// A chain-state, wallet or storage endpoint failed.
    Remote(String),
    #[error("invalid input: {0}")]
    /// A formula received a value it cannot price.
    InvalidInput(String),
    #[error("arithmetic overflow in {0}")]
    /// An intermediate or final amount does not fit its numeric type.
    Overflow(&'static str),
    #[error("parse error: {0}")]
    /// A decimal, integer or address string could not be decoded.
    Parse(String),
    #[error("cache entry {key} holds a value of another type")]
    /// Two callers used the same cache key for different value types.
    CacheType {
        /// Offending cache key.
        key: String,
    },
    #[error("missing input: {0}")]
    /// A required identity or authorisation input was not supplied.
    MissingInput(&'static str),
    #[error("config error: {0}")]
    /// Configuration file or environment override could not be read.
    Config(String),
}

impl FeeError {
    /// Wraps any displayable remote failure.
    pub fn remote(err: impl std::fmt::Display) -> Self {
        Self::Remote(err.to_string())
    }
}

/// Result alias used across the crate.
pub type Result<T> = std::result::Result<T, FeeError>;
