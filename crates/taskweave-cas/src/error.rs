//! Error types for canonical encoding and key handling.

use thiserror::Error;

/// Errors from canonicalization, addressing and key loading.
///
/// Signature *verification* never errors; it answers `bool`.
#[derive(Error, Debug)]
pub enum CasError {
    /// NaN or infinity cannot be canonicalized.
    #[error("non-finite number cannot be canonicalized")]
    NonFiniteNumber,

    /// The node could not be turned into a JSON body.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Secret key material was not 32 bytes of lowercase hex.
    #[error("invalid secret key: {0}")]
    InvalidSecretKey(String),

    /// Internal consistency error.
    #[error("internal CAS error: {0}")]
    Internal(String),
}
