//! Error types for the kernel.

use thiserror::Error;

/// Result type alias for kernel operations.
pub type Result<T> = std::result::Result<T, KernelError>;

/// Errors that can occur inside the kernel.
///
/// Only [`KernelError::InvalidConfig`] is fatal; every other kind is logged
/// at its origin and the enclosing cycle slice continues.
#[derive(Debug, Error)]
pub enum KernelError {
    /// Configuration incomplete or out of range; initialization aborts.
    #[error("invalid kernel configuration: {0}")]
    InvalidConfig(String),

    /// An operation was invoked before the kernel was initialized.
    #[error("kernel not initialized")]
    NotInitialized,

    /// Blockchain callback failed (generation or admission).
    #[error("blockchain error: {0}")]
    Blockchain(String),

    /// Consensus callback failed (confirmation or evaluation).
    #[error("consensus error: {0}")]
    Consensus(String),

    /// Block encode/decode failure.
    #[error("codec error: {0}")]
    Codec(#[from] cadence_types::CodecError),

    /// A metrics snapshot could not be serialized.
    #[error("metrics serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Metrics requested in a format other than `text` or `json`.
    #[error("format must be either text or json")]
    UnknownMetricsFormat(String),
}

impl KernelError {
    /// Whether the error aborts initialization rather than a single slice.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::InvalidConfig(_))
    }
}
