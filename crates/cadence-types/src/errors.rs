//! Error types shared across the Cadence crates.

use thiserror::Error;

/// Errors raised while encoding or decoding a block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// The block could not be serialized for transport.
    #[error("block marshal failed: {0}")]
    Marshal(String),

    /// Transport bytes could not be decoded into a block.
    #[error("block unmarshal failed: {0}")]
    Unmarshal(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = CodecError::Unmarshal("truncated payload".to_string());
        assert_eq!(err.to_string(), "block unmarshal failed: truncated payload");
    }
}
