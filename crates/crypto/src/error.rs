// Path: crates/crypto/src/error.rs

//! Error types for cryptographic operations.

use thiserror::Error;
use xln_types::error::ErrorCode;

/// Errors raised by the cryptographic substrate.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CryptoError {
    /// A signature failed verification.
    #[error("Signature verification failed")]
    VerificationFailed,
    /// Input bytes had an unexpected length.
    #[error("Invalid length: expected {expected}, got {got}")]
    InvalidLength {
        /// Required byte length.
        expected: usize,
        /// Supplied byte length.
        got: usize,
    },
    /// Key or signature bytes could not be deserialized.
    #[error("Deserialization failed: {0}")]
    Deserialization(String),
    /// A group or field operation failed.
    #[error("Operation failed: {0}")]
    OperationFailed(String),
}

impl ErrorCode for CryptoError {
    fn code(&self) -> &'static str {
        match self {
            Self::VerificationFailed => "CRYPTO_VERIFICATION_FAILED",
            Self::InvalidLength { .. } => "CRYPTO_INVALID_LENGTH",
            Self::Deserialization(_) => "CRYPTO_DESERIALIZATION",
            Self::OperationFailed(_) => "CRYPTO_OPERATION_FAILED",
        }
    }
}
