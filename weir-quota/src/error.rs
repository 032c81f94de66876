//! Quota persistence error types.

/// Errors from the quota codec and quota source.
#[derive(Debug, thiserror::Error)]
pub enum QuotaError {
    /// A stored quota value has the wrong length.
    #[error("malformed quota value: expected {expected} bytes, got {actual}")]
    BadValueLength {
        /// Expected value length.
        expected: usize,
        /// Actual value length.
        actual: usize,
    },

    /// A stored key does not start with the quota key prefix.
    #[error("key missing quota prefix")]
    BadKeyPrefix,

    /// A decoded quota violates its invariants.
    #[error("invalid quota: {0}")]
    Invalid(#[from] weir_core::Error),

    /// The quota source is temporarily unavailable.
    #[error("quota source unavailable: {reason}")]
    Unavailable {
        /// Why the source could not be read.
        reason: String,
    },
}

/// Result type for quota persistence operations.
pub type QuotaResult<T> = Result<T, QuotaError>;
