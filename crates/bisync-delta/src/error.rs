//! Delta error types

use bisync_model::{BatchId, ModelError};
use bisync_store::{StoreError, WatermarkKey};

/// Failure in delta scanning or batch lifecycle
#[derive(Debug, thiserror::Error)]
pub enum DeltaError {
    /// Persistence failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Lifecycle or model invariant violated
    #[error(transparent)]
    Model(#[from] ModelError),

    /// Persisted watermark cannot be decoded
    #[error("corrupt watermark {key}: {value:?} ({reason})")]
    CorruptWatermark {
        /// Row key
        key: WatermarkKey,
        /// Raw persisted value
        value: String,
        /// Decoder message
        reason: String,
    },

    /// Update would move a watermark backwards
    #[error("watermark {key} cannot move from {current} back to {requested}")]
    WatermarkRegression {
        /// Row key
        key: WatermarkKey,
        /// Current value
        current: String,
        /// Requested value
        requested: String,
    },

    /// Batch was already persisted and is immutable
    #[error("{0} is already saved")]
    AlreadySaved(BatchId),

    /// Batch belongs to a different session than the service
    #[error("batch belongs to another session")]
    ForeignBatch,

    /// Slice size must be positive
    #[error("link slice size must be at least 1")]
    InvalidSliceSize,

    /// External change source failed
    #[error("change source failed: {0}")]
    Source(#[from] anyhow::Error),
}

impl DeltaError {
    /// Check if repeating the operation may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::Source(_) => true,
            _ => false,
        }
    }
}
