//! Store error types

use bisync_model::ModelError;

/// Persistence failure
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum StoreError {
    /// Row does not exist
    #[error("{entity} not found: {id}")]
    NotFound {
        /// Entity kind
        entity: &'static str,
        /// Requested id
        id: String,
    },

    /// Write requires a row id the caller did not supply
    #[error("{entity} has no row id; save it first")]
    Unsaved {
        /// Entity kind
        entity: &'static str,
    },

    /// Backend refused or failed the operation
    #[error("storage backend error: {0}")]
    Backend(String),

    /// Stored row violates a model invariant
    #[error("model error: {0}")]
    Model(#[from] ModelError),
}

impl StoreError {
    /// Create not found error
    #[inline]
    #[must_use]
    pub fn not_found(entity: &'static str, id: impl std::fmt::Display) -> Self {
        Self::NotFound {
            entity,
            id: id.to_string(),
        }
    }

    /// Create backend error
    #[inline]
    #[must_use]
    pub fn backend(message: impl Into<String>) -> Self {
        Self::Backend(message.into())
    }

    /// Check if the operation may succeed when repeated
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Backend(_))
    }
}
