//! Conflict engine errors

use bisync_delta::DeltaError;
use bisync_model::{ConflictId, ConflictTypeId, ModelError, ResolutionActionId};
use bisync_store::StoreError;

/// Conflict registry and resolution errors
#[derive(Debug, thiserror::Error)]
pub enum ConflictError {
    /// Persistence failed
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// Batch or link group side effect failed
    #[error("batch lifecycle error: {0}")]
    Delta(#[from] DeltaError),

    /// Status transition rejected
    #[error(transparent)]
    Model(#[from] ModelError),

    /// No registration for a conflict type
    #[error("conflict type {0} is not registered")]
    UnknownConflictType(ConflictTypeId),

    /// Same type registered twice for one scope
    #[error("conflict type {0} is already registered for this scope")]
    DuplicateRegistration(ConflictTypeId),

    /// Rule lacks a key its action requires
    #[error("resolution action {action} requires data key {key:?}")]
    MissingRuleData {
        /// Action id
        action: ResolutionActionId,
        /// Missing key
        key: String,
    },

    /// Action is not offered by the conflict type
    #[error("conflict type {type_id} does not support action {action}")]
    UnsupportedAction {
        /// Conflict type
        type_id: ConflictTypeId,
        /// Requested action
        action: ResolutionActionId,
    },

    /// Rule scope cannot be read by the type's interpreter
    #[error("invalid rule scope {scope:?}: {reason}")]
    InvalidScope {
        /// Offending scope pattern
        scope: String,
        /// Interpreter message
        reason: String,
    },

    /// Handler failed while resolving; the conflict stays unresolved
    #[error("handler failed on {conflict}: {source}")]
    Handler {
        /// Conflict being resolved
        conflict: ConflictId,
        /// Handler error
        #[source]
        source: anyhow::Error,
    },
}

impl ConflictError {
    /// Create invalid-scope error
    #[inline]
    #[must_use]
    pub fn invalid_scope(scope: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidScope {
            scope: scope.into(),
            reason: reason.into(),
        }
    }

    /// Check if repeating the operation may succeed
    #[inline]
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Store(err) => err.is_retryable(),
            Self::Delta(err) => err.is_retryable(),
            Self::Handler { .. } => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn handler_failures_are_retryable() {
        let err = ConflictError::Handler {
            conflict: ConflictId(3),
            source: anyhow::anyhow!("disk full"),
        };
        assert!(err.is_retryable());
        assert_eq!(err.to_string(), "handler failed on conflict-3: disk full");
    }

    #[test]
    fn configuration_errors_are_not_retryable() {
        assert!(!ConflictError::UnknownConflictType(ConflictTypeId::from_u128(9)).is_retryable());
        assert!(!ConflictError::invalid_scope("x-y", "not a range").is_retryable());
    }
}
