//! Model-level error types

/// Errors raised by model types themselves
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ModelError {
    /// Lifecycle transition not in the allowed table
    #[error("illegal {entity} transition: {from} -> {to}")]
    IllegalTransition {
        /// Entity whose lifecycle was violated
        entity: &'static str,
        /// Current state
        from: String,
        /// Requested state
        to: String,
    },

    /// Name does not denote a known variant
    #[error("unknown {vocabulary}: {value}")]
    UnknownVariant {
        /// Vocabulary that was searched
        vocabulary: &'static str,
        /// Offending input
        value: String,
    },

    /// Action index outside the batch
    #[error("action index {index} out of range (batch has {len} actions)")]
    ActionOutOfRange {
        /// Requested index
        index: usize,
        /// Number of actions in the batch
        len: usize,
    },
}

impl ModelError {
    /// Create an illegal transition error
    #[inline]
    #[must_use]
    pub fn illegal_transition(
        entity: &'static str,
        from: impl std::fmt::Debug,
        to: impl std::fmt::Debug,
    ) -> Self {
        Self::IllegalTransition {
            entity,
            from: format!("{from:?}"),
            to: format!("{to:?}"),
        }
    }

    /// Create an unknown variant error
    #[inline]
    #[must_use]
    pub fn unknown_variant(vocabulary: &'static str, value: &str) -> Self {
        Self::UnknownVariant {
            vocabulary,
            value: value.to_string(),
        }
    }
}
